//! Training telemetry for CPO.
//!
//! ## History
//!
//! - [`IterationRecord`]: returns, costs, value losses and update outcome of one iteration
//! - [`TrainingHistory`]: every record of a run, owned by the training loop
//!
//! ## Loggers
//!
//! - [`ConsoleLogger`]: Pretty-printed console output
//! - [`CSVLogger`]: CSV file logging for analysis
//! - [`MultiLogger`]: Combine multiple loggers
//! - [`NullLogger`]: Discard everything

pub mod history;
pub mod logger;

pub use history::{IterationRecord, TrainingHistory};
pub use logger::{CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger, NullLogger};
