//! Experience buffers.
//!
//! - `trajectory_buffer`: sequential on-policy batch with reward and cost signals

pub mod trajectory_buffer;

pub use trajectory_buffer::{TrajectoryBatch, TrajectoryBuffer};
