//! Runner for CPO training.
//!
//! - [`TrainingLoop`]: single-threaded rollout → advantages → value fitting →
//!   constrained policy update, owning the [`TrainingHistory`](crate::metrics::TrainingHistory)

pub mod training_loop;

pub use training_loop::{EpisodeStats, TrainingLoop};
