//! Core data types shared by the buffers, algorithms and runners.

pub mod transition;

pub use transition::Transition;
