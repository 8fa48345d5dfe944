//! Error types for constrained policy optimization.
//!
//! Numerical epsilon guards are part of normal operation and never surface
//! here. What does surface:
//! - dimension disagreements between data and approximators
//! - non-finite parameters produced by an update (the update is reverted first)
//! - negative KL divergence (a defect in the distribution code)
//! - invalid configuration, environment failures, config file I/O

use std::fmt;
use std::io;

use crate::config::ConfigError;

/// Error returned by the estimator, updater, trainers and training loop.
#[derive(Debug)]
pub enum CpoError {
    /// Data shape disagrees with what a component expects.
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A non-finite value was produced where parameters or estimates must be finite.
    NonFinite { what: &'static str },
    /// KL divergence evaluated below zero beyond rounding tolerance.
    NegativeKl(f64),
    /// Configuration failed validation.
    Config(ConfigError),
    /// Error raised by the environment collaborator.
    Environment(Box<dyn std::error::Error + Send + Sync>),
    /// IO error while reading or writing a configuration file.
    Io(io::Error),
    /// (De)serialization error for configuration or history files.
    Serde(serde_json::Error),
}

impl CpoError {
    /// Shorthand for a shape mismatch.
    pub fn shape(what: &'static str, expected: usize, actual: usize) -> Self {
        CpoError::ShapeMismatch {
            what,
            expected,
            actual,
        }
    }

    /// Wrap an environment error.
    pub fn environment<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CpoError::Environment(Box::new(err))
    }
}

impl fmt::Display for CpoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpoError::ShapeMismatch {
                what,
                expected,
                actual,
            } => write!(f, "shape mismatch for {}: expected {}, got {}", what, expected, actual),
            CpoError::NonFinite { what } => write!(f, "non-finite values in {}", what),
            CpoError::NegativeKl(kl) => write!(f, "KL divergence is negative: {}", kl),
            CpoError::Config(e) => write!(f, "invalid configuration: {}", e),
            CpoError::Environment(e) => write!(f, "environment error: {}", e),
            CpoError::Io(e) => write!(f, "IO error: {}", e),
            CpoError::Serde(e) => write!(f, "serialization error: {}", e),
        }
    }
}

impl std::error::Error for CpoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CpoError::Config(e) => Some(e),
            CpoError::Environment(e) => Some(e.as_ref()),
            CpoError::Io(e) => Some(e),
            CpoError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CpoError {
    fn from(e: ConfigError) -> Self {
        CpoError::Config(e)
    }
}

impl From<io::Error> for CpoError {
    fn from(e: io::Error) -> Self {
        CpoError::Io(e)
    }
}

impl From<serde_json::Error> for CpoError {
    fn from(e: serde_json::Error) -> Self {
        CpoError::Serde(e)
    }
}
