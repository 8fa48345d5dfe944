//! Configuration for CPO training.
//!
//! Defaults follow the usual CPO/TRPO settings: a KL trust region of 0.01,
//! a per-update cost-surrogate budget of 0.01, 10 conjugate-gradient
//! iterations and 10 line-search halvings.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CpoError;

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count parameter must be positive.
    InvalidCount { field: &'static str, value: usize },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(f, "{} must be in [{}, {}], got {}", field, min, max, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for Constrained Policy Optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpoConfig {
    // Constraint and trust region
    /// Allowed one-step change of the cost surrogate.
    pub delta: f64,
    /// KL trust-region radius.
    pub max_kl: f64,

    // Advantage estimation
    /// Discount factor.
    pub gamma: f32,
    /// GAE trace decay.
    pub lam: f32,

    // Value regression
    /// Learning rate of the reward value estimator.
    pub value_lr: f64,
    /// Learning rate of the cost value estimator.
    pub cost_value_lr: f64,
    /// Gradient-norm clipping for the value optimizers (None = no clipping).
    pub max_grad_norm: Option<f32>,

    // Natural-gradient solver
    /// Damping added to the Fisher-vector product.
    pub damping: f64,
    /// Conjugate-gradient iteration cap.
    pub cg_iters: usize,
    /// Conjugate-gradient stopping threshold on the squared residual.
    pub cg_residual_tol: f64,
    /// Perturbation norm of the finite-difference Fisher-vector product.
    pub fvp_fd_step: f64,

    // Line search
    /// Maximum number of backtracking steps.
    pub line_search_steps: usize,
    /// Step-size shrink factor per backtrack.
    pub backtrack_ratio: f64,

    // Rollouts
    /// Training iterations.
    pub n_iterations: usize,
    /// Minimum transitions collected per update. The batch ends at the first
    /// episode end at or after this count.
    pub batch_size: usize,
    /// Truncate episodes that run this long (None = rely on the environment).
    pub max_episode_steps: Option<usize>,
    /// Seed for environment resets and action sampling.
    pub seed: u64,
}

impl Default for CpoConfig {
    fn default() -> Self {
        Self {
            delta: 0.01,
            max_kl: 0.01,

            gamma: 0.99,
            lam: 0.95,

            value_lr: 1e-3,
            cost_value_lr: 1e-3,
            max_grad_norm: None,

            damping: 0.1,
            cg_iters: 10,
            cg_residual_tol: 1e-10,
            fvp_fd_step: 1e-3,

            line_search_steps: 10,
            backtrack_ratio: 0.5,

            n_iterations: 100,
            batch_size: 2048,
            max_episode_steps: Some(1000),
            seed: 0,
        }
    }
}

impl CpoConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cost-surrogate budget.
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// Set the trust-region radius.
    pub fn with_max_kl(mut self, max_kl: f64) -> Self {
        self.max_kl = max_kl;
        self
    }

    /// Set the discount factor.
    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the GAE lambda.
    pub fn with_lam(mut self, lam: f32) -> Self {
        self.lam = lam;
        self
    }

    /// Set both value learning rates.
    pub fn with_value_lr(mut self, lr: f64) -> Self {
        self.value_lr = lr;
        self.cost_value_lr = lr;
        self
    }

    /// Set the cost value learning rate only.
    pub fn with_cost_value_lr(mut self, lr: f64) -> Self {
        self.cost_value_lr = lr;
        self
    }

    /// Set gradient-norm clipping for the value optimizers.
    pub fn with_max_grad_norm(mut self, max_norm: Option<f32>) -> Self {
        self.max_grad_norm = max_norm;
        self
    }

    /// Set the Fisher damping.
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Set the conjugate-gradient iteration cap.
    pub fn with_cg_iters(mut self, iters: usize) -> Self {
        self.cg_iters = iters;
        self
    }

    /// Set the squared-residual stopping tolerance of the CG solve.
    pub fn with_cg_residual_tol(mut self, tol: f64) -> Self {
        self.cg_residual_tol = tol;
        self
    }

    /// Set the line-search cap.
    pub fn with_line_search_steps(mut self, steps: usize) -> Self {
        self.line_search_steps = steps;
        self
    }

    /// Set the number of training iterations.
    pub fn with_n_iterations(mut self, n: usize) -> Self {
        self.n_iterations = n;
        self
    }

    /// Set the minimum batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the episode truncation length.
    pub fn with_max_episode_steps(mut self, steps: Option<usize>) -> Self {
        self.max_episode_steps = steps;
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validate all configuration parameters.
    ///
    /// # Validation Rules
    /// - `batch_size`, `n_iterations`, `cg_iters`, `line_search_steps` must be > 0
    /// - `gamma` and `lam` must be in [0, 1]
    /// - `max_kl`, `damping`, `fvp_fd_step` and the learning rates must be positive
    /// - `cg_residual_tol` must be finite and >= 0
    /// - `backtrack_ratio` must be in (0, 1)
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("batch_size", self.batch_size),
            ("n_iterations", self.n_iterations),
            ("cg_iters", self.cg_iters),
            ("line_search_steps", self.line_search_steps),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        if self.max_episode_steps == Some(0) {
            return Err(ConfigError::InvalidCount {
                field: "max_episode_steps",
                value: 0,
            });
        }

        for (field, value) in [("gamma", self.gamma), ("lam", self.lam)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: value as f64,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }

        for (field, value) in [
            ("max_kl", self.max_kl),
            ("damping", self.damping),
            ("fvp_fd_step", self.fvp_fd_step),
            ("value_lr", self.value_lr),
            ("cost_value_lr", self.cost_value_lr),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    min: f64::MIN_POSITIVE,
                    max: f64::MAX,
                });
            }
        }

        if !(self.cg_residual_tol >= 0.0 && self.cg_residual_tol.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "cg_residual_tol",
                value: self.cg_residual_tol,
                min: 0.0,
                max: f64::MAX,
            });
        }

        if !(self.backtrack_ratio > 0.0 && self.backtrack_ratio < 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "backtrack_ratio",
                value: self.backtrack_ratio,
                min: 0.0,
                max: 1.0,
            });
        }

        if !self.delta.is_finite() {
            return Err(ConfigError::OutOfRange {
                field: "delta",
                value: self.delta,
                min: f64::MIN,
                max: f64::MAX,
            });
        }

        Ok(())
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CpoError> {
        let text = fs::read_to_string(path)?;
        let config: CpoConfig = serde_json::from_str(&text)?;
        Ok(config.build()?)
    }

    /// Write the configuration as pretty JSON.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), CpoError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CpoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.delta, 0.01);
        assert_eq!(config.gamma, 0.99);
        assert_eq!(config.lam, 0.95);
        assert_eq!(config.max_kl, 0.01);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = CpoConfig::new().with_batch_size(0).validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidCount {
                field: "batch_size",
                value: 0
            }
        );
    }

    #[test]
    fn test_gamma_out_of_range_rejected() {
        let err = CpoConfig::new().with_gamma(1.5).validate().unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "gamma", .. }));
    }

    #[test]
    fn test_non_positive_max_kl_rejected() {
        let err = CpoConfig::new().with_max_kl(0.0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "max_kl", .. }));
    }

    #[test]
    fn test_cg_residual_tol_must_be_non_negative() {
        let mut config = CpoConfig::new();
        config.cg_residual_tol = 0.0;
        assert!(config.validate().is_ok());

        for bad in [-1e-10, f64::NAN, f64::INFINITY] {
            config.cg_residual_tol = bad;
            let err = config.validate().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::OutOfRange {
                    field: "cg_residual_tol",
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_negative_delta_is_allowed() {
        // A negative budget asks the update to reduce cost.
        assert!(CpoConfig::new().with_delta(-0.05).validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CpoConfig = serde_json::from_str(r#"{ "max_kl": 0.02, "batch_size": 256 }"#)
            .unwrap();
        assert_eq!(config.max_kl, 0.02);
        assert_eq!(config.batch_size, 256);
        assert_eq!(config.cg_iters, 10);
    }

    #[test]
    fn test_json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("cpo_config_{}.json", std::process::id()));
        let config = CpoConfig::new().with_seed(7).with_batch_size(512);
        config.to_json_file(&path).unwrap();
        let loaded = CpoConfig::from_json_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }
}
