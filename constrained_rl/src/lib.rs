//! # Constrained RL: Constrained Policy Optimization on burn
//!
//! Trust-region policy optimization that improves expected return while
//! bounding expected cost. Each update computes a natural-gradient direction
//! with conjugate gradients on a matrix-free Fisher operator, corrects it
//! against the cost constraint, and applies it with a backtracking line
//! search that enforces the KL trust region.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   Transition   ┌────────────────────┐
//! │   CostEnv    │───────────────►│  TrajectoryBuffer  │
//! └──────▲───────┘                └─────────┬──────────┘
//!        │ clipped action                   │ TrajectoryBatch
//! ┌──────┴───────┐                ┌─────────▼──────────┐
//! │   Gaussian   │                │ AdvantageEstimator │──► returns ──► ValueFunctionTrainer ×2
//! │    policy    │◄───────────────│  (reward + cost)   │
//! └──────▲───────┘     A, A_c     └────────────────────┘
//!        │ in-place update, snapshot sync
//! ┌──────┴────────────────────┐
//! │ ConstrainedPolicyUpdater  │  g, b → CG(F⁻¹g) → dual correction → line search
//! └───────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burn::backend::{Autodiff, NdArray};
//! use constrained_rl::{
//!     create_value_optimizer, ConsoleLogger, CpoConfig, LinearPointEnv, MlpPolicyConfig,
//!     MlpValue, MlpValueConfig, TrainingLoop,
//! };
//!
//! type B = Autodiff<NdArray<f32>>;
//! let device = Default::default();
//! let config = CpoConfig::new().with_batch_size(1024).with_n_iterations(50);
//!
//! let mut training = TrainingLoop::new(
//!     LinearPointEnv::new(config.seed),
//!     MlpPolicyConfig::new(2, 2).init::<B>(&device),
//!     MlpValueConfig::new(2).init::<B>(&device),
//!     MlpValueConfig::new(2).init::<B>(&device),
//!     create_value_optimizer::<B, MlpValue<B>>(config.max_grad_norm),
//!     create_value_optimizer::<B, MlpValue<B>>(config.max_grad_norm),
//!     config,
//!     device,
//! )?;
//! training.run(&mut ConsoleLogger::new(1))?;
//! ```

pub mod algorithms;
pub mod buffers;
pub mod config;
pub mod core;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod models;
pub mod runners;

// Re-export commonly used types
pub use algorithms::{
    constrained_step, create_value_optimizer, AdvantageEstimates, AdvantageEstimator,
    ConstrainedPolicyUpdater, ConstraintBranch, DiagGaussian, ParameterVector, StepDirection,
    StepParams, UpdateStats, ValueFunctionTrainer,
};
pub use buffers::{TrajectoryBatch, TrajectoryBuffer};
pub use config::{ConfigError, CpoConfig};
pub use core::Transition;
pub use environment::{clip_action, CostEnv, EnvStep, LinearPointEnv, PointEnvError, StepInfo};
pub use error::CpoError;
pub use metrics::{
    CSVLogger, ConsoleLogger, IterationRecord, MetricsLogger, MultiLogger, NullLogger,
    TrainingHistory,
};
pub use models::{
    observations_to_tensor, GaussianPolicyModel, MlpGaussianPolicy, MlpPolicyConfig, MlpValue,
    MlpValueConfig, ValueModel,
};
pub use runners::{EpisodeStats, TrainingLoop};
