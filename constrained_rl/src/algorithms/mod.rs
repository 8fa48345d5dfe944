//! Algorithm components for CPO.
//!
//! - `gae`: Generalized Advantage Estimation for rewards and costs
//! - `gaussian`: Diagonal Gaussian action distribution
//! - `param_vector`: Flatten/unflatten module parameters and gradients
//! - `conjugate_gradient`: Matrix-free CG solver
//! - `cpo`: Constrained trust-region policy update
//! - `value_trainer`: Value-function regression

pub mod conjugate_gradient;
pub mod cpo;
pub mod gae;
pub mod gaussian;
pub mod param_vector;
pub mod value_trainer;

#[cfg(test)]
mod tests;

pub use conjugate_gradient::{conjugate_gradient, CgSolution};
pub use cpo::{
    constrained_step, ConstrainedPolicyUpdater, ConstraintBranch, StepDirection, StepParams,
    UpdateStats,
};
pub use gae::{compute_gae_masked, normalize_advantages, AdvantageEstimates, AdvantageEstimator};
pub use gaussian::DiagGaussian;
pub use param_vector::ParameterVector;
pub use value_trainer::{create_value_optimizer, ValueFunctionTrainer};
