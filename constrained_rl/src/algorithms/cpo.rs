//! Constrained Policy Optimization update.
//!
//! One update takes the current policy from θ_old to a point inside the KL
//! trust region that improves the reward surrogate while keeping the cost
//! surrogate within budget:
//!
//! ```text
//! ρ   = exp(log π_θ(a|s) - log π_old(a|s))
//! L   = mean(ρ · A)          g = ∇L
//! L_c = mean(ρ · A_c)        b = ∇L_c
//! x   = F⁻¹ g                (conjugate gradient, F = KL Hessian + damping)
//! q   = b·x - δ
//! ```
//!
//! - `q < 0` (constraint slack): scale x onto the trust-region boundary,
//!   `x ← x · sqrt(2 max_kl / xᵀFx)`.
//! - `q ≥ 0` (constraint binding): `ν = q / xᵀFx`, `x ← x - ν x`. This is a
//!   single-direction correction that shrinks the reward direction; it does
//!   not project onto b.
//!
//! The step is then applied by backtracking `θ_old + s·x` for
//! `s = 1, r, r², …` until the mean KL is within `max_kl` and the reward
//! surrogate improved. Otherwise θ_old is restored exactly.
//!
//! # Fisher-vector product
//!
//! burn has no double backward, so `F v` is the directional derivative of the
//! KL gradient, taken as a central difference:
//!
//! ```text
//! F v ≈ [∇KL(θ + h v̂) - ∇KL(θ - h v̂)] · ‖v‖ / (2h) + damping · v
//! ```
//!
//! The Fisher matrix is never formed.
//!
//! # References
//!
//! - Achiam et al., "Constrained Policy Optimization" (2017)
//! - Schulman et al., "Trust Region Policy Optimization" (2015)

use std::marker::PhantomData;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use crate::algorithms::conjugate_gradient::{conjugate_gradient, dot, norm};
use crate::algorithms::gaussian::DiagGaussian;
use crate::algorithms::param_vector::ParameterVector;
use crate::config::CpoConfig;
use crate::error::CpoError;
use crate::models::GaussianPolicyModel;

/// Additive floor on `xᵀFx`.
pub const QUAD_FORM_EPS: f64 = 1e-8;

/// KL values below this are treated as a defect rather than rounding.
pub const NEGATIVE_KL_TOL: f64 = -1e-6;

/// Which side of the cost constraint the step was computed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ConstraintBranch {
    /// Constraint slack: full step to the trust-region boundary.
    TrustRegion,
    /// Constraint binding: direction shrunk by ν.
    Correction,
}

/// Solver settings for [`constrained_step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub delta: f64,
    pub max_kl: f64,
    pub cg_iters: usize,
    pub cg_residual_tol: f64,
}

impl From<&CpoConfig> for StepParams {
    fn from(config: &CpoConfig) -> Self {
        Self {
            delta: config.delta,
            max_kl: config.max_kl,
            cg_iters: config.cg_iters,
            cg_residual_tol: config.cg_residual_tol,
        }
    }
}

/// Search direction produced by [`constrained_step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepDirection {
    /// Final direction in parameter space
    pub direction: Vec<f64>,
    pub branch: ConstraintBranch,
    /// `xᵀFx` of the unscaled CG solution
    pub quad_form: f64,
    /// Constraint value `b·x - δ`
    pub q: f64,
    /// Correction multiplier (Correction branch only)
    pub nu: Option<f64>,
    pub cg_iterations: usize,
}

/// Compute the CPO search direction from the reward gradient `g`, the cost
/// gradient `b` and a Fisher-vector product.
pub fn constrained_step<F>(g: &[f64], b: &[f64], mut fvp: F, params: StepParams) -> StepDirection
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let solution = conjugate_gradient(&mut fvp, g, params.cg_iters, params.cg_residual_tol);
    let mut x = solution.x;

    let fx = fvp(&x);
    let quad_form = dot(&x, &fx);
    let q = dot(b, &x) - params.delta;

    if q < 0.0 {
        let scale = (2.0 * params.max_kl / (quad_form + QUAD_FORM_EPS)).sqrt();
        x.iter_mut().for_each(|xi| *xi *= scale);
        StepDirection {
            direction: x,
            branch: ConstraintBranch::TrustRegion,
            quad_form,
            q,
            nu: None,
            cg_iterations: solution.iterations,
        }
    } else {
        let nu = q / (quad_form + QUAD_FORM_EPS);
        x.iter_mut().for_each(|xi| *xi -= nu * *xi);
        StepDirection {
            direction: x,
            branch: ConstraintBranch::Correction,
            quad_form,
            q,
            nu: Some(nu),
            cg_iterations: solution.iterations,
        }
    }
}

/// Outcome of one policy update.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UpdateStats {
    /// Whether a line-search candidate was accepted
    pub accepted: bool,
    /// Accepted step size (0 when rejected)
    pub step_size: f64,
    /// Line-search candidates evaluated
    pub backtracks: usize,
    pub branch: ConstraintBranch,
    /// Mean KL(old || new) of the final policy
    pub kl: f64,
    pub surrogate_before: f64,
    pub surrogate_after: f64,
    pub cost_surrogate_before: f64,
    pub cost_surrogate_after: f64,
    pub q: f64,
    pub cg_iterations: usize,
}

/// Observations and the detached snapshot distribution the KL is taken from.
struct KlReference<B: AutodiffBackend> {
    observations: Tensor<B, 2>,
    old_dist: DiagGaussian<B>,
}

impl<B: AutodiffBackend> KlReference<B> {
    fn mean_kl<P: GaussianPolicyModel<B>>(&self, policy: &P) -> Tensor<B, 1> {
        let dist = policy.forward(self.observations.clone());
        self.old_dist.kl(&dist).mean()
    }
}

/// Tensors shared by every evaluation within one update.
struct UpdateBatch<B: AutodiffBackend> {
    reference: KlReference<B>,
    actions: Tensor<B, 2>,
    old_log_prob: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    cost_advantages: Tensor<B, 1>,
}

impl<B: AutodiffBackend> UpdateBatch<B> {
    /// Importance-weighted mean of `weights`.
    fn surrogate<P: GaussianPolicyModel<B>>(
        &self,
        policy: &P,
        weights: &Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        let log_prob = policy
            .forward(self.reference.observations.clone())
            .log_prob(self.actions.clone());
        let ratio = (log_prob - self.old_log_prob.clone()).exp();
        (ratio * weights.clone()).mean()
    }

    fn mean_kl<P: GaussianPolicyModel<B>>(&self, policy: &P) -> Tensor<B, 1> {
        self.reference.mean_kl(policy)
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

/// Gradient of `loss(policy)` flattened in parameter order.
fn flat_gradient<B, P>(policy: &P, loss: Tensor<B, 1>) -> ParameterVector
where
    B: AutodiffBackend,
    P: GaussianPolicyModel<B>,
{
    let grads = loss.backward();
    ParameterVector::flat_grad(policy, &grads)
}

/// CPO policy updater.
///
/// Owns the old-policy snapshot used as the KL and importance-ratio
/// reference. The snapshot is replaced with the current policy at the end of
/// every update, whatever its outcome.
pub struct ConstrainedPolicyUpdater<B: AutodiffBackend, P: GaussianPolicyModel<B>> {
    old_policy: P,
    config: CpoConfig,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend, P: GaussianPolicyModel<B>> ConstrainedPolicyUpdater<B, P> {
    /// Create an updater whose snapshot is a copy of `policy`.
    pub fn new(policy: &P, config: CpoConfig) -> Self {
        Self {
            old_policy: policy.clone(),
            config,
            _backend: PhantomData,
        }
    }

    /// The old-policy snapshot.
    pub fn old_policy(&self) -> &P {
        &self.old_policy
    }

    pub fn config(&self) -> &CpoConfig {
        &self.config
    }

    /// Overwrite the snapshot with `policy`.
    pub fn sync(&mut self, policy: &P) {
        self.old_policy = policy.clone();
    }

    /// Run one constrained update, mutating `policy` in place.
    ///
    /// `observations` is [N, obs_size], `actions` is [N, action_dim] and both
    /// advantage slices have length N. A line search that finds no acceptable
    /// candidate is not an error: the policy is restored and
    /// `UpdateStats::accepted` is false.
    pub fn update(
        &mut self,
        policy: &mut P,
        observations: Tensor<B, 2>,
        actions: Tensor<B, 2>,
        advantages: &[f32],
        cost_advantages: &[f32],
    ) -> Result<UpdateStats, CpoError> {
        let batch = self.prepare(policy, observations, actions, advantages, cost_advantages)?;
        let result = self.constrained_update(policy, &batch);
        self.sync(policy);
        result
    }

    fn prepare(
        &self,
        policy: &P,
        observations: Tensor<B, 2>,
        actions: Tensor<B, 2>,
        advantages: &[f32],
        cost_advantages: &[f32],
    ) -> Result<UpdateBatch<B>, CpoError> {
        let [n, action_dim] = actions.dims();
        let n_obs = observations.dims()[0];
        if n_obs != n {
            return Err(CpoError::shape("observation batch", n, n_obs));
        }
        if action_dim != policy.action_dim() {
            return Err(CpoError::shape("action dim", policy.action_dim(), action_dim));
        }
        if advantages.len() != n {
            return Err(CpoError::shape("advantages", n, advantages.len()));
        }
        if cost_advantages.len() != n {
            return Err(CpoError::shape("cost advantages", n, cost_advantages.len()));
        }

        let device = observations.device();
        let old_dist = self.old_policy.distribution(observations.clone())?.detach();
        let old_log_prob = old_dist.log_prob(actions.clone()).detach();

        let advantages =
            Tensor::from_data(TensorData::new(advantages.to_vec(), [n]), &device);
        let cost_advantages =
            Tensor::from_data(TensorData::new(cost_advantages.to_vec(), [n]), &device);

        Ok(UpdateBatch {
            reference: KlReference {
                observations,
                old_dist,
            },
            actions,
            old_log_prob,
            advantages,
            cost_advantages,
        })
    }

    fn constrained_update(
        &self,
        policy: &mut P,
        batch: &UpdateBatch<B>,
    ) -> Result<UpdateStats, CpoError> {
        let theta_old = ParameterVector::flatten(policy);

        // Separate forward passes: backward consumes the graph.
        let reward_surrogate = batch.surrogate(policy, &batch.advantages);
        let surrogate_before = scalar(reward_surrogate.clone().detach());
        let g = flat_gradient(policy, reward_surrogate);

        let cost_surrogate = batch.surrogate(policy, &batch.cost_advantages);
        let cost_surrogate_before = scalar(cost_surrogate.clone().detach());
        let b = flat_gradient(policy, cost_surrogate);

        let mut scratch = policy.clone();
        let mut fvp_error = None;
        let step = {
            let fvp = |v: &[f64]| {
                match self.fvp_around(&mut scratch, &theta_old, &batch.reference, v) {
                    Ok(fv) => fv,
                    Err(e) => {
                        if fvp_error.is_none() {
                            fvp_error = Some(e);
                        }
                        v.iter().map(|vi| self.config.damping * vi).collect()
                    }
                }
            };
            constrained_step(g.as_slice(), b.as_slice(), fvp, StepParams::from(&self.config))
        };
        if let Some(e) = fvp_error {
            return Err(e);
        }

        log::debug!(
            "CPO step: branch={:?} q={:.4e} xFx={:.4e} nu={:?} cg_iters={}",
            step.branch,
            step.q,
            step.quad_form,
            step.nu,
            step.cg_iterations
        );

        if !step.direction.iter().all(|v| v.is_finite()) {
            log::warn!("CPO search direction is not finite, keeping current policy");
            return Err(CpoError::NonFinite {
                what: "search direction",
            });
        }

        let mut stats = UpdateStats {
            accepted: false,
            step_size: 0.0,
            backtracks: 0,
            branch: step.branch,
            kl: 0.0,
            surrogate_before,
            surrogate_after: surrogate_before,
            cost_surrogate_before,
            cost_surrogate_after: cost_surrogate_before,
            q: step.q,
            cg_iterations: step.cg_iterations,
        };

        let mut step_size = 1.0;
        for k in 0..self.config.line_search_steps {
            stats.backtracks = k + 1;

            let candidate: Vec<f64> = theta_old
                .as_slice()
                .iter()
                .zip(&step.direction)
                .map(|(t, x)| t + step_size * x)
                .collect();
            let candidate = theta_old.with_values(candidate)?;
            if !candidate.is_finite() {
                theta_old.load_into(policy)?;
                return Err(CpoError::NonFinite {
                    what: "candidate parameters",
                });
            }
            candidate.load_into(policy)?;

            let kl = scalar(batch.mean_kl(policy).detach());
            if kl < NEGATIVE_KL_TOL {
                theta_old.load_into(policy)?;
                return Err(CpoError::NegativeKl(kl));
            }
            let surrogate = scalar(batch.surrogate(policy, &batch.advantages).detach());

            if kl <= self.config.max_kl && surrogate > surrogate_before {
                stats.accepted = true;
                stats.step_size = step_size;
                stats.kl = kl;
                stats.surrogate_after = surrogate;
                stats.cost_surrogate_after =
                    scalar(batch.surrogate(policy, &batch.cost_advantages).detach());
                break;
            }
            step_size *= self.config.backtrack_ratio;
        }

        if stats.accepted {
            log::debug!(
                "CPO line search accepted step {:.4e} after {} candidates (kl={:.4e}, surrogate {:.4e} -> {:.4e})",
                stats.step_size,
                stats.backtracks,
                stats.kl,
                stats.surrogate_before,
                stats.surrogate_after
            );
        } else {
            theta_old.load_into(policy)?;
            log::warn!(
                "CPO line search found no acceptable step in {} candidates, policy unchanged",
                stats.backtracks
            );
        }

        Ok(stats)
    }

    /// Damped Fisher-vector product `(F + damping I) v` at the parameters of
    /// `policy`, with the KL taken from the snapshot on `observations`.
    ///
    /// This is the product the update solves against; `v` is in
    /// `ParameterVector` order.
    pub fn fisher_vector_product(
        &self,
        policy: &P,
        observations: Tensor<B, 2>,
        v: &[f64],
    ) -> Result<Vec<f64>, CpoError> {
        let theta = ParameterVector::flatten(policy);
        if v.len() != theta.len() {
            return Err(CpoError::shape("fisher vector", theta.len(), v.len()));
        }
        let old_dist = self.old_policy.distribution(observations.clone())?.detach();
        let reference = KlReference {
            observations,
            old_dist,
        };
        let mut scratch = policy.clone();
        self.fvp_around(&mut scratch, &theta, &reference, v)
    }

    /// Finite-difference Fisher-vector product around `theta`.
    ///
    /// `scratch` is a copy of the policy; its parameters are
    /// overwritten.
    fn fvp_around(
        &self,
        scratch: &mut P,
        theta: &ParameterVector,
        reference: &KlReference<B>,
        v: &[f64],
    ) -> Result<Vec<f64>, CpoError> {
        let damping = self.config.damping;
        let v_norm = norm(v);
        if v_norm == 0.0 {
            return Ok(v.iter().map(|vi| damping * vi).collect());
        }

        let h = self.config.fvp_fd_step;
        let mut kl_grad_at = |sign: f64| -> Result<Vec<f64>, CpoError> {
            let shifted: Vec<f64> = theta
                .as_slice()
                .iter()
                .zip(v)
                .map(|(t, vi)| t + sign * h * vi / v_norm)
                .collect();
            theta.with_values(shifted)?.load_into(&mut *scratch)?;
            let kl = reference.mean_kl(&*scratch);
            Ok(flat_gradient(&*scratch, kl).into_values())
        };

        let grad_plus = kl_grad_at(1.0)?;
        let grad_minus = kl_grad_at(-1.0)?;

        let scale = v_norm / (2.0 * h);
        Ok(grad_plus
            .iter()
            .zip(&grad_minus)
            .zip(v)
            .map(|((gp, gm), vi)| (gp - gm) * scale + damping * vi)
            .collect())
    }
}
