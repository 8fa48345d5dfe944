//! Generalized Advantage Estimation for reward and cost signals.
//!
//! GAE provides a family of policy gradient estimators parameterized by λ:
//! - λ = 0: one-step TD (low variance, high bias)
//! - λ = 1: Monte Carlo (high variance, low bias)
//! - λ ∈ (0, 1): interpolation
//!
//! CPO runs the same recursion twice: once on rewards with the reward value
//! estimator, once on costs with the cost value estimator.
//!
//! ## Formula
//!
//! A_t^GAE(γ,λ) = Σ_{l=0}^{∞} (γλ)^l δ_{t+l}
//! where δ_t = r_t + γ m_t V(s_{t+1}) - V(s_t)
//!
//! `m_t` is the non-terminal mask of transition t. A batch is a flat sequence
//! that may cross episode boundaries, so a terminal transition must never
//! bootstrap from the value at t+1 (which belongs to the next episode).
//!
//! ## References
//!
//! - Schulman et al., "High-Dimensional Continuous Control Using
//!   Generalized Advantage Estimation" (2016)

use crate::error::CpoError;

/// Epsilon added to the standard deviation during standardization.
pub const NORMALIZATION_EPS: f32 = 1e-8;

/// Compute GAE advantages and returns over a masked batch.
///
/// The value past the last index is taken as zero, so the final transition
/// never bootstraps regardless of its mask.
///
/// # Arguments
///
/// * `rewards` - per-step signal (reward or cost) [T]
/// * `values` - value estimates V(s_t) [T]
/// * `masks` - non-terminal masks, 0.0 where the episode ended [T]
/// * `gamma` - discount factor
/// * `lam` - GAE λ parameter
///
/// # Returns
///
/// (advantages, returns) - both [T], `returns[t] = advantages[t] + values[t]`
pub fn compute_gae_masked(
    rewards: &[f32],
    values: &[f32],
    masks: &[f32],
    gamma: f32,
    lam: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len();
    debug_assert_eq!(values.len(), n);
    debug_assert_eq!(masks.len(), n);

    let mut advantages = vec![0.0f32; n];
    let mut returns = vec![0.0f32; n];

    let mut gae = 0.0f32;
    let mut next_value = 0.0f32;

    for t in (0..n).rev() {
        let mask = masks[t];

        // TD residual: δ_t = r_t + γ * V(s_{t+1}) * m_t - V(s_t)
        let delta = rewards[t] + gamma * next_value * mask - values[t];

        // GAE: A_t = δ_t + γλ * m_t * A_{t+1}
        gae = delta + gamma * lam * mask * gae;

        advantages[t] = gae;
        returns[t] = gae + values[t];

        next_value = values[t];
    }

    (advantages, returns)
}

/// Standardize to zero mean and unit variance: `(x - mean) / (std + eps)`.
///
/// Uses the population standard deviation. The epsilon keeps a constant
/// batch (std = 0) finite: every element maps to 0.
///
/// # Edge Cases
///
/// - Empty slice: no-op
/// - Single element: becomes 0.0
pub fn normalize_advantages(advantages: &mut [f32]) {
    if advantages.is_empty() {
        return;
    }

    let n = advantages.len() as f32;
    let mean = advantages.iter().sum::<f32>() / n;
    let variance = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n;
    let std = variance.sqrt();

    for a in advantages.iter_mut() {
        *a = (*a - mean) / (std + NORMALIZATION_EPS);
    }
}

/// Output of [`AdvantageEstimator::estimate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvantageEstimates {
    /// Reward advantages [N]
    pub advantages: Vec<f32>,
    /// Cost advantages [N]
    pub cost_advantages: Vec<f32>,
    /// Reward-to-go regression targets [N]
    pub returns: Vec<f32>,
    /// Cost-to-go regression targets [N]
    pub cost_returns: Vec<f32>,
}

impl AdvantageEstimates {
    /// Number of transitions covered.
    pub fn len(&self) -> usize {
        self.advantages.len()
    }

    /// Whether the estimates are empty.
    pub fn is_empty(&self) -> bool {
        self.advantages.is_empty()
    }

    /// Whether every estimate is finite.
    pub fn is_finite(&self) -> bool {
        self.advantages
            .iter()
            .chain(&self.cost_advantages)
            .chain(&self.returns)
            .chain(&self.cost_returns)
            .all(|v| v.is_finite())
    }
}

/// Reward and cost GAE with a shared γ and λ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvantageEstimator {
    /// Discount factor
    pub gamma: f32,
    /// GAE λ parameter
    pub lam: f32,
}

impl AdvantageEstimator {
    /// Create an estimator.
    pub fn new(gamma: f32, lam: f32) -> Self {
        Self { gamma, lam }
    }

    /// Compute advantages and returns without standardizing the advantages.
    pub fn estimate_raw(
        &self,
        rewards: &[f32],
        costs: &[f32],
        masks: &[f32],
        values: &[f32],
        cost_values: &[f32],
    ) -> Result<AdvantageEstimates, CpoError> {
        let n = rewards.len();
        for (what, len) in [
            ("costs", costs.len()),
            ("masks", masks.len()),
            ("values", values.len()),
            ("cost values", cost_values.len()),
        ] {
            if len != n {
                return Err(CpoError::shape(what, n, len));
            }
        }

        let (advantages, returns) =
            compute_gae_masked(rewards, values, masks, self.gamma, self.lam);
        let (cost_advantages, cost_returns) =
            compute_gae_masked(costs, cost_values, masks, self.gamma, self.lam);

        Ok(AdvantageEstimates {
            advantages,
            cost_advantages,
            returns,
            cost_returns,
        })
    }

    /// Compute advantages and returns for both signals.
    ///
    /// Advantages and cost advantages are standardized; returns are left
    /// untouched since they are regression targets.
    pub fn estimate(
        &self,
        rewards: &[f32],
        costs: &[f32],
        masks: &[f32],
        values: &[f32],
        cost_values: &[f32],
    ) -> Result<AdvantageEstimates, CpoError> {
        let mut estimates = self.estimate_raw(rewards, costs, masks, values, cost_values)?;
        normalize_advantages(&mut estimates.advantages);
        normalize_advantages(&mut estimates.cost_advantages);
        Ok(estimates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gae_simple() {
        let rewards = vec![1.0, 1.0, 1.0];
        let values = vec![0.5, 0.5, 0.5];
        let masks = vec![1.0, 1.0, 1.0];

        let (advantages, returns) = compute_gae_masked(&rewards, &values, &masks, 0.99, 0.95);

        assert_eq!(advantages.len(), 3);
        for (i, (&a, &v)) in advantages.iter().zip(values.iter()).enumerate() {
            assert!(
                (returns[i] - (a + v)).abs() < 1e-6,
                "return[{}] != advantage[{}] + value[{}]",
                i,
                i,
                i
            );
        }
        // Last step has no bootstrap: 1.0 - 0.5
        assert!((advantages[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_gae_terminal_blocks_bootstrap() {
        // Episode ends at t=1; t=2 belongs to a new episode with a large value.
        let rewards = vec![1.0, 1.0, 0.0];
        let values = vec![0.0, 0.0, 100.0];
        let masks = vec![1.0, 0.0, 1.0];

        let (advantages, _) = compute_gae_masked(&rewards, &values, &masks, 0.99, 0.95);

        assert!((advantages[1] - 1.0).abs() < 1e-6, "got {}", advantages[1]);
        assert!((advantages[2] + 100.0).abs() < 1e-4, "got {}", advantages[2]);
    }

    #[test]
    fn test_normalize_advantages() {
        let mut advantages = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        normalize_advantages(&mut advantages);

        let mean: f32 = advantages.iter().sum::<f32>() / advantages.len() as f32;
        assert!(mean.abs() < 1e-6, "Expected mean≈0, got {}", mean);

        let variance: f32 =
            advantages.iter().map(|a| a.powi(2)).sum::<f32>() / advantages.len() as f32;
        assert!((variance.sqrt() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_constant_batch_is_finite() {
        let mut advantages = vec![3.0; 8];
        normalize_advantages(&mut advantages);
        assert!(advantages.iter().all(|a| *a == 0.0));
    }

    #[test]
    fn test_estimator_rejects_length_mismatch() {
        let estimator = AdvantageEstimator::new(0.99, 0.95);
        let err = estimator
            .estimate(&[1.0, 1.0], &[0.0], &[1.0, 0.0], &[0.0, 0.0], &[0.0, 0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            CpoError::ShapeMismatch {
                what: "costs",
                expected: 2,
                actual: 1
            }
        ));
    }
}
