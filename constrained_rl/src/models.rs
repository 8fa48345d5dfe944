//! Function approximators used by CPO.
//!
//! The updater and trainers are generic over two traits:
//! - [`GaussianPolicyModel`]: observation batch → diagonal Gaussian over actions
//! - [`ValueModel`]: observation batch → one scalar per observation
//!
//! [`MlpGaussianPolicy`] and [`MlpValue`] are small tanh MLPs that satisfy
//! them. The policy uses a state-independent log_std: a single learned
//! parameter shared by every state.

use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::tanh;

use crate::algorithms::gaussian::DiagGaussian;
use crate::error::CpoError;

/// A policy producing a diagonal Gaussian over actions.
pub trait GaussianPolicyModel<B: Backend>: Module<B> + Clone + Send + 'static {
    /// Action distribution for a batch of observations [batch, obs_size].
    fn forward(&self, observations: Tensor<B, 2>) -> DiagGaussian<B>;

    /// Observation dimension.
    fn obs_size(&self) -> usize;

    /// Action dimension.
    fn action_dim(&self) -> usize;

    /// [`GaussianPolicyModel::forward`] after checking the observation dimension.
    fn distribution(&self, observations: Tensor<B, 2>) -> Result<DiagGaussian<B>, CpoError> {
        let actual = observations.dims()[1];
        if actual != self.obs_size() {
            return Err(CpoError::shape("policy observation dim", self.obs_size(), actual));
        }
        Ok(self.forward(observations))
    }
}

/// A state-value estimator.
pub trait ValueModel<B: Backend>: Module<B> + Clone + Send + 'static {
    /// Values for a batch of observations: [batch, 1].
    fn forward(&self, observations: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Observation dimension.
    fn obs_size(&self) -> usize;

    /// Values as a flat [batch] tensor after checking the observation dimension.
    fn predict(&self, observations: Tensor<B, 2>) -> Result<Tensor<B, 1>, CpoError> {
        let [batch_size, actual] = observations.dims();
        if actual != self.obs_size() {
            return Err(CpoError::shape("value observation dim", self.obs_size(), actual));
        }
        Ok(self.forward(observations).reshape([batch_size]))
    }
}

/// Build a [batch, obs_size] tensor from flat observations.
///
/// A single observation becomes a batch of one. Lengths that are not a
/// positive multiple of `obs_size` are rejected.
pub fn observations_to_tensor<B: Backend>(
    observations: &[f32],
    obs_size: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>, CpoError> {
    if obs_size == 0 || observations.is_empty() || observations.len() % obs_size != 0 {
        return Err(CpoError::shape(
            "observations",
            obs_size,
            observations.len(),
        ));
    }
    let batch_size = observations.len() / obs_size;
    Ok(Tensor::from_data(
        TensorData::new(observations.to_vec(), [batch_size, obs_size]),
        device,
    ))
}

// ============================================================================
// MLP Gaussian policy
// ============================================================================

/// Configuration for [`MlpGaussianPolicy`].
#[derive(Debug, Clone)]
pub struct MlpPolicyConfig {
    pub obs_size: usize,
    pub action_dim: usize,
    /// Width of both hidden layers.
    pub hidden_size: usize,
    /// Initial value of every log_std entry (0.0 → std = 1).
    pub initial_log_std: f32,
}

impl MlpPolicyConfig {
    pub fn new(obs_size: usize, action_dim: usize) -> Self {
        Self {
            obs_size,
            action_dim,
            hidden_size: 64,
            initial_log_std: 0.0,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_initial_log_std(mut self, initial_log_std: f32) -> Self {
        self.initial_log_std = initial_log_std;
        self
    }

    /// Initialize the policy.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MlpGaussianPolicy<B> {
        MlpGaussianPolicy {
            hidden_0: LinearConfig::new(self.obs_size, self.hidden_size).init(device),
            hidden_1: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            mean_head: LinearConfig::new(self.hidden_size, self.action_dim).init(device),
            log_std: Param::from_tensor(
                Tensor::zeros([self.action_dim], device).add_scalar(self.initial_log_std),
            ),
            obs_size: self.obs_size,
            action_dim: self.action_dim,
        }
    }
}

/// Two tanh hidden layers, a linear mean head and a learned log_std.
#[derive(Module, Debug)]
pub struct MlpGaussianPolicy<B: Backend> {
    hidden_0: Linear<B>,
    hidden_1: Linear<B>,
    mean_head: Linear<B>,
    log_std: Param<Tensor<B, 1>>,
    obs_size: usize,
    action_dim: usize,
}

impl<B: Backend> GaussianPolicyModel<B> for MlpGaussianPolicy<B> {
    fn forward(&self, observations: Tensor<B, 2>) -> DiagGaussian<B> {
        let x = tanh(self.hidden_0.forward(observations));
        let x = tanh(self.hidden_1.forward(x));
        let mean = self.mean_head.forward(x);
        DiagGaussian::with_shared_log_std(mean, self.log_std.val())
    }

    fn obs_size(&self) -> usize {
        self.obs_size
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }
}

// ============================================================================
// MLP value estimator
// ============================================================================

/// Configuration for [`MlpValue`].
#[derive(Debug, Clone)]
pub struct MlpValueConfig {
    pub obs_size: usize,
    /// Width of both hidden layers.
    pub hidden_size: usize,
}

impl MlpValueConfig {
    pub fn new(obs_size: usize) -> Self {
        Self {
            obs_size,
            hidden_size: 64,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Initialize the estimator.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MlpValue<B> {
        MlpValue {
            hidden_0: LinearConfig::new(self.obs_size, self.hidden_size).init(device),
            hidden_1: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            value_head: LinearConfig::new(self.hidden_size, 1).init(device),
            obs_size: self.obs_size,
        }
    }
}

/// Two tanh hidden layers and a scalar head.
#[derive(Module, Debug)]
pub struct MlpValue<B: Backend> {
    hidden_0: Linear<B>,
    hidden_1: Linear<B>,
    value_head: Linear<B>,
    obs_size: usize,
}

impl<B: Backend> ValueModel<B> for MlpValue<B> {
    fn forward(&self, observations: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = tanh(self.hidden_0.forward(observations));
        let x = tanh(self.hidden_1.forward(x));
        self.value_head.forward(x)
    }

    fn obs_size(&self) -> usize {
        self.obs_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_policy_shapes() {
        let device = Default::default();
        let policy: MlpGaussianPolicy<TestBackend> =
            MlpPolicyConfig::new(4, 2).with_hidden_size(16).init(&device);

        let dist = policy.forward(Tensor::zeros([5, 4], &device));
        assert_eq!(dist.mean.dims(), [5, 2]);
        assert_eq!(dist.log_std.dims(), [5, 2]);
    }

    #[test]
    fn test_policy_rejects_wrong_obs_dim() {
        let device = Default::default();
        let policy: MlpGaussianPolicy<TestBackend> = MlpPolicyConfig::new(4, 2).init(&device);

        let err = policy
            .distribution(Tensor::zeros([5, 3], &device))
            .unwrap_err();
        assert!(matches!(
            err,
            CpoError::ShapeMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_value_predict_is_flat() {
        let device = Default::default();
        let value: MlpValue<TestBackend> = MlpValueConfig::new(3).init(&device);
        let out = value.predict(Tensor::ones([7, 3], &device)).unwrap();
        assert_eq!(out.dims(), [7]);
    }

    #[test]
    fn test_single_observation_promoted_to_batch() {
        let device = Default::default();
        let obs = observations_to_tensor::<TestBackend>(&[1.0, 2.0, 3.0], 3, &device).unwrap();
        assert_eq!(obs.dims(), [1, 3]);

        let obs = observations_to_tensor::<TestBackend>(&[0.0; 6], 3, &device).unwrap();
        assert_eq!(obs.dims(), [2, 3]);

        assert!(observations_to_tensor::<TestBackend>(&[0.0; 4], 3, &device).is_err());
    }
}
