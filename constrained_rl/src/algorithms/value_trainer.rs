//! Value regression for the reward and cost value estimators.
//!
//! CPO keeps two baselines with the same architecture: V(s) for rewards and
//! V_c(s) for costs. Each is fitted with one gradient step of MSE towards its
//! GAE returns per iteration.

use std::marker::PhantomData;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use crate::error::CpoError;
use crate::models::ValueModel;

/// Adam with epsilon 1e-5 and optional gradient-norm clipping.
pub fn create_value_optimizer<B, M>(max_grad_norm: Option<f32>) -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut adam_config = AdamConfig::new().with_epsilon(1e-5);

    if let Some(max_norm) = max_grad_norm {
        adam_config = adam_config.with_grad_clipping(Some(GradientClippingConfig::Norm(max_norm)));
    }

    adam_config.init()
}

/// Fits a [`ValueModel`] to regression targets.
pub struct ValueFunctionTrainer<B, M, O>
where
    B: AutodiffBackend,
    M: ValueModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    model: M,
    optimizer: O,
    learning_rate: f64,
    _backend: PhantomData<B>,
}

impl<B, M, O> ValueFunctionTrainer<B, M, O>
where
    B: AutodiffBackend,
    M: ValueModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub fn new(model: M, optimizer: O, learning_rate: f64) -> Self {
        Self {
            model,
            optimizer,
            learning_rate,
            _backend: PhantomData,
        }
    }

    /// The estimator being trained.
    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Estimates for a batch of observations, detached from the graph.
    pub fn predict(&self, observations: Tensor<B, 2>) -> Result<Vec<f32>, CpoError> {
        let values = self.model.predict(observations)?.detach();
        Ok(values.into_data().iter::<f32>().collect())
    }

    /// One MSE gradient step towards `targets`.
    ///
    /// Returns the loss before the step.
    pub fn update(&mut self, observations: Tensor<B, 2>, targets: &[f32]) -> Result<f64, CpoError> {
        let n = observations.dims()[0];
        if targets.len() != n {
            return Err(CpoError::shape("value targets", n, targets.len()));
        }

        let device = observations.device();
        let targets = Tensor::<B, 1>::from_data(TensorData::new(targets.to_vec(), [n]), &device);

        let values = self.model.predict(observations)?;
        let loss = (values - targets).powf_scalar(2.0).mean();
        let loss_value = loss.clone().into_scalar().elem::<f64>();
        if !loss_value.is_finite() {
            return Err(CpoError::NonFinite { what: "value loss" });
        }

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self
            .optimizer
            .step(self.learning_rate, self.model.clone(), grads);

        Ok(loss_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MlpValue, MlpValueConfig};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    type TestModel = MlpValue<TestBackend>;

    fn trainer(
    ) -> ValueFunctionTrainer<TestBackend, TestModel, impl Optimizer<TestModel, TestBackend>> {
        let device = Default::default();
        let model: TestModel = MlpValueConfig::new(2).with_hidden_size(16).init(&device);
        let optimizer = create_value_optimizer::<TestBackend, TestModel>(None);
        ValueFunctionTrainer::new(model, optimizer, 1e-2)
    }

    #[test]
    fn test_loss_decreases_on_fixed_targets() {
        let device = Default::default();
        let mut trainer = trainer();
        let obs = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 1.0], [1.0, 0.0], [0.5, 0.5], [-1.0, 0.2]],
            &device,
        );
        let targets = [1.0, -1.0, 0.0, 2.0];

        let first = trainer.update(obs.clone(), &targets).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = trainer.update(obs.clone(), &targets).unwrap();
        }
        assert!(last < first, "loss {} -> {}", first, last);
    }

    #[test]
    fn test_update_rejects_target_length() {
        let device = Default::default();
        let mut trainer = trainer();
        let obs = Tensor::<TestBackend, 2>::zeros([3, 2], &device);
        let err = trainer.update(obs, &[0.0, 0.0]).unwrap_err();
        assert!(matches!(err, CpoError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_predict_checks_obs_dim() {
        let device = Default::default();
        let trainer = trainer();
        assert_eq!(
            trainer
                .predict(Tensor::<TestBackend, 2>::zeros([4, 2], &device))
                .unwrap()
                .len(),
            4
        );
        assert!(trainer
            .predict(Tensor::<TestBackend, 2>::zeros([4, 3], &device))
            .is_err());
    }
}
