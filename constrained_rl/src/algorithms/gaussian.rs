//! Diagonal Gaussian action distribution.
//!
//! The policy outputs a mean and a log standard deviation per action
//! dimension; dimensions are independent. Everything CPO needs is closed
//! form:
//!
//! ```text
//! log N(a; μ, σ)   = Σ_i [ -0.5 ((a_i - μ_i)/σ_i)² - log σ_i - 0.5 log(2π) ]
//! H                = Σ_i [ log σ_i + 0.5 (1 + log(2π)) ]
//! KL(p || q)       = Σ_i [ log σ_q - log σ_p + (σ_p² + (μ_p - μ_q)²) / (2σ_q²) - 0.5 ]
//! ```

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;
use rand_distr::StandardNormal;

/// Batched diagonal Gaussian: `mean` and `log_std` are both [batch, action_dim].
#[derive(Debug, Clone)]
pub struct DiagGaussian<B: Backend> {
    /// Mean per sample and action dimension
    pub mean: Tensor<B, 2>,
    /// Log standard deviation per sample and action dimension
    pub log_std: Tensor<B, 2>,
}

impl<B: Backend> DiagGaussian<B> {
    /// Build from a mean and a log standard deviation of the same shape.
    pub fn new(mean: Tensor<B, 2>, log_std: Tensor<B, 2>) -> Self {
        Self { mean, log_std }
    }

    /// Build from a mean and a state-independent log std of shape [action_dim].
    pub fn with_shared_log_std(mean: Tensor<B, 2>, log_std: Tensor<B, 1>) -> Self {
        let [batch_size, action_dim] = mean.dims();
        let log_std = log_std
            .reshape([1, action_dim])
            .repeat_dim(0, batch_size);
        Self { mean, log_std }
    }

    /// Batch size.
    pub fn batch_size(&self) -> usize {
        self.mean.dims()[0]
    }

    /// Action dimension.
    pub fn action_dim(&self) -> usize {
        self.mean.dims()[1]
    }

    /// Draw one action per sample.
    ///
    /// Noise comes from `rng` rather than the backend's global generator so
    /// that rollouts are reproducible from a seed.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Tensor<B, 2> {
        let [batch_size, action_dim] = self.mean.dims();
        let noise: Vec<f32> = (0..batch_size * action_dim)
            .map(|_| rng.sample(StandardNormal))
            .collect();
        let noise = Tensor::<B, 2>::from_data(
            TensorData::new(noise, [batch_size, action_dim]),
            &self.mean.device(),
        );

        // Reparameterization: sample = mean + std * noise
        self.mean.clone() + self.log_std.clone().exp() * noise
    }

    /// Log density of `actions` summed over action dimensions: [batch].
    pub fn log_prob(&self, actions: Tensor<B, 2>) -> Tensor<B, 1> {
        let batch_size = self.batch_size();
        let std = self.log_std.clone().exp();
        let normalized = (actions - self.mean.clone()) / std;
        let log_2pi = (2.0 * std::f32::consts::PI).ln();

        let log_prob_per_dim: Tensor<B, 2> =
            normalized.powf_scalar(2.0).mul_scalar(-0.5) - self.log_std.clone() - 0.5 * log_2pi;

        log_prob_per_dim.sum_dim(1).reshape([batch_size])
    }

    /// Per-sample KL(self || other): [batch].
    pub fn kl(&self, other: &Self) -> Tensor<B, 1> {
        let batch_size = self.batch_size();
        let var_self = self.log_std.clone().mul_scalar(2.0).exp();
        let var_other = other.log_std.clone().mul_scalar(2.0).exp();
        let mean_diff_sq = (self.mean.clone() - other.mean.clone()).powf_scalar(2.0);

        let kl_per_dim: Tensor<B, 2> = other.log_std.clone() - self.log_std.clone()
            + (var_self + mean_diff_sq) / var_other.mul_scalar(2.0)
            - 0.5;

        kl_per_dim.sum_dim(1).reshape([batch_size])
    }

    /// Per-sample entropy: [batch].
    pub fn entropy(&self) -> Tensor<B, 1> {
        let [batch_size, action_dim] = self.mean.dims();
        let log_2pi = (2.0 * std::f32::consts::PI).ln();
        let constant = 0.5 * action_dim as f32 * (1.0 + log_2pi);

        self.log_std
            .clone()
            .sum_dim(1)
            .reshape([batch_size])
            .add_scalar(constant)
    }

    /// Cut both tensors out of the autodiff graph.
    pub fn detach(self) -> Self {
        Self {
            mean: self.mean.detach(),
            log_std: self.log_std.detach(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    fn dist(mean: [[f32; 2]; 2], log_std: [[f32; 2]; 2]) -> DiagGaussian<TestBackend> {
        let device = Default::default();
        DiagGaussian::new(
            Tensor::from_floats(mean, &device),
            Tensor::from_floats(log_std, &device),
        )
    }

    fn to_vec(t: Tensor<TestBackend, 1>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_log_prob_standard_normal_at_mean() {
        let d = dist([[0.0, 0.0], [1.0, -1.0]], [[0.0, 0.0], [0.0, 0.0]]);
        let device = Default::default();
        let actions = Tensor::from_floats([[0.0, 0.0], [1.0, -1.0]], &device);

        let expected = -(2.0 * std::f32::consts::PI).ln();
        for lp in to_vec(d.log_prob(actions)) {
            assert!((lp - expected).abs() < 1e-5, "got {}", lp);
        }
    }

    #[test]
    fn test_kl_self_is_zero() {
        let d = dist([[0.3, -0.2], [1.0, 2.0]], [[-0.5, 0.1], [0.2, -1.0]]);
        for kl in to_vec(d.kl(&d.clone())) {
            assert!(kl.abs() < 1e-6, "got {}", kl);
        }
    }

    #[test]
    fn test_kl_known_value() {
        // Unit variances, mean shift of 1 in one dimension: KL = 0.5
        let p = dist([[0.0, 0.0], [0.0, 0.0]], [[0.0, 0.0], [0.0, 0.0]]);
        let q = dist([[1.0, 0.0], [0.0, 1.0]], [[0.0, 0.0], [0.0, 0.0]]);
        for kl in to_vec(p.kl(&q)) {
            assert!((kl - 0.5).abs() < 1e-6, "got {}", kl);
        }
    }

    #[test]
    fn test_entropy_grows_with_std() {
        let narrow = dist([[0.0, 0.0], [0.0, 0.0]], [[-1.0, -1.0], [-1.0, -1.0]]);
        let wide = dist([[0.0, 0.0], [0.0, 0.0]], [[1.0, 1.0], [1.0, 1.0]]);
        let h_narrow = to_vec(narrow.entropy());
        let h_wide = to_vec(wide.entropy());
        assert!((h_wide[0] - h_narrow[0] - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_sample_is_seeded() {
        let d = dist([[0.0, 0.0], [5.0, 5.0]], [[0.0, 0.0], [-3.0, -3.0]]);
        let a = d.sample(&mut StdRng::seed_from_u64(7)).into_data();
        let b = d.sample(&mut StdRng::seed_from_u64(7)).into_data();
        assert_eq!(a, b);

        // Second row has std ≈ 0.05 around 5.0
        let values = a.to_vec::<f32>().unwrap();
        assert!((values[2] - 5.0).abs() < 0.5);
        assert!((values[3] - 5.0).abs() < 0.5);
    }

    #[test]
    fn test_shared_log_std_broadcasts() {
        let device = Default::default();
        let d = DiagGaussian::<TestBackend>::with_shared_log_std(
            Tensor::zeros([3, 2], &device),
            Tensor::from_floats([0.5, -0.5], &device),
        );
        assert_eq!(d.log_std.dims(), [3, 2]);
        let values = d.log_std.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.5, -0.5, 0.5, -0.5, 0.5, -0.5]);
    }
}
