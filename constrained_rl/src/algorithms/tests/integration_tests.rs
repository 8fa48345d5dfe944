//! End-to-end tests: rollouts, advantage estimation, value fitting and the
//! constrained update running together on the point environment.

use burn::backend::{Autodiff, NdArray};
use burn::optim::Optimizer;

use crate::algorithms::gae::AdvantageEstimator;
use crate::algorithms::param_vector::ParameterVector;
use crate::algorithms::value_trainer::create_value_optimizer;
use crate::config::CpoConfig;
use crate::environment::LinearPointEnv;
use crate::error::CpoError;
use crate::metrics::{MetricsLogger, NullLogger};
use crate::models::{MlpGaussianPolicy, MlpPolicyConfig, MlpValue, MlpValueConfig, ValueModel};
use crate::runners::TrainingLoop;

type TestBackend = Autodiff<NdArray<f32>>;

type PointLoop<O> = TrainingLoop<
    TestBackend,
    LinearPointEnv,
    MlpGaussianPolicy<TestBackend>,
    MlpValue<TestBackend>,
    O,
>;

fn point_loop(
    config: CpoConfig,
) -> Result<PointLoop<impl Optimizer<MlpValue<TestBackend>, TestBackend>>, CpoError> {
    let device = Default::default();
    let env = LinearPointEnv::new(config.seed).with_max_steps(50);
    TrainingLoop::new(
        env,
        MlpPolicyConfig::new(LinearPointEnv::OBS_SIZE, LinearPointEnv::ACTION_DIM)
            .with_hidden_size(16)
            .init(&device),
        MlpValueConfig::new(LinearPointEnv::OBS_SIZE)
            .with_hidden_size(16)
            .init(&device),
        MlpValueConfig::new(LinearPointEnv::OBS_SIZE)
            .with_hidden_size(16)
            .init(&device),
        create_value_optimizer::<TestBackend, MlpValue<TestBackend>>(Some(1.0)),
        create_value_optimizer::<TestBackend, MlpValue<TestBackend>>(Some(1.0)),
        config,
        device,
    )
}

/// Default trust region and cost budget on small batches.
fn small_config() -> CpoConfig {
    CpoConfig::new()
        .with_batch_size(256)
        .with_n_iterations(5)
        .with_seed(42)
}

/// Counts how often it was called.
#[derive(Default)]
struct CountingLogger {
    logged: usize,
    flushed: usize,
}

impl MetricsLogger for CountingLogger {
    fn log(&mut self, _record: &crate::metrics::IterationRecord) {
        self.logged += 1;
    }

    fn flush(&mut self) {
        self.flushed += 1;
    }
}

/// Five iterations complete with finite statistics everywhere and the
/// per-episode cost stays bounded by where it started.
#[test]
fn test_training_run_produces_finite_history() {
    let config = small_config();
    assert_eq!(config.delta, 0.01);
    assert_eq!(config.max_kl, 0.01);
    let mut training = point_loop(config).unwrap();
    let mut logger = CountingLogger::default();

    let history = training.run(&mut logger).unwrap();

    assert_eq!(history.len(), 5);
    assert_eq!(logger.logged, 5);
    assert_eq!(logger.flushed, 1);

    for (i, record) in history.records.iter().enumerate() {
        assert_eq!(record.iteration, i);
        assert!(record.batch_len >= 256);
        assert!(record.episodes >= 1);
        assert!(record.avg_return.is_finite());
        // Per-step cost is 0 or 1 and episodes last at most 50 steps
        assert!(record.avg_cost >= 0.0 && record.avg_cost <= 50.0);
        assert!(record.value_loss.is_finite());
        assert!(record.cost_value_loss.is_finite());
        assert!(record.update.kl.is_finite());
        assert!(record.update.surrogate_before.is_finite());
        if record.update.accepted {
            assert!(record.update.kl <= 0.01);
        }
    }
    assert!(history.acceptance_rate() > 0.0);

    let costs = history.avg_costs();
    assert_eq!(costs.len(), 5);
    let (first, last) = (costs[0], costs[4]);
    assert!(
        last <= 3.0 * first + 5.0,
        "episode cost grew from {} to {}",
        first,
        last
    );
}

/// Advantages and returns computed on a collected batch are finite and the
/// advantages come out standardized.
#[test]
fn test_collected_batch_gives_finite_estimates() {
    let config = small_config();
    let estimator = AdvantageEstimator::new(config.gamma, config.lam);
    let mut training = point_loop(config).unwrap();

    let (batch, stats) = training.collect_batch().unwrap();
    assert!(batch.len() >= 256);
    assert!(stats.episodes() >= 1);

    let device = Default::default();
    let observations = batch.observation_tensor::<TestBackend>(&device);
    let values: Vec<f32> = training
        .value_model()
        .predict(observations.clone())
        .unwrap()
        .into_data()
        .iter::<f32>()
        .collect();
    let cost_values: Vec<f32> = training
        .cost_value_model()
        .predict(observations)
        .unwrap()
        .into_data()
        .iter::<f32>()
        .collect();

    let estimates = estimator
        .estimate(
            &batch.rewards(),
            &batch.costs(),
            &batch.masks(),
            &values,
            &cost_values,
        )
        .unwrap();

    assert_eq!(estimates.len(), batch.len());
    assert!(estimates.is_finite());
    let n = estimates.len() as f32;
    let mean: f32 = estimates.advantages.iter().sum::<f32>() / n;
    assert!(mean.abs() < 1e-3);
}

/// Every batch ends on an episode boundary and env steps add up.
#[test]
fn test_env_steps_match_batches() {
    let mut training = point_loop(small_config().with_n_iterations(3)).unwrap();

    training.run(&mut NullLogger).unwrap();

    let total: usize = training.history().records.iter().map(|r| r.batch_len).sum();
    assert_eq!(training.env_steps(), total);
    let last = training.history().last().unwrap();
    assert_eq!(last.env_steps, total);
}

/// The value networks move towards the returns.
#[test]
fn test_value_models_are_trained() {
    let mut training = point_loop(small_config().with_n_iterations(1)).unwrap();
    let before = ParameterVector::flatten(training.value_model());
    let cost_before = ParameterVector::flatten(training.cost_value_model());

    training.run_iteration().unwrap();

    assert_ne!(ParameterVector::flatten(training.value_model()), before);
    assert_ne!(ParameterVector::flatten(training.cost_value_model()), cost_before);
}

/// `into_parts` hands back the trained policy and its history.
#[test]
fn test_into_parts_returns_policy_and_history() {
    let mut training = point_loop(small_config().with_n_iterations(2)).unwrap();
    training.run(&mut NullLogger).unwrap();
    let trained = ParameterVector::flatten(training.policy());

    let (policy, history) = training.into_parts();

    assert_eq!(history.len(), 2);
    assert_eq!(ParameterVector::flatten(&policy), trained);
}
