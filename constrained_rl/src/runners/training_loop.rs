//! Sequential CPO training loop.
//!
//! ```text
//! for iteration in 0..n_iterations:
//!     collect ≥ batch_size transitions, ending on an episode boundary
//!     V, V_c            ← value estimates for the batch
//!     A, A_c, R, R_c    ← GAE (reward and cost)
//!     fit V on R, V_c on R_c (one step each)
//!     constrained policy update on A, A_c
//!     append IterationRecord to the history
//! ```
//!
//! Actions are sampled from the policy, clipped to the environment bounds
//! before stepping, and recorded unclipped: the policy update evaluates the
//! log-density of the action that was actually sampled.

use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::algorithms::cpo::ConstrainedPolicyUpdater;
use crate::algorithms::gae::AdvantageEstimator;
use crate::algorithms::value_trainer::ValueFunctionTrainer;
use crate::buffers::{TrajectoryBatch, TrajectoryBuffer};
use crate::config::CpoConfig;
use crate::core::Transition;
use crate::environment::{clip_action, CostEnv};
use crate::error::CpoError;
use crate::metrics::{IterationRecord, MetricsLogger, TrainingHistory};
use crate::models::{observations_to_tensor, GaussianPolicyModel, ValueModel};

/// Undiscounted totals of the episodes that ended in one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeStats {
    pub returns: Vec<f32>,
    pub costs: Vec<f32>,
}

impl EpisodeStats {
    pub fn episodes(&self) -> usize {
        self.returns.len()
    }

    pub fn avg_return(&self) -> f32 {
        mean(&self.returns)
    }

    pub fn avg_cost(&self) -> f32 {
        mean(&self.costs)
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Owns the environment, the policy, both value estimators and the history.
///
/// Both value trainers share the optimizer type, so a pair created by
/// [`create_value_optimizer`](crate::algorithms::value_trainer::create_value_optimizer)
/// fits directly.
pub struct TrainingLoop<B, E, P, V, O>
where
    B: AutodiffBackend,
    E: CostEnv,
    P: GaussianPolicyModel<B>,
    V: ValueModel<B> + AutodiffModule<B>,
    O: Optimizer<V, B>,
{
    env: E,
    policy: P,
    updater: ConstrainedPolicyUpdater<B, P>,
    value_trainer: ValueFunctionTrainer<B, V, O>,
    cost_value_trainer: ValueFunctionTrainer<B, V, O>,
    estimator: AdvantageEstimator,
    buffer: TrajectoryBuffer,
    config: CpoConfig,
    rng: StdRng,
    device: B::Device,
    history: TrainingHistory,
    env_steps: usize,
    seeded: bool,
}

impl<B, E, P, V, O> TrainingLoop<B, E, P, V, O>
where
    B: AutodiffBackend,
    E: CostEnv,
    P: GaussianPolicyModel<B>,
    V: ValueModel<B> + AutodiffModule<B>,
    O: Optimizer<V, B>,
{
    /// Validate `config` and check that every model fits the environment.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        env: E,
        policy: P,
        value_model: V,
        cost_value_model: V,
        value_optimizer: O,
        cost_value_optimizer: O,
        config: CpoConfig,
        device: B::Device,
    ) -> Result<Self, CpoError> {
        config.validate()?;

        let obs_size = env.obs_size();
        let action_dim = env.action_dim();
        if policy.obs_size() != obs_size {
            return Err(CpoError::shape("policy observation dim", obs_size, policy.obs_size()));
        }
        if policy.action_dim() != action_dim {
            return Err(CpoError::shape("policy action dim", action_dim, policy.action_dim()));
        }
        for model in [&value_model, &cost_value_model] {
            if model.obs_size() != obs_size {
                return Err(CpoError::shape("value observation dim", obs_size, model.obs_size()));
            }
        }

        Ok(Self {
            updater: ConstrainedPolicyUpdater::new(&policy, config.clone()),
            value_trainer: ValueFunctionTrainer::new(value_model, value_optimizer, config.value_lr),
            cost_value_trainer: ValueFunctionTrainer::new(
                cost_value_model,
                cost_value_optimizer,
                config.cost_value_lr,
            ),
            estimator: AdvantageEstimator::new(config.gamma, config.lam),
            buffer: TrajectoryBuffer::with_capacity(obs_size, action_dim, config.batch_size),
            rng: StdRng::seed_from_u64(config.seed),
            env,
            policy,
            config,
            device,
            history: TrainingHistory::new(),
            env_steps: 0,
            seeded: false,
        })
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn value_model(&self) -> &V {
        self.value_trainer.model()
    }

    pub fn cost_value_model(&self) -> &V {
        self.cost_value_trainer.model()
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn config(&self) -> &CpoConfig {
        &self.config
    }

    /// Environment steps taken so far.
    pub fn env_steps(&self) -> usize {
        self.env_steps
    }

    /// Consume the loop, returning the trained policy and the history.
    pub fn into_parts(self) -> (P, TrainingHistory) {
        (self.policy, self.history)
    }

    /// Run `config.n_iterations` iterations, logging each record.
    pub fn run(&mut self, logger: &mut dyn MetricsLogger) -> Result<&TrainingHistory, CpoError> {
        log::info!(
            "Starting CPO: {} iterations, batch_size={}, max_kl={}, delta={}",
            self.config.n_iterations,
            self.config.batch_size,
            self.config.max_kl,
            self.config.delta
        );

        for _ in 0..self.config.n_iterations {
            let record = self.run_iteration()?;
            logger.log(&record);
        }
        logger.flush();

        Ok(&self.history)
    }

    /// Collect one batch and run one full update on it.
    pub fn run_iteration(&mut self) -> Result<IterationRecord, CpoError> {
        let iteration = self.history.len();
        let (batch, episodes) = self.collect_batch()?;

        let observations = batch.observation_tensor::<B>(&self.device);
        let values = self.value_trainer.predict(observations.clone())?;
        let cost_values = self.cost_value_trainer.predict(observations.clone())?;

        let estimates = self.estimator.estimate(
            &batch.rewards(),
            &batch.costs(),
            &batch.masks(),
            &values,
            &cost_values,
        )?;
        if !estimates.is_finite() {
            return Err(CpoError::NonFinite {
                what: "advantage estimates",
            });
        }

        let value_loss = self
            .value_trainer
            .update(observations.clone(), &estimates.returns)?;
        let cost_value_loss = self
            .cost_value_trainer
            .update(observations.clone(), &estimates.cost_returns)?;

        let update = self.updater.update(
            &mut self.policy,
            observations,
            batch.action_tensor::<B>(&self.device),
            &estimates.advantages,
            &estimates.cost_advantages,
        )?;

        let record = IterationRecord {
            iteration,
            env_steps: self.env_steps,
            episodes: episodes.episodes(),
            batch_len: batch.len(),
            avg_return: episodes.avg_return(),
            avg_cost: episodes.avg_cost(),
            value_loss,
            cost_value_loss,
            update,
        };

        log::info!(
            "iter {}: return={:.3} cost={:.3} episodes={} batch={} accepted={} kl={:.2e}",
            record.iteration,
            record.avg_return,
            record.avg_cost,
            record.episodes,
            record.batch_len,
            record.update.accepted,
            record.update.kl
        );

        self.history.push(record.clone());
        Ok(record)
    }

    /// Roll out the current policy until at least `batch_size` transitions are
    /// recorded and the last one ends an episode.
    ///
    /// Transitions left over from a failed collection are discarded first.
    pub fn collect_batch(&mut self) -> Result<(TrajectoryBatch, EpisodeStats), CpoError> {
        self.buffer.clear();
        let low = self.env.action_low();
        let high = self.env.action_high();
        let obs_size = self.env.obs_size();

        let mut stats = EpisodeStats::default();
        let mut episode_return = 0.0f32;
        let mut episode_cost = 0.0f32;
        let mut episode_len = 0usize;
        let mut observation = self.reset_env()?;

        loop {
            // Checked before sampling: a malformed observation never yields an action
            if observation.len() != obs_size {
                return Err(CpoError::shape(
                    "environment observation",
                    obs_size,
                    observation.len(),
                ));
            }
            let obs_tensor = observations_to_tensor::<B>(&observation, obs_size, &self.device)?;
            let action: Vec<f32> = self
                .policy
                .distribution(obs_tensor)?
                .detach()
                .sample(&mut self.rng)
                .into_data()
                .iter::<f32>()
                .collect();

            let clipped = clip_action(&action, &low, &high);
            let step = self.env.step(&clipped).map_err(CpoError::environment)?;
            self.env_steps += 1;
            episode_len += 1;

            let cost = step.effective_cost();
            let hit_limit = self
                .config
                .max_episode_steps
                .map_or(false, |limit| episode_len >= limit);
            let transition = Transition::new(
                observation,
                action,
                step.reward,
                cost,
                step.terminated,
                step.truncated || hit_limit,
            );
            let done = transition.done();
            self.buffer.push(transition)?;

            episode_return += step.reward;
            episode_cost += cost;

            if done {
                stats.returns.push(episode_return);
                stats.costs.push(episode_cost);
                episode_return = 0.0;
                episode_cost = 0.0;
                episode_len = 0;

                if self.buffer.len() >= self.config.batch_size {
                    break;
                }
                observation = self.reset_env()?;
            } else {
                observation = step.observation;
            }
        }

        let batch = self.buffer.take_batch();
        log::debug!(
            "Collected {} transitions over {} episodes",
            batch.len(),
            stats.episodes()
        );
        Ok((batch, stats))
    }

    /// The first reset of a run seeds the environment.
    fn reset_env(&mut self) -> Result<Vec<f32>, CpoError> {
        let seed = if self.seeded {
            None
        } else {
            self.seeded = true;
            Some(self.config.seed)
        };
        let (observation, _info) = self.env.reset(seed).map_err(CpoError::environment)?;
        Ok(observation)
    }
}
