//! Environment abstraction for constrained training.
//!
//! A [`CostEnv`] is a single (non-vectorized) continuous-control environment
//! that reports a safety cost next to the reward on every step. The training
//! loop resets it explicitly when an episode ends.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Extra per-step information.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    /// Aggregate cost reported by the environment. Preferred over
    /// [`EnvStep::cost`] when present.
    pub cost_sum: Option<f32>,
}

/// Result from stepping an environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvStep {
    /// Observation after the step [obs_size]
    pub observation: Vec<f32>,
    pub reward: f32,
    pub cost: f32,
    /// Episode ended due to goal/failure
    pub terminated: bool,
    /// Episode ended due to time limit
    pub truncated: bool,
    pub info: StepInfo,
}

impl EnvStep {
    /// Terminal OR truncated.
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }

    /// The cost to record: `info.cost_sum` if reported, else `cost`.
    pub fn effective_cost(&self) -> f32 {
        self.info.cost_sum.unwrap_or(self.cost)
    }
}

/// Continuous-action environment with a safety cost signal.
pub trait CostEnv {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start a new episode. `Some(seed)` reseeds the environment first.
    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, StepInfo), Self::Error>;

    /// Apply an action that already lies within the action bounds.
    fn step(&mut self, action: &[f32]) -> Result<EnvStep, Self::Error>;

    /// Size of the observation vector.
    fn obs_size(&self) -> usize;

    /// Size of the action vector.
    fn action_dim(&self) -> usize;

    /// Element-wise lower action bounds [action_dim].
    fn action_low(&self) -> Vec<f32>;

    /// Element-wise upper action bounds [action_dim].
    fn action_high(&self) -> Vec<f32>;
}

/// Clip each action component to `[low_i, high_i]`.
pub fn clip_action(action: &[f32], low: &[f32], high: &[f32]) -> Vec<f32> {
    action
        .iter()
        .zip(low.iter().zip(high))
        .map(|(&a, (&lo, &hi))| a.max(lo).min(hi))
        .collect()
}

// ============================================================================
// LinearPointEnv
// ============================================================================

/// Errors raised by [`LinearPointEnv`].
#[derive(Debug, Clone, PartialEq)]
pub enum PointEnvError {
    /// Action has the wrong number of components.
    ActionDim { expected: usize, actual: usize },
    /// `step` called before the first `reset`.
    NotReset,
}

impl fmt::Display for PointEnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointEnvError::ActionDim { expected, actual } => {
                write!(f, "expected action of length {}, got {}", expected, actual)
            }
            PointEnvError::NotReset => write!(f, "step called before reset"),
        }
    }
}

impl std::error::Error for PointEnvError {}

/// Point mass in the plane with linear dynamics.
///
/// - state: position `x ∈ R²`, observed directly
/// - dynamics: `x' = x + dt · a`, `a ∈ [-1, 1]²`
/// - reward: `-‖x' - goal‖`
/// - cost: 1 while `x'` is inside the hazard disc, else 0
/// - terminated: `x'` left the square arena
/// - truncated: `max_steps` steps taken
#[derive(Debug, Clone)]
pub struct LinearPointEnv {
    position: [f32; 2],
    steps: usize,
    started: bool,
    rng: StdRng,
    dt: f32,
    goal: [f32; 2],
    hazard_center: [f32; 2],
    hazard_radius: f32,
    arena_half_width: f32,
    max_steps: usize,
}

impl LinearPointEnv {
    pub const OBS_SIZE: usize = 2;
    pub const ACTION_DIM: usize = 2;

    /// Create an environment seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            position: [0.0; 2],
            steps: 0,
            started: false,
            rng: StdRng::seed_from_u64(seed),
            dt: 0.1,
            goal: [1.0, 1.0],
            hazard_center: [0.5, 0.5],
            hazard_radius: 0.3,
            arena_half_width: 2.0,
            max_steps: 100,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_hazard(mut self, center: [f32; 2], radius: f32) -> Self {
        self.hazard_center = center;
        self.hazard_radius = radius;
        self
    }

    pub fn with_goal(mut self, goal: [f32; 2]) -> Self {
        self.goal = goal;
        self
    }

    /// Current position.
    pub fn position(&self) -> [f32; 2] {
        self.position
    }

    fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
    }

    fn in_hazard(&self) -> bool {
        Self::distance(self.position, self.hazard_center) < self.hazard_radius
    }
}

impl CostEnv for LinearPointEnv {
    type Error = PointEnvError;

    fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f32>, StepInfo), Self::Error> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.position = [self.rng.gen_range(-1.0..1.0), self.rng.gen_range(-1.0..1.0)];
        self.steps = 0;
        self.started = true;
        Ok((self.position.to_vec(), StepInfo::default()))
    }

    fn step(&mut self, action: &[f32]) -> Result<EnvStep, Self::Error> {
        if !self.started {
            return Err(PointEnvError::NotReset);
        }
        if action.len() != Self::ACTION_DIM {
            return Err(PointEnvError::ActionDim {
                expected: Self::ACTION_DIM,
                actual: action.len(),
            });
        }

        self.position[0] += self.dt * action[0];
        self.position[1] += self.dt * action[1];
        self.steps += 1;

        let reward = -Self::distance(self.position, self.goal);
        let cost = if self.in_hazard() { 1.0 } else { 0.0 };
        let terminated = self
            .position
            .iter()
            .any(|p| p.abs() > self.arena_half_width);
        let truncated = !terminated && self.steps >= self.max_steps;
        if terminated || truncated {
            self.started = false;
        }

        Ok(EnvStep {
            observation: self.position.to_vec(),
            reward,
            cost,
            terminated,
            truncated,
            info: StepInfo::default(),
        })
    }

    fn obs_size(&self) -> usize {
        Self::OBS_SIZE
    }

    fn action_dim(&self) -> usize {
        Self::ACTION_DIM
    }

    fn action_low(&self) -> Vec<f32> {
        vec![-1.0; Self::ACTION_DIM]
    }

    fn action_high(&self) -> Vec<f32> {
        vec![1.0; Self::ACTION_DIM]
    }
}
