//! Trajectory buffer for on-policy CPO updates.
//!
//! Key characteristics:
//! - Preserves temporal ordering (GAE walks the batch backwards)
//! - Episode boundaries are carried only by the done flags
//! - Batch length is whatever was collected; nothing assumes a fixed size

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::core::transition::Transition;
use crate::error::CpoError;

/// A finished batch of transitions, ready for advantage estimation.
#[derive(Debug, Clone)]
pub struct TrajectoryBatch {
    /// Transitions in collection order
    pub transitions: Vec<Transition>,
    /// Observation dimension
    pub obs_dim: usize,
    /// Action dimension
    pub action_dim: usize,
}

impl TrajectoryBatch {
    /// Get all observations as a flat vector [N * obs_dim].
    pub fn observations(&self) -> Vec<f32> {
        self.transitions
            .iter()
            .flat_map(|t| t.observation.iter().copied())
            .collect()
    }

    /// Get all actions as a flat vector [N * action_dim].
    pub fn actions(&self) -> Vec<f32> {
        self.transitions
            .iter()
            .flat_map(|t| t.action.iter().copied())
            .collect()
    }

    /// Get all rewards.
    pub fn rewards(&self) -> Vec<f32> {
        self.transitions.iter().map(|t| t.reward).collect()
    }

    /// Get all costs.
    pub fn costs(&self) -> Vec<f32> {
        self.transitions.iter().map(|t| t.cost).collect()
    }

    /// Get the non-terminal masks (0.0 where an episode ended).
    pub fn masks(&self) -> Vec<f32> {
        self.transitions.iter().map(|t| t.mask()).collect()
    }

    /// Observations as a [N, obs_dim] tensor.
    pub fn observation_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.observations(), [self.len(), self.obs_dim]),
            device,
        )
    }

    /// Actions as a [N, action_dim] tensor.
    pub fn action_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.actions(), [self.len(), self.action_dim]),
            device,
        )
    }

    /// Get total number of transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if batch is empty.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Accumulates transitions from sequential environment interaction.
#[derive(Debug)]
pub struct TrajectoryBuffer {
    obs_dim: usize,
    action_dim: usize,
    transitions: Vec<Transition>,
}

impl TrajectoryBuffer {
    /// Create an empty buffer for the given dimensions.
    pub fn new(obs_dim: usize, action_dim: usize) -> Self {
        Self {
            obs_dim,
            action_dim,
            transitions: Vec::new(),
        }
    }

    /// Create an empty buffer with capacity for `capacity` transitions.
    pub fn with_capacity(obs_dim: usize, action_dim: usize, capacity: usize) -> Self {
        Self {
            obs_dim,
            action_dim,
            transitions: Vec::with_capacity(capacity),
        }
    }

    /// Record a transition.
    ///
    /// Fails if the observation or action dimension disagrees with the buffer.
    pub fn push(&mut self, transition: Transition) -> Result<(), CpoError> {
        if transition.observation.len() != self.obs_dim {
            return Err(CpoError::shape(
                "transition observation",
                self.obs_dim,
                transition.observation.len(),
            ));
        }
        if transition.action.len() != self.action_dim {
            return Err(CpoError::shape(
                "transition action",
                self.action_dim,
                transition.action.len(),
            ));
        }
        self.transitions.push(transition);
        Ok(())
    }

    /// Number of transitions recorded so far.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Whether the most recent transition ended an episode.
    pub fn at_episode_boundary(&self) -> bool {
        self.transitions.last().map(|t| t.done()).unwrap_or(false)
    }

    /// Take all recorded transitions as a batch, leaving the buffer empty.
    pub fn take_batch(&mut self) -> TrajectoryBatch {
        TrajectoryBatch {
            transitions: std::mem::take(&mut self.transitions),
            obs_dim: self.obs_dim,
            action_dim: self.action_dim,
        }
    }

    /// Drop all recorded transitions.
    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn transition(i: usize, done: bool) -> Transition {
        Transition::new(
            vec![i as f32, -(i as f32)],
            vec![0.1 * i as f32],
            1.0,
            0.5,
            done,
            false,
        )
    }

    #[test]
    fn test_push_and_take_batch() {
        let mut buffer = TrajectoryBuffer::new(2, 1);
        for i in 0..5 {
            buffer.push(transition(i, i == 4)).unwrap();
        }
        assert_eq!(buffer.len(), 5);
        assert!(buffer.at_episode_boundary());

        let batch = buffer.take_batch();
        assert!(buffer.is_empty());
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.masks(), vec![1.0, 1.0, 1.0, 1.0, 0.0]);
        assert_eq!(batch.observations().len(), 10);
        assert_eq!(batch.costs(), vec![0.5; 5]);
    }

    #[test]
    fn test_push_rejects_wrong_observation_dim() {
        let mut buffer = TrajectoryBuffer::new(3, 1);
        let err = buffer.push(transition(0, false)).unwrap_err();
        assert!(matches!(
            err,
            CpoError::ShapeMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_batch_tensors_have_batch_shape() {
        let device = Default::default();
        let mut buffer = TrajectoryBuffer::new(2, 1);
        for i in 0..3 {
            buffer.push(transition(i, false)).unwrap();
        }
        let batch = buffer.take_batch();

        let obs = batch.observation_tensor::<TestBackend>(&device);
        let actions = batch.action_tensor::<TestBackend>(&device);
        assert_eq!(obs.dims(), [3, 2]);
        assert_eq!(actions.dims(), [3, 1]);

        let data = obs.into_data();
        let values = data.as_slice::<f32>().unwrap();
        assert_eq!(values, &[0.0, 0.0, 1.0, -1.0, 2.0, -2.0]);
    }
}
