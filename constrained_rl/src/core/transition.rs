//! Transition type recorded during rollouts.
//!
//! A transition carries both signals CPO needs: the reward being maximized
//! and the cost being constrained.

/// One environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation the action was taken in
    pub observation: Vec<f32>,
    /// Action as sampled from the policy (before clipping to env bounds)
    pub action: Vec<f32>,
    /// Reward received
    pub reward: f32,
    /// Safety cost incurred
    pub cost: f32,
    /// Episode terminated (goal reached, failure, etc.)
    pub terminated: bool,
    /// Episode truncated (time limit, etc.)
    pub truncated: bool,
}

impl Transition {
    /// Create a new transition.
    pub fn new(
        observation: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        cost: f32,
        terminated: bool,
        truncated: bool,
    ) -> Self {
        Self {
            observation,
            action,
            reward,
            cost,
            terminated,
            truncated,
        }
    }

    /// Check if the episode ended at this step (terminal or truncated).
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }

    /// Non-terminal mask used by GAE: 0.0 when the episode ended here.
    pub fn mask(&self) -> f32 {
        if self.done() {
            0.0
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_and_mask() {
        let t = Transition::new(vec![0.0], vec![0.5], 1.0, 0.0, false, false);
        assert!(!t.done());
        assert_eq!(t.mask(), 1.0);

        let t = Transition::new(vec![0.0], vec![0.5], 1.0, 0.0, false, true);
        assert!(t.done());
        assert_eq!(t.mask(), 0.0);

        let t = Transition::new(vec![0.0], vec![0.5], 1.0, 1.0, true, false);
        assert!(t.done());
        assert_eq!(t.mask(), 0.0);
    }
}
