//! Per-iteration training history.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::algorithms::cpo::UpdateStats;
use crate::error::CpoError;

/// Telemetry for one training iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    /// Zero-based iteration index.
    pub iteration: usize,
    /// Environment steps taken so far, including this iteration.
    pub env_steps: usize,
    /// Episodes that ended in this iteration's batch.
    pub episodes: usize,
    /// Transitions in this iteration's batch.
    pub batch_len: usize,
    /// Average undiscounted return of the episodes in the batch.
    pub avg_return: f32,
    /// Average undiscounted cost of the episodes in the batch.
    pub avg_cost: f32,
    /// Reward value loss before this iteration's step.
    pub value_loss: f64,
    /// Cost value loss before this iteration's step.
    pub cost_value_loss: f64,
    /// Outcome of the policy update.
    pub update: UpdateStats,
}

/// Records of every completed iteration, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingHistory {
    pub records: Vec<IterationRecord>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: IterationRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }

    /// Average episode return per iteration.
    pub fn avg_returns(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.avg_return).collect()
    }

    /// Average episode cost per iteration.
    pub fn avg_costs(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.avg_cost).collect()
    }

    /// Fraction of iterations whose policy step was accepted.
    pub fn acceptance_rate(&self) -> f32 {
        if self.records.is_empty() {
            return 0.0;
        }
        let accepted = self.records.iter().filter(|r| r.update.accepted).count();
        accepted as f32 / self.records.len() as f32
    }

    /// Write the history as pretty-printed JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), CpoError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
