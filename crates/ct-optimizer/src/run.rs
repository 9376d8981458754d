//! Run bookkeeping shared by both optimizers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique optimization run identifier.
pub type RunId = Uuid;

/// Which search strategy produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Bayesian,
    Nsga2,
}

/// Lifecycle state for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
}

/// Aggregate status of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub strategy: Strategy,
    pub state: RunState,
    pub evaluations_completed: usize,
    pub evaluations_failed: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStatus {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy,
            state: RunState::Pending,
            evaluations_completed: 0,
            evaluations_failed: 0,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Count one evaluation; failed ones are also counted as completed calls.
    pub fn record_evaluation(&mut self, failed: bool) {
        self.evaluations_completed += 1;
        if failed {
            self.evaluations_failed += 1;
        }
    }

    pub fn total_evaluations(&self) -> usize {
        self.evaluations_completed
    }
}
