//! Evaluating configurations against the remote system.

use std::time::Duration;

use ct_optimizer::{Evaluation, ObjectiveEvaluator};
use ct_types::Configuration;
use tracing::debug;

use crate::objective::MetricObjective;
use crate::system::SystemUnderTest;

/// Applies a configuration, waits for the system to settle, then scores the
/// metrics it reports.
#[derive(Debug)]
pub struct RemoteEvaluator<S, O> {
    system: S,
    objective: O,
    settle: Duration,
}

impl<S, O> RemoteEvaluator<S, O> {
    pub fn new(system: S, objective: O, settle: Duration) -> Self {
        Self {
            system,
            objective,
            settle,
        }
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn objective(&self) -> &O {
        &self.objective
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }
}

impl<S, O> ObjectiveEvaluator for RemoteEvaluator<S, O>
where
    S: SystemUnderTest,
    O: MetricObjective,
{
    type Fitness = O::Fitness;

    fn evaluate(&mut self, configuration: &Configuration) -> Evaluation<O::Fitness> {
        debug!(?configuration, "applying configuration");
        self.system.apply(configuration)?;

        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }

        let metrics = self.system.read_metrics()?;
        debug!(?metrics, "metrics read");
        Ok(self.objective.score(&metrics))
    }
}
