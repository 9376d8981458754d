//! Turning measured metrics into optimizer fitness.

use ct_types::FitnessVector;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::system::Metrics;

/// Whether we are maximizing or minimizing a scalar objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

/// Maps a metric snapshot to a fitness value.
pub trait MetricObjective {
    type Fitness;

    fn score(&self, metrics: &Metrics) -> Self::Fitness;
}

/// One weighted metric of a scalar objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTerm {
    pub metric: String,
    #[serde(default = "unit_weight")]
    pub weight: f64,
}

fn unit_weight() -> f64 {
    1.0
}

/// Weighted sum of metrics, oriented so that larger is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarObjective {
    pub terms: Vec<MetricTerm>,
    pub direction: ObjectiveDirection,
}

impl ScalarObjective {
    pub fn new(direction: ObjectiveDirection) -> Self {
        Self {
            terms: Vec::new(),
            direction,
        }
    }

    pub fn add_term(mut self, metric: impl Into<String>, weight: f64) -> Self {
        self.terms.push(MetricTerm {
            metric: metric.into(),
            weight,
        });
        self
    }
}

impl MetricObjective for ScalarObjective {
    type Fitness = f64;

    /// A missing metric makes the whole value `-inf`.
    fn score(&self, metrics: &Metrics) -> f64 {
        let mut total = 0.0;
        for term in &self.terms {
            match metrics.get(&term.metric) {
                Some(v) => total += term.weight * v,
                None => {
                    warn!(metric = %term.metric, "metric missing from response");
                    return f64::NEG_INFINITY;
                }
            }
        }
        match self.direction {
            ObjectiveDirection::Maximize => total,
            ObjectiveDirection::Minimize => -total,
        }
    }
}

/// One minimized objective per metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorObjective {
    pub metrics: Vec<String>,
}

impl VectorObjective {
    pub fn new<I, S>(metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metrics: metrics.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl MetricObjective for VectorObjective {
    type Fitness = FitnessVector;

    fn score(&self, metrics: &Metrics) -> FitnessVector {
        self.metrics
            .iter()
            .map(|name| match metrics.get(name) {
                Some(v) => *v,
                None => {
                    warn!(metric = %name, "metric missing from response");
                    f64::INFINITY
                }
            })
            .collect::<Vec<_>>()
            .into()
    }
}
