//! Objective values produced by evaluations.

use serde::{Deserialize, Serialize};

use crate::space::ParameterVector;

/// Objectives to minimize, one entry per objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessVector(pub Vec<f64>);

impl FitnessVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// The sentinel used when an evaluation fails: `+inf` everywhere.
    pub fn worst(objectives: usize) -> Self {
        Self(vec![f64::INFINITY; objectives])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for FitnessVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// One real evaluation of the scalar objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub parameters: ParameterVector,
    pub value: f64,
}

impl Observation {
    pub fn new(parameters: ParameterVector, value: f64) -> Self {
        Self { parameters, value }
    }
}
