//! Parameter schema, search bounds, and the named configurations sent to the
//! system under test.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::errors::{CtError, CtResult};
use crate::validation_error;

/// Ordered coordinates of a candidate point in the search space.
pub type ParameterVector = Vec<f64>;

/// Named parameter values as sent to the system under test.
pub type Configuration = BTreeMap<String, ParameterValue>;

/// A single named field of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Field name agreed with the system under test (e.g. "route_random_sigma").
    pub name: String,
    /// How the field is searched.
    pub kind: ParameterKind,
}

/// Describes how a configuration field is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Continuous range [low, high].
    Float { low: f64, high: f64 },
    /// Integer range [low, high] inclusive. Searched continuously, rounded on
    /// the way out.
    Int { low: i64, high: i64 },
    /// Constant value, never searched.
    Fixed { value: ParameterValue },
}

impl ParameterKind {
    fn range(&self) -> Option<(f64, f64)> {
        match self {
            Self::Float { low, high } => Some((*low, *high)),
            Self::Int { low, high } => Some((*low as f64, *high as f64)),
            Self::Fixed { .. } => None,
        }
    }
}

/// A concrete configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
        }
    }
}

/// Per-dimension `(low, high)` limits of the searchable space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    ranges: Vec<(f64, f64)>,
}

impl Bounds {
    /// Build bounds, rejecting empty, non-finite or inverted ranges.
    pub fn new(ranges: Vec<(f64, f64)>) -> CtResult<Self> {
        if ranges.is_empty() {
            return Err(validation_error!("bounds must have at least one dimension"));
        }
        for (i, (low, high)) in ranges.iter().enumerate() {
            if !low.is_finite() || !high.is_finite() {
                return Err(validation_error!("dimension {i} has non-finite bounds"));
            }
            if low > high {
                return Err(validation_error!(
                    "dimension {i} has low {low} greater than high {high}"
                ));
            }
        }
        Ok(Self { ranges })
    }

    pub fn dim(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[(f64, f64)] {
        &self.ranges
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.ranges.len()
            && x
                .iter()
                .zip(&self.ranges)
                .all(|(v, (low, high))| *v >= *low && *v <= *high)
    }

    /// Fail loudly if `x` has the wrong length or leaves the box.
    pub fn check(&self, x: &[f64]) -> CtResult<()> {
        if x.len() != self.ranges.len() {
            return Err(CtError::DimensionMismatch {
                expected: self.ranges.len(),
                actual: x.len(),
            });
        }
        for (index, (value, (low, high))) in x.iter().zip(&self.ranges).enumerate() {
            if !(*value >= *low && *value <= *high) {
                return Err(CtError::DomainInput {
                    index,
                    value: *value,
                    low: *low,
                    high: *high,
                });
            }
        }
        Ok(())
    }

    /// Uniform sample from the box.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterVector {
        self.ranges
            .iter()
            .map(|(low, high)| rng.random_range(*low..=*high))
            .collect()
    }

    pub fn clamp(&self, x: &mut [f64]) {
        for (v, (low, high)) in x.iter_mut().zip(&self.ranges) {
            *v = v.clamp(*low, *high);
        }
    }

    /// Map `x` into the unit cube. Degenerate dimensions map to 0.5.
    pub fn normalize(&self, x: &[f64]) -> ParameterVector {
        x.iter()
            .zip(&self.ranges)
            .map(|(v, (low, high))| {
                let width = high - low;
                if width.abs() < f64::EPSILON {
                    0.5
                } else {
                    (v - low) / width
                }
            })
            .collect()
    }
}

/// Ordered description of every configuration field.
///
/// Tunable fields (`Float`, `Int`) occupy the parameter vector in declaration
/// order; `Fixed` fields are always emitted with their constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub parameters: Vec<ParameterDef>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Float { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Int { low, high },
        });
        self
    }

    pub fn add_fixed(mut self, name: impl Into<String>, value: ParameterValue) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Fixed { value },
        });
        self
    }

    /// Tunable fields in vector order.
    pub fn tunable(&self) -> impl Iterator<Item = &ParameterDef> {
        self.parameters
            .iter()
            .filter(|p| !matches!(p.kind, ParameterKind::Fixed { .. }))
    }

    pub fn dim(&self) -> usize {
        self.tunable().count()
    }

    /// Check the schema once, before any run starts.
    pub fn validate(&self) -> CtResult<()> {
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if param.name.is_empty() {
                return Err(validation_error!("parameter names must not be empty"));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(validation_error!("duplicate parameter '{}'", param.name));
            }
        }
        self.bounds().map(|_| ())
    }

    pub fn bounds(&self) -> CtResult<Bounds> {
        let ranges = self.tunable().filter_map(|p| p.kind.range()).collect();
        Bounds::new(ranges)
    }

    /// Translate an in-bounds vector into the named configuration.
    pub fn configuration(&self, x: &[f64]) -> CtResult<Configuration> {
        self.bounds()?.check(x)?;

        let mut values = x.iter();
        let mut config = Configuration::new();
        for param in &self.parameters {
            let value = match &param.kind {
                ParameterKind::Fixed { value } => value.clone(),
                kind => {
                    let v = *values
                        .next()
                        .ok_or_else(|| CtError::Internal("vector exhausted".to_string()))?;
                    match kind {
                        ParameterKind::Int { .. } => ParameterValue::Int(v.round() as i64),
                        _ => ParameterValue::Float(v),
                    }
                }
            };
            config.insert(param.name.clone(), value);
        }
        Ok(config)
    }
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::new()
    }
}
