//! The remote system being tuned, as seen by the evaluator.

use std::collections::BTreeMap;

use ct_types::{Configuration, EvaluationError};
use serde_json::Value;

/// Flat metric name to value mapping read back from the system.
pub type Metrics = BTreeMap<String, f64>;

/// Apply-then-measure access to the system under test.
pub trait SystemUnderTest {
    /// Replace the live configuration.
    fn apply(&mut self, configuration: &Configuration) -> Result<(), EvaluationError>;

    /// Read the current aggregate metrics.
    fn read_metrics(&mut self) -> Result<Metrics, EvaluationError>;
}

/// Flatten a JSON object into dotted metric names.
///
/// Finite numbers and numeric strings become metrics; other leaves,
/// including `"NaN"` and `"inf"` strings, are skipped and so read as missing.
/// Anything but an object at the top level is a malformed payload.
pub fn flatten_metrics(body: &Value) -> Result<Metrics, EvaluationError> {
    let Value::Object(map) = body else {
        return Err(EvaluationError::MalformedPayload {
            message: format!("expected a JSON object, got {body}"),
        });
    };
    let mut metrics = Metrics::new();
    for (key, value) in map {
        collect(key, value, &mut metrics);
    }
    Ok(metrics)
}

fn collect(name: &str, value: &Value, metrics: &mut Metrics) {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                metrics.insert(name.to_string(), v);
            }
        }
        Value::String(s) => {
            match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => {
                    metrics.insert(name.to_string(), v);
                }
                _ => {}
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                collect(&format!("{name}.{key}"), nested, metrics);
            }
        }
        Value::Array(_) | Value::Bool(_) | Value::Null => {}
    }
}
