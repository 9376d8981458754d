use thiserror::Error;

/// Main error type for the CrowdTune system
#[derive(Error, Debug)]
pub enum CtError {
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parameter {index} = {value} outside bounds [{low}, {high}]")]
    DomainInput {
        index: usize,
        value: f64,
        low: f64,
        high: f64,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Numeric error: {0}")]
    Numeric(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures of a single remote evaluation.
///
/// These never abort an optimization run; the optimizers turn them into the
/// worst-possible fitness for the objective they are driving.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Request to {endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },
}

/// Result type alias for CrowdTune operations
pub type CtResult<T> = Result<T, CtError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::CtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::CtError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CtError::DomainInput {
            index: 2,
            value: 1.5,
            low: 0.0,
            high: 1.0,
        };

        let message = error.to_string();
        assert!(message.contains("Parameter 2"));
        assert!(message.contains("1.5"));
        assert!(message.contains("[0, 1]"));
    }

    #[test]
    fn test_error_conversion() {
        let evaluation_error = EvaluationError::Status {
            endpoint: "/execute".to_string(),
            status: 503,
        };
        let ct_error: CtError = evaluation_error.into();

        match ct_error {
            CtError::Evaluation(EvaluationError::Status { status, .. }) => assert_eq!(status, 503),
            _ => panic!("Expected Evaluation error"),
        }
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid value: {}", 42);
        assert!(matches!(validation_err, CtError::Validation(_)));
        let config_err = config_error!("Missing required field: {}", "schema");
        assert!(config_err.to_string().contains("schema"));
    }
}
