//! Error taxonomy for the decision engine.
//!
//! Every failure mode the core can surface maps to one of these variants so
//! that callers (and the KPI layer downstream) can distinguish degraded
//! decisions from clean ones without string matching.

use thiserror::Error;

/// Unified error type for all core components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A feature lookup failed. Recoverable: the feature engineer falls back
    /// to documented defaults instead of failing the whole vector.
    #[error("feature data unavailable: {0}")]
    DataUnavailable(String),

    /// Invalid construction-time configuration (ensemble weights, arm set,
    /// epsilon out of range). Fatal: must prevent startup.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A reward or pricing call referenced an arm that was never registered.
    /// Recoverable: surfaced to the caller, no bandit state is mutated.
    #[error("unknown arm: {0}")]
    UnknownArm(String),

    /// An external collaborator timed out or refused the call. Recoverable:
    /// the orchestrator degrades the decision and flags the record.
    #[error("collaborator unavailable: {0}")]
    ServiceUnavailable(String),

    /// The ensemble could not produce a risk score (every model failed).
    #[error("prediction failed: {0}")]
    Prediction(String),
}

impl EngineError {
    /// Short stable label for the error class, used in record status fields
    /// and log output.
    pub fn class(&self) -> &'static str {
        match self {
            EngineError::DataUnavailable(_) => "data_unavailable",
            EngineError::Configuration(_) => "configuration",
            EngineError::UnknownArm(_) => "unknown_arm",
            EngineError::ServiceUnavailable(_) => "service_unavailable",
            EngineError::Prediction(_) => "prediction",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class_labels() {
        assert_eq!(
            EngineError::UnknownArm("mystery".to_string()).class(),
            "unknown_arm"
        );
        assert_eq!(
            EngineError::ServiceUnavailable("log write timed out".to_string()).class(),
            "service_unavailable"
        );
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::Configuration("weights sum to 0.9".to_string());
        assert_eq!(err.to_string(), "invalid configuration: weights sum to 0.9");
    }
}
