//! Error taxonomy shared across the engine.
//!
//! Every variant names the offending artifact id(s) or fields so callers can
//! correct the request. Only `Timeout` is ever retried automatically, and
//! only by the job runner within its bounded retry policy.

use thiserror::Error;

use crate::artifact::{ErrorDetail, FailureKind};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("artifact `{id}` not found")]
    NotFound { id: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("conversion failed: {message}")]
    ConversionError { message: String },

    #[error("converter call `{op}` timed out after {attempts} attempt(s)")]
    Timeout { op: String, attempts: u32 },

    #[error("artifact `{id}` already has a job in progress")]
    AlreadyInProgress { id: String },

    #[error("aggregation for `{grouping_key}` rejected: {}", .problems.join("; "))]
    IncompleteInput {
        grouping_key: String,
        problems: Vec<String>,
    },

    #[error("conflict on artifact `{id}`: {reason}")]
    Conflict { id: String, reason: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    pub fn internal(message: impl Into<String>) -> Self {
        CoreError::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        CoreError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Failure classification recorded on an artifact that this error failed.
    pub fn failure_detail(&self) -> ErrorDetail {
        let kind = match self {
            CoreError::InvalidInput { .. } => FailureKind::InvalidInput,
            CoreError::ConversionError { .. } => FailureKind::ConversionError,
            CoreError::Timeout { .. } => FailureKind::Timeout,
            _ => FailureKind::Internal,
        };
        ErrorDetail::new(kind, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_detail_classifies_by_variant() {
        let timeout = CoreError::Timeout {
            op: "script-to-audio".into(),
            attempts: 3,
        };
        assert_eq!(timeout.failure_detail().kind, FailureKind::Timeout);

        let invalid = CoreError::invalid_input("empty content");
        assert_eq!(invalid.failure_detail().kind, FailureKind::InvalidInput);

        let not_found = CoreError::NotFound { id: "x".into() };
        assert_eq!(not_found.failure_detail().kind, FailureKind::Internal);
    }

    #[test]
    fn incomplete_input_lists_every_problem() {
        let err = CoreError::IncompleteInput {
            grouping_key: "2024-W05".into(),
            problems: vec![
                "member `a` does not exist".into(),
                "member `b` has status failed".into(),
            ],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("member `a` does not exist"));
        assert!(rendered.contains("member `b` has status failed"));
    }
}
