//! Error types used throughout the fiscalization core

use std::time::Duration;

use fiscalsync_common::error::{ErrorClassification, ErrorSeverity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for FiscalSync
///
/// One variant per failure category a caller must be able to branch on.
/// `CapacityExceeded` is backpressure, `Storage` is fatal and never retried
/// internally, `RemoteCall` consumes retry budget, `CircuitOpen` does not.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum FiscalError {
    #[error("Buffer capacity exceeded: {capacity} unsynced receipts")]
    CapacityExceeded { capacity: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    #[error("Max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for FiscalSync operations
pub type Result<T> = std::result::Result<T, FiscalError>;

impl ErrorClassification for FiscalError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteCall(_) | Self::CircuitOpen(_) | Self::LockUnavailable(_))
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound(_) => ErrorSeverity::Info,
            Self::CapacityExceeded { .. }
            | Self::RemoteCall(_)
            | Self::CircuitOpen(_)
            | Self::LockUnavailable(_) => ErrorSeverity::Warning,
            Self::MaxRetriesExceeded { .. } | Self::Config(_) | Self::InvalidInput(_) => {
                ErrorSeverity::Error
            }
            Self::Storage(_) | Self::Internal(_) => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Internal(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Failure reported by the remote fiscal-operator client
///
/// Every variant counts as a failure for the circuit breaker and consumes one
/// unit of the receipt's retry budget.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteError {
    #[error("operator call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("operator rejected document: {reason}")]
    Rejected { reason: String },

    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("operator server error {status}: {message}")]
    Server { status: u16, message: String },
}

impl RemoteError {
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout { after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX) }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected { reason: reason.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }
}

impl From<RemoteError> for FiscalError {
    fn from(err: RemoteError) -> Self {
        Self::RemoteCall(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(FiscalError::CapacityExceeded { capacity: 200 }).unwrap();
        assert_eq!(json["type"], "CapacityExceeded");
        assert_eq!(json["message"]["capacity"], 200);

        let json = serde_json::to_value(FiscalError::Storage("disk full".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Storage", "message": "disk full" }));
    }

    /// Validates the classification of each taxonomy category.
    ///
    /// Assertions:
    /// - Ensures remote and circuit failures are retryable.
    /// - Ensures storage failures are critical and not retryable.
    /// - Ensures not-found is informational only.
    #[test]
    fn classification_matches_taxonomy() {
        assert!(FiscalError::RemoteCall("503".into()).is_retryable());
        assert!(FiscalError::CircuitOpen("operator".into()).is_retryable());

        let storage = FiscalError::Storage("io".into());
        assert!(!storage.is_retryable());
        assert!(storage.is_critical());
        assert_eq!(storage.severity(), ErrorSeverity::Critical);

        assert_eq!(FiscalError::NotFound("x".into()).severity(), ErrorSeverity::Info);
        assert!(!FiscalError::MaxRetriesExceeded { attempts: 20 }.is_retryable());
    }

    #[test]
    fn remote_error_converts_to_remote_call() {
        let err: FiscalError = RemoteError::timeout(Duration::from_secs(10)).into();
        assert_eq!(err, FiscalError::RemoteCall("operator call timed out after 10000ms".into()));
    }
}
