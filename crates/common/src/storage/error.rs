//! Storage error types
//!
//! Defines error types for the storage layer, integrating with the common
//! error classification system.

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Storage error type
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database query error: {0}")]
    Query(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Database pool exhausted")]
    PoolExhausted,

    #[error("Connection timeout after {0}s")]
    Timeout(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: i32, found: i32 },

    #[error(transparent)]
    Common(#[from] crate::CommonError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    R2d2(#[from] r2d2::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;

impl ErrorClassification for StorageError {
    /// Retryable errors are pool pressure and transient SQLite locks.
    fn is_retryable(&self) -> bool {
        match self {
            Self::PoolExhausted | Self::Timeout(_) | Self::Connection(_) => true,
            Self::Rusqlite(err) => matches!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            Self::Common(common_err) => common_err.is_retryable(),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::PoolExhausted | Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Migration(_) | Self::SchemaVersionMismatch { .. } => ErrorSeverity::Critical,
            Self::Rusqlite(err) if is_disk_failure(err) => ErrorSeverity::Critical,
            Self::Common(common_err) => common_err.severity(),
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        match self {
            Self::Migration(_) | Self::SchemaVersionMismatch { .. } => true,
            Self::Rusqlite(err) => is_disk_failure(err),
            Self::Common(err) => err.is_critical(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::Common(common_err) => common_err.retry_after(),
            _ => None,
        }
    }
}

/// Failures that indicate the database file itself is unusable.
fn is_disk_failure(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(
            rusqlite::ErrorCode::SystemIoFailure
                | rusqlite::ErrorCode::DatabaseCorrupt
                | rusqlite::ErrorCode::DiskFull
                | rusqlite::ErrorCode::ReadOnly
                | rusqlite::ErrorCode::NotADatabase
        )
    )
}

impl StorageError {
    /// Add operation context to the error
    pub fn with_operation(self, operation: impl Into<String>) -> Self {
        let operation = operation.into();
        Self::Common(crate::CommonError::Storage {
            message: self.to_string(),
            operation: Some(operation),
        })
    }
}

/// Convert StorageError to CommonError for integration
impl From<StorageError> for crate::CommonError {
    fn from(err: StorageError) -> Self {
        if let StorageError::Common(common_err) = err {
            return common_err;
        }

        crate::CommonError::Storage { message: err.to_string(), operation: None }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for storage::error.
    use super::*;

    /// Validates `StorageError::Connection` behavior for the error display
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the connection, timeout and mismatch messages render.
    #[test]
    fn test_error_display() {
        let err = StorageError::Connection("Failed to connect".to_string());
        assert_eq!(err.to_string(), "Database connection error: Failed to connect");

        let err = StorageError::Timeout(5);
        assert_eq!(err.to_string(), "Connection timeout after 5s");

        let err = StorageError::SchemaVersionMismatch { expected: 2, found: 1 };
        assert_eq!(err.to_string(), "Schema version mismatch: expected 2, found 1");
    }

    /// Validates retryability across pool pressure and configuration errors.
    ///
    /// Assertions:
    /// - Ensures pool exhaustion and timeouts are retryable.
    /// - Ensures invalid configuration is not retryable.
    #[test]
    fn test_error_retryability() {
        assert!(StorageError::PoolExhausted.is_retryable());
        assert!(StorageError::Timeout(5).is_retryable());
        assert!(!StorageError::InvalidConfig("test".to_string()).is_retryable());
        assert!(!StorageError::Migration("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_error_criticality() {
        assert!(StorageError::Migration("test".to_string()).is_critical());
        assert!(StorageError::SchemaVersionMismatch { expected: 2, found: 1 }.is_critical());
        assert!(!StorageError::Timeout(5).is_critical());
        assert_eq!(StorageError::Timeout(5).severity(), ErrorSeverity::Warning);
    }

    /// Validates `StorageError::Query` behavior for the with operation
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures `common_err.to_string().contains("mark_synced")` evaluates to
    ///   true.
    #[test]
    fn test_with_operation() {
        let err = StorageError::Query("UPDATE failed".to_string()).with_operation("mark_synced");

        if let StorageError::Common(common_err) = err {
            assert!(common_err.to_string().contains("mark_synced"));
        } else {
            panic!("Expected Common error variant");
        }
    }
}
