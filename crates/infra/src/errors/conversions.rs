//! Conversions from external infrastructure errors into domain errors.

use fiscalsync_common::storage::StorageError;
use fiscalsync_core::LockStoreError;
use fiscalsync_domain::FiscalError;
use rusqlite::Error as SqlError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub FiscalError);

impl From<InfraError> for FiscalError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<FiscalError> for InfraError {
    fn from(value: FiscalError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoFiscalError {
    fn into_fiscal(self) -> FiscalError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → FiscalError */
/* -------------------------------------------------------------------------- */

impl IntoFiscalError for SqlError {
    fn into_fiscal(self) -> FiscalError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => FiscalError::Storage("database is busy".into()),
                    (ErrorCode::DatabaseLocked, _) => {
                        FiscalError::Storage("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        FiscalError::Storage(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::DiskFull, _) => FiscalError::Storage("disk is full".into()),
                    (ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase, _) => {
                        FiscalError::Storage(format!("database file is unusable: {message}"))
                    }
                    _ => FiscalError::Storage(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => FiscalError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                FiscalError::Storage(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                FiscalError::Storage(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => FiscalError::Storage(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => FiscalError::Storage(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_fiscal())
    }
}

/* -------------------------------------------------------------------------- */
/* StorageError → FiscalError */
/* -------------------------------------------------------------------------- */

impl IntoFiscalError for StorageError {
    fn into_fiscal(self) -> FiscalError {
        match self {
            StorageError::Rusqlite(err) => err.into_fiscal(),
            StorageError::Timeout(secs) => {
                FiscalError::Storage(format!("timed out acquiring a connection after {secs}s"))
            }
            other => FiscalError::Storage(other.to_string()),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_fiscal())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → FiscalError */
/* -------------------------------------------------------------------------- */

impl IntoFiscalError for JoinError {
    fn into_fiscal(self) -> FiscalError {
        if self.is_cancelled() {
            FiscalError::Internal("blocking task was cancelled".into())
        } else {
            FiscalError::Internal(format!("blocking task panicked: {self}"))
        }
    }
}

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        InfraError(value.into_fiscal())
    }
}

/// Map a pool or query error from a blocking repository call
pub fn map_storage_error(err: StorageError) -> FiscalError {
    FiscalError::from(InfraError::from(err))
}

/// Map the failure of a `spawn_blocking` task
pub fn map_join_error(err: JoinError) -> FiscalError {
    FiscalError::from(InfraError::from(err))
}

/// Lock store failures are all treated as the store being unreachable
pub(crate) fn storage_to_lock_error(err: StorageError) -> LockStoreError {
    LockStoreError::Unreachable(err.to_string())
}

pub(crate) fn postgres_to_lock_error(err: &tokio_postgres::Error) -> LockStoreError {
    LockStoreError::Unreachable(format!("postgres: {err}"))
}

#[cfg(test)]
mod tests {
    use rusqlite::ffi::{Error as FfiError, ErrorCode};

    use super::*;

    #[test]
    fn sqlite_busy_maps_to_storage_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".into()),
        );
        let mapped: FiscalError = InfraError::from(err).into();
        assert_eq!(mapped, FiscalError::Storage("database is busy".into()));
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let mapped: FiscalError = InfraError::from(SqlError::QueryReturnedNoRows).into();
        assert!(matches!(mapped, FiscalError::NotFound(_)));
    }

    #[test]
    fn storage_timeout_maps_to_storage_error() {
        let mapped = map_storage_error(StorageError::Timeout(5));
        assert!(matches!(mapped, FiscalError::Storage(ref msg) if msg.contains("5s")));
    }

    #[tokio::test]
    async fn panicking_task_maps_to_internal() {
        let err = tokio::task::spawn_blocking(|| -> u32 { panic!("boom") }).await.unwrap_err();
        assert!(matches!(map_join_error(err), FiscalError::Internal(_)));
    }
}
