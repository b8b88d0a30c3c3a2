//! Lock store on the shared SQLite file
//!
//! Coordinates every process that opens the same database file. Lease
//! expiry is judged against each caller's wall clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fiscalsync_common::storage::StorageError;
use fiscalsync_core::{LockStore, LockStoreError, LockToken};
use rusqlite::{params, OptionalExtension};
use tokio::task;

use crate::database::DbManager;
use crate::errors::storage_to_lock_error;

/// Lease rows live in `sync_locks`; a released lease keeps its row so the
/// fencing token never goes backwards
#[derive(Debug, Clone)]
pub struct SqliteLockStore {
    db: Arc<DbManager>,
}

impl SqliteLockStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    async fn run<T, F>(&self, op: F) -> Result<T, LockStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db.get_connection().map_err(|e| LockStoreError::Unreachable(e.to_string()))?;
            op(&conn).map_err(|e| storage_to_lock_error(StorageError::from(e)))
        })
        .await
        .map_err(|e| LockStoreError::Unreachable(format!("lock task failed: {e}")))?
    }
}

#[async_trait]
impl LockStore for SqliteLockStore {
    async fn try_acquire(
        &self,
        resource: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, LockStoreError> {
        let resource = resource.to_string();
        let owner = owner.to_string();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| LockStoreError::Unreachable(format!("invalid ttl: {e}")))?;

        self.run(move |conn| {
            let now = Utc::now();
            let expires_at = now + ttl;
            let row: Option<(i64, i64)> = conn
                .query_row(
                    "INSERT INTO sync_locks (resource, owner, fencing_token, expires_at)
                     VALUES (?1, ?2, 1, ?3)
                     ON CONFLICT (resource) DO UPDATE SET
                         fencing_token = CASE
                             WHEN sync_locks.owner = excluded.owner THEN sync_locks.fencing_token
                             ELSE sync_locks.fencing_token + 1
                         END,
                         owner = excluded.owner,
                         expires_at = excluded.expires_at
                     WHERE sync_locks.owner = excluded.owner OR sync_locks.expires_at <= ?4
                     RETURNING fencing_token, expires_at",
                    params![resource, owner, expires_at.timestamp_millis(), now.timestamp_millis()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            Ok(row.map(|(fencing_token, expires_ms)| LockToken {
                resource,
                owner,
                fencing_token: u64::try_from(fencing_token).unwrap_or_default(),
                expires_at: DateTime::from_timestamp_millis(expires_ms).unwrap_or(expires_at),
            }))
        })
        .await
    }

    async fn release(&self, token: &LockToken) -> Result<bool, LockStoreError> {
        let token = token.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE sync_locks SET owner = '', expires_at = 0
                 WHERE resource = ?1 AND owner = ?2 AND fencing_token = ?3",
                params![token.resource, token.owner, i64::try_from(token.fencing_token).unwrap_or(i64::MAX)],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn store() -> (TempDir, SqliteLockStore) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(DbManager::open_path(dir.path().join("lock.db"), 2).unwrap());
        db.run_migrations().unwrap();
        (dir, SqliteLockStore::new(db))
    }

    const TTL: Duration = Duration::from_secs(30);

    /// Validates exclusion and fencing across owners.
    ///
    /// Assertions:
    /// - Confirms a second owner is refused while the lease is live.
    /// - Confirms re-acquiring by the holder keeps the fencing token.
    /// - Confirms a hand-over after release bumps the fencing token.
    #[tokio::test(flavor = "multi_thread")]
    async fn lease_excludes_and_fences() {
        let (_dir, store) = store();

        let first = store.try_acquire("drain", "a", TTL).await.unwrap().unwrap();
        assert_eq!(first.fencing_token, 1);
        assert!(store.try_acquire("drain", "b", TTL).await.unwrap().is_none());

        let renewed = store.try_acquire("drain", "a", TTL).await.unwrap().unwrap();
        assert_eq!(renewed.fencing_token, 1);
        assert!(renewed.expires_at >= first.expires_at);

        assert!(store.release(&renewed).await.unwrap());
        assert!(!store.release(&renewed).await.unwrap());

        let second = store.try_acquire("drain", "b", TTL).await.unwrap().unwrap();
        assert_eq!(second.fencing_token, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expired_lease_can_be_taken_over() {
        let (_dir, store) = store();

        store.try_acquire("drain", "a", Duration::from_millis(1)).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let taken = store.try_acquire("drain", "b", TTL).await.unwrap().unwrap();
        assert_eq!(taken.owner, "b");
        assert_eq!(taken.fencing_token, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resources_are_independent() {
        let (_dir, store) = store();
        assert!(store.try_acquire("drain", "a", TTL).await.unwrap().is_some());
        assert!(store.try_acquire("reindex", "b", TTL).await.unwrap().is_some());
    }
}
