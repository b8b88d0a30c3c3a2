//! Lock store on a shared PostgreSQL database
//!
//! Used when POS instances do not share a SQLite file. Lease expiry is
//! judged against the database server's clock, so instance clock skew does
//! not matter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fiscalsync_core::{LockStore, LockStoreError, LockToken};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::errors::postgres_to_lock_error;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS fiscal_sync_locks (
    resource TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    fencing_token BIGINT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
)";

const ACQUIRE_SQL: &str = "INSERT INTO fiscal_sync_locks (resource, owner, fencing_token, expires_at)
    VALUES ($1, $2, 1, now() + ($3::double precision * interval '1 second'))
    ON CONFLICT (resource) DO UPDATE SET
        fencing_token = CASE
            WHEN fiscal_sync_locks.owner = EXCLUDED.owner THEN fiscal_sync_locks.fencing_token
            ELSE fiscal_sync_locks.fencing_token + 1
        END,
        owner = EXCLUDED.owner,
        expires_at = EXCLUDED.expires_at
    WHERE fiscal_sync_locks.owner = EXCLUDED.owner OR fiscal_sync_locks.expires_at <= now()
    RETURNING fencing_token, expires_at";

const RELEASE_SQL: &str = "UPDATE fiscal_sync_locks
    SET owner = '', expires_at = 'epoch'
    WHERE resource = $1 AND owner = $2 AND fencing_token = $3";

/// Connects lazily and reconnects after the connection drops
pub struct PostgresLockStore {
    url: String,
    client: Mutex<Option<Client>>,
}

impl std::fmt::Debug for PostgresLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL may carry credentials
        f.debug_struct("PostgresLockStore").finish_non_exhaustive()
    }
}

impl PostgresLockStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: Mutex::new(None) }
    }

    async fn connect(&self) -> Result<Client, LockStoreError> {
        let (client, connection) =
            tokio_postgres::connect(&self.url, NoTls).await.map_err(|e| postgres_to_lock_error(&e))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(error = %err, "lock.postgres_connection_closed");
            }
        });

        client.batch_execute(CREATE_TABLE_SQL).await.map_err(|e| postgres_to_lock_error(&e))?;
        debug!("lock.postgres_connected");
        Ok(client)
    }
}

#[async_trait]
impl LockStore for PostgresLockStore {
    async fn try_acquire(
        &self,
        resource: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, LockStoreError> {
        let mut slot = self.client.lock().await;
        if slot.as_ref().map_or(true, Client::is_closed) {
            *slot = Some(self.connect().await?);
        }
        let Some(client) = slot.as_ref() else {
            return Err(LockStoreError::Unreachable("no postgres client".to_string()));
        };

        let ttl_secs = ttl.as_secs_f64();
        let row = match client.query_opt(ACQUIRE_SQL, &[&resource, &owner, &ttl_secs]).await {
            Ok(row) => row,
            Err(err) => {
                if client.is_closed() {
                    *slot = None;
                }
                return Err(postgres_to_lock_error(&err));
            }
        };

        row.map(|row| {
            let fencing_token: i64 = row.try_get(0).map_err(|e| postgres_to_lock_error(&e))?;
            let expires_at: DateTime<Utc> =
                row.try_get(1).map_err(|e| postgres_to_lock_error(&e))?;
            Ok(LockToken {
                resource: resource.to_string(),
                owner: owner.to_string(),
                fencing_token: u64::try_from(fencing_token).unwrap_or_default(),
                expires_at,
            })
        })
        .transpose()
    }

    async fn release(&self, token: &LockToken) -> Result<bool, LockStoreError> {
        let mut slot = self.client.lock().await;
        if slot.as_ref().map_or(true, Client::is_closed) {
            *slot = Some(self.connect().await?);
        }
        let Some(client) = slot.as_ref() else {
            return Err(LockStoreError::Unreachable("no postgres client".to_string()));
        };

        let fence = i64::try_from(token.fencing_token).unwrap_or(i64::MAX);
        let changed = client
            .execute(RELEASE_SQL, &[&token.resource, &token.owner, &fence])
            .await
            .map_err(|e| postgres_to_lock_error(&e))?;
        Ok(changed > 0)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
