//! SQLite connection pool
//!
//! r2d2-based pooling where every connection is initialised with the
//! durability pragmas from [`apply_connection_pragmas`].

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::config::SqlitePoolConfig;
use super::connection::SqliteConnection;
use super::pragmas::apply_connection_pragmas;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::metrics::StorageMetrics;
use crate::storage::types::{HealthStatus, PoolMetrics};

/// SQLite connection pool
#[derive(Debug)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: SqlitePoolConfig,
    metrics: Arc<StorageMetrics>,
}

impl SqlitePool {
    /// Open (or create) the database at `path` and build the pool
    ///
    /// A test connection is checked out before returning so that an
    /// unreadable file fails here rather than on first use.
    #[instrument(skip(config), fields(db_path = ?path, pool_size = config.max_size))]
    pub fn new(path: &Path, config: SqlitePoolConfig) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let metrics = Arc::new(StorageMetrics::new(config.max_size));
        let pool_config = config.clone();

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            apply_connection_pragmas(conn, &pool_config)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!(error = %e, "storage.pool_create_failed");
                StorageError::Connection(format!("Failed to create pool: {e}"))
            })?;

        {
            let conn = pool.get()?;
            let mode: String = conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?;
            debug!(journal_mode = %mode, synchronous = %config.synchronous, "storage.pool_verified");
        }

        info!(max_connections = config.max_size, "storage.pool_created");

        Ok(Self { pool, config, metrics })
    }

    /// Check out a connection
    pub fn get_connection(&self) -> StorageResult<SqliteConnection> {
        let start = Instant::now();

        match self.pool.get() {
            Ok(conn) => {
                let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                self.metrics.record_connection_acquired(duration_ms);
                Ok(SqliteConnection::new(conn))
            }
            Err(e) => {
                if e.to_string().to_lowercase().contains("timed out") {
                    self.metrics.record_connection_timeout();
                    warn!(timeout = ?self.config.connection_timeout, "storage.connection_timeout");
                    Err(StorageError::Timeout(self.config.connection_timeout.as_secs()))
                } else {
                    self.metrics.record_connection_error();
                    warn!(error = %e, "storage.connection_error");
                    Err(StorageError::Connection(format!("Failed to get connection: {e}")))
                }
            }
        }
    }

    /// Shared metrics tracker
    pub fn metrics(&self) -> &Arc<StorageMetrics> {
        &self.metrics
    }

    /// Snapshot of pool counters
    pub fn pool_metrics(&self) -> PoolMetrics {
        self.metrics.snapshot()
    }

    /// Check that a connection can be obtained and queried
    pub fn health_check(&self) -> HealthStatus {
        let state = self.pool.state();
        let probe = self.get_connection().and_then(|conn| {
            conn.query_row("SELECT 1", &[], |row| row.get::<_, i32>(0))
        });

        match probe {
            Ok(_) => HealthStatus::healthy(
                state.connections as usize,
                state.idle_connections as usize,
                self.config.max_size as usize,
            ),
            Err(e) => HealthStatus::unhealthy(format!("Pool unhealthy: {e}")),
        }
    }
}
