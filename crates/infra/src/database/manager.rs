//! Database connection manager backed by the shared SQLite pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fiscalsync_common::storage::{
    HealthStatus, SqliteConnection, SqlitePool, SqlitePoolConfig, StorageError,
};
use fiscalsync_domain::{DatabaseConfig, FiscalError, Result};
use rusqlite::params;
use tracing::info;

use crate::errors::{map_storage_error, InfraError};

pub(crate) const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Database manager that wraps a [`SqlitePool`].
#[derive(Debug)]
pub struct DbManager {
    pool: Arc<SqlitePool>,
    path: PathBuf,
}

impl DbManager {
    /// Open the database described by `config`.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        Self::open(&config.path, config.pool_size, config.busy_timeout_ms)
    }

    /// Open the database at `db_path` with default timeouts.
    pub fn open_path<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self> {
        let defaults = DatabaseConfig::default();
        Self::open(db_path.as_ref(), pool_size, defaults.busy_timeout_ms)
    }

    fn open(path: &Path, pool_size: u32, busy_timeout_ms: u64) -> Result<Self> {
        let config = SqlitePoolConfig::default()
            .with_max_size(pool_size)
            .with_busy_timeout(Duration::from_millis(busy_timeout_ms));

        let pool = SqlitePool::new(path, config).map(Arc::new).map_err(map_storage_error)?;

        info!(
            db_path = %path.display(),
            max_connections = pool.metrics().max_pool_size(),
            "database.pool_initialised"
        );

        Ok(Self { pool, path: path.to_path_buf() })
    }

    /// Borrow the underlying pool.
    pub fn pool(&self) -> &Arc<SqlitePool> {
        &self.pool
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<SqliteConnection> {
        self.pool.get_connection().map_err(map_storage_error)
    }

    /// Ensure the full schema exists on the current database.
    ///
    /// Refuses to run against a database written by a newer schema.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        create_schema(&conn)?;
        info!(schema_version = SCHEMA_VERSION, "database.migrations_applied");
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check out a connection, run `SELECT 1` and report pool occupancy.
    pub fn pool_health(&self) -> HealthStatus {
        self.pool.health_check()
    }
}

fn create_schema(conn: &SqliteConnection) -> Result<()> {
    let has_version_table: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            params![],
            |row| row.get(0),
        )
        .map_err(map_storage_error)?;

    if has_version_table > 0 {
        let found: Option<i32> = conn
            .query_row("SELECT MAX(version) FROM schema_version", params![], |row| row.get(0))
            .map_err(map_storage_error)?;
        if let Some(found) = found.filter(|found| *found > SCHEMA_VERSION) {
            return Err(map_storage_error(StorageError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found,
            }));
        }
    }

    conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
        params![SCHEMA_VERSION],
    )
    .map_err(map_storage_error)?;
    Ok(())
}

pub(crate) fn map_sql_error(err: rusqlite::Error) -> FiscalError {
    FiscalError::from(InfraError::from(err))
}
