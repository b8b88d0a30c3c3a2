//! Lock store adapters for the drain lock

pub mod memory;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use fiscalsync_core::LockStore;
use fiscalsync_domain::{FiscalError, LockBackend, LockConfig, Result};

use crate::database::DbManager;

pub use memory::InProcessLockStore;
pub use postgres::PostgresLockStore;
pub use sqlite::SqliteLockStore;

/// Build the store selected by `config.backend`
pub fn build_lock_store(config: &LockConfig, db: &Arc<DbManager>) -> Result<Arc<dyn LockStore>> {
    let store: Arc<dyn LockStore> = match config.backend {
        LockBackend::Sqlite => Arc::new(SqliteLockStore::new(Arc::clone(db))),
        LockBackend::Postgres => {
            let url = config.postgres_url.as_deref().filter(|url| !url.is_empty()).ok_or_else(
                || FiscalError::Config("lock.postgres_url is required for the postgres backend".into()),
            )?;
            Arc::new(PostgresLockStore::new(url))
        }
        LockBackend::InProcess => Arc::new(InProcessLockStore::new()),
    };
    Ok(store)
}
