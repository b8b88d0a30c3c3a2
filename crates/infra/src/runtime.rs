//! Composition root
//!
//! Builds every component from a [`Config`] and owns their lifetimes: one
//! clock, one breaker shared by the service and the worker, one buffer, one
//! drain lock.

use std::sync::Arc;

use fiscalsync_common::{CircuitBreaker, CircuitBreakerConfig};
use fiscalsync_core::{
    DistributedLock, FiscalOperatorClient, FiscalizationService, HealthReport,
    HybridLogicalClock, PrintDevice, ReceiptBuffer,
};
use fiscalsync_domain::constants::OPERATOR_BREAKER_NAME;
use fiscalsync_domain::{
    BreakerConfig, Config, CreatedReceipt, DeadLetterEntry, FiscalDocument, FiscalError, Result,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::database::{DbManager, SqliteReceiptBuffer};
use crate::lock::build_lock_store;
use crate::observability::SyncMetrics;
use crate::sync::{DrainCycle, DrainReport, DrainSettings, SyncWorker, SyncWorkerConfig, WorkerHealth};

/// Everything the operational surface reports
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeHealth {
    pub instance_id: String,
    #[serde(flatten)]
    pub core: HealthReport,
    pub worker: WorkerHealth,
    pub lock_backend: &'static str,
    pub database_ok: bool,
}

/// Assembled fiscalization core for one adapter instance
pub struct FiscalRuntime {
    config: Config,
    db: Arc<DbManager>,
    buffer: Arc<SqliteReceiptBuffer>,
    service: FiscalizationService,
    worker: SyncWorker,
    lock_backend: &'static str,
}

impl std::fmt::Debug for FiscalRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiscalRuntime")
            .field("instance_id", &self.config.instance_id)
            .field("db_path", &self.db.path())
            .field("lock_backend", &self.lock_backend)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

impl FiscalRuntime {
    /// Open storage, run migrations and wire the components
    ///
    /// Does not start the background loop; call [`FiscalRuntime::start_sync`].
    #[instrument(skip_all, fields(instance_id = %config.instance_id))]
    pub fn bootstrap(
        config: Config,
        operator: Arc<dyn FiscalOperatorClient>,
        printer: Arc<dyn PrintDevice>,
    ) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(DbManager::new(&config.database)?);
        db.run_migrations()?;

        let clock = Arc::new(HybridLogicalClock::new());
        let buffer =
            Arc::new(SqliteReceiptBuffer::new(Arc::clone(&db), clock, config.buffer.capacity));
        let breaker = build_breaker(&config.circuit_breaker)?;

        let store = build_lock_store(&config.lock, &db)?;
        let lock_backend = store.backend();
        let lock = DistributedLock::new(
            store,
            config.lock.resource.clone(),
            config.instance_id.clone(),
            config.lock.ttl(),
            config.lock.on_unavailable,
        );

        let dyn_buffer: Arc<dyn ReceiptBuffer> = buffer.clone();
        let service =
            FiscalizationService::new(Arc::clone(&dyn_buffer), printer, breaker.clone());
        let cycle = DrainCycle::new(
            dyn_buffer,
            operator,
            breaker,
            lock,
            DrainSettings::from(&config.sync),
            Arc::new(SyncMetrics::new()),
        );
        let worker = SyncWorker::new(cycle, SyncWorkerConfig::from(&config.sync));

        info!(
            db_path = %config.database.path.display(),
            capacity = config.buffer.capacity,
            lock_backend,
            lock_policy = %config.lock.on_unavailable,
            "runtime.bootstrapped"
        );

        Ok(Self { config, db, buffer, service, worker, lock_backend })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Phase 1: persist and print
    pub async fn create_receipt(
        &self,
        pos_id: &str,
        fiscal_doc: FiscalDocument,
    ) -> Result<CreatedReceipt> {
        self.service.create_receipt(pos_id, fiscal_doc).await
    }

    /// Run one drain now, waiting for any drain already in progress
    pub async fn drain_now(&self) -> Result<DrainReport> {
        self.worker.drain_now().await
    }

    pub async fn health(&self) -> Result<RuntimeHealth> {
        let core = self.service.health().await?;
        let db = Arc::clone(&self.db);
        let database_ok = tokio::task::spawn_blocking(move || db.pool_health().healthy)
            .await
            .unwrap_or(false);

        Ok(RuntimeHealth {
            instance_id: self.config.instance_id.clone(),
            core,
            worker: self.worker.health(),
            lock_backend: self.lock_backend,
            database_ok,
        })
    }

    /// Most recent dead letters, for forensics
    pub async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        self.buffer.dead_letters(limit).await
    }

    /// Administrative breaker reset
    pub fn reset_circuit_breaker(&self) {
        self.service.reset_circuit_breaker();
    }

    /// Start the background loop unless `sync.enabled` is off
    pub async fn start_sync(&self) -> Result<()> {
        if !self.config.sync.enabled {
            warn!("runtime.sync_disabled");
            return Ok(());
        }
        self.worker.start().await
    }

    /// Stop the background loop if it runs
    pub async fn shutdown(&self) -> Result<()> {
        if self.worker.is_running() {
            self.worker.stop().await?;
        }
        info!("runtime.shutdown");
        Ok(())
    }
}

fn build_breaker(config: &BreakerConfig) -> Result<CircuitBreaker> {
    let breaker_config = CircuitBreakerConfig::builder()
        .failure_threshold(config.failure_threshold)
        .success_threshold(config.half_open_success_threshold)
        .recovery_timeout(config.recovery_timeout())
        .build()
        .map_err(|e| FiscalError::Config(format!("circuit_breaker: {e}")))?;

    CircuitBreaker::new(OPERATOR_BREAKER_NAME, breaker_config)
        .map_err(|e| FiscalError::Config(format!("circuit_breaker: {e}")))
}

