#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fiscalsync_common::{CircuitBreaker, CircuitBreakerConfig, MockClock};
use fiscalsync_core::{
    DistributedLock, FiscalOperatorClient, HybridLogicalClock, LockStore, PrintDevice,
};
use fiscalsync_domain::{
    FiscalDocument, LockUnavailablePolicy, OperatorAck, PrintConfirmation, RemoteError, Result,
};
use fiscalsync_infra::database::{DbManager, SqliteReceiptBuffer};
use fiscalsync_infra::observability::SyncMetrics;
use fiscalsync_infra::sync::{DrainCycle, DrainSettings};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

/// Temporary database with migrations applied; the file lives as long as
/// the value.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    temp_dir: Arc<TempDir>,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = Arc::new(TempDir::new().expect("temp dir should be created"));
        let manager = open_manager(&temp_dir.path().join("fiscal.db"));
        Self { manager, temp_dir }
    }

    /// Second handle on the same file, as another process would open it
    pub fn reopen(&self) -> Self {
        Self { manager: open_manager(&self.path()), temp_dir: Arc::clone(&self.temp_dir) }
    }

    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().join("fiscal.db")
    }

    pub fn buffer(&self, capacity: u32) -> Arc<SqliteReceiptBuffer> {
        Arc::new(SqliteReceiptBuffer::new(
            Arc::clone(&self.manager),
            Arc::new(HybridLogicalClock::new()),
            capacity,
        ))
    }
}

fn open_manager(path: &Path) -> Arc<DbManager> {
    let manager = DbManager::open_path(path, 4).expect("db manager should open");
    manager.run_migrations().expect("migrations should apply");
    Arc::new(manager)
}

pub fn doc(seq: u32) -> FiscalDocument {
    FiscalDocument::new(json!({ "seq": seq, "total": "10.00" }))
}

fn seq_of(fiscal_doc: &FiscalDocument) -> u64 {
    fiscal_doc.as_value()["seq"].as_u64().unwrap_or_default()
}

/// How the fake operator answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorMode {
    Accept,
    Fail,
    Reject,
    /// Accept after sleeping
    Slow(Duration),
    /// Panic on the next call, then accept
    PanicOnce,
}

/// Fiscal operator fake that records every call
pub struct ScriptedOperator {
    mode: Mutex<OperatorMode>,
    next_server_time: AtomicI64,
    calls: AtomicUsize,
    per_doc: Mutex<HashMap<u64, usize>>,
}

impl ScriptedOperator {
    pub fn new(mode: OperatorMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            next_server_time: AtomicI64::new(1_700_000_000),
            calls: AtomicUsize::new(0),
            per_doc: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_mode(&self, mode: OperatorMode) {
        *self.mode.lock() = mode;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls received per document `seq`
    pub fn calls_per_doc(&self) -> HashMap<u64, usize> {
        self.per_doc.lock().clone()
    }
}

#[async_trait]
impl FiscalOperatorClient for ScriptedOperator {
    async fn send(&self, fiscal_doc: &FiscalDocument) -> std::result::Result<OperatorAck, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.per_doc.lock().entry(seq_of(fiscal_doc)).or_default() += 1;

        let mode = *self.mode.lock();
        match mode {
            OperatorMode::Accept => {}
            OperatorMode::Fail => return Err(RemoteError::transport("connection reset")),
            OperatorMode::Reject => {
                return Ok(OperatorAck { server_time: 0, accepted: false });
            }
            OperatorMode::Slow(delay) => tokio::time::sleep(delay).await,
            OperatorMode::PanicOnce => {
                self.set_mode(OperatorMode::Accept);
                panic!("operator driver crashed");
            }
        }
        Ok(OperatorAck::accepted(self.next_server_time.fetch_add(1, Ordering::SeqCst)))
    }
}

pub struct NoopPrinter;

#[async_trait]
impl PrintDevice for NoopPrinter {
    async fn print(&self, _fiscal_doc: &FiscalDocument) -> Result<PrintConfirmation> {
        Ok(PrintConfirmation { printed_at: chrono::Utc::now(), reference: None })
    }
}

/// Breaker with the default thresholds (5 failures, 60s, 2 probes)
pub fn breaker(clock: &MockClock) -> CircuitBreaker<MockClock> {
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(5)
        .success_threshold(2)
        .recovery_timeout(Duration::from_secs(60))
        .build()
        .expect("breaker config is valid");
    CircuitBreaker::with_clock("fiscal-operator", config, clock.clone())
        .expect("breaker should build")
}

pub fn drain_lock(store: Arc<dyn LockStore>, owner: &str, policy: LockUnavailablePolicy) -> DistributedLock {
    DistributedLock::new(store, "fiscal-drain", owner, Duration::from_secs(30), policy)
        .with_acquire_timeout(Duration::from_secs(2))
}

pub fn settings(max_retries: u32) -> DrainSettings {
    DrainSettings { batch_size: 50, max_retries, call_timeout: Duration::from_millis(500) }
}

pub fn cycle(
    buffer: Arc<SqliteReceiptBuffer>,
    operator: Arc<ScriptedOperator>,
    breaker: CircuitBreaker<MockClock>,
    lock: DistributedLock,
    max_retries: u32,
) -> DrainCycle<MockClock> {
    DrainCycle::new(
        buffer,
        operator,
        breaker,
        lock,
        settings(max_retries),
        Arc::new(SyncMetrics::new()),
    )
}
