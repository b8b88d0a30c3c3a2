//! Counters and latency samples for the sync worker
//!
//! ## Design
//! - **VecDeque ring buffer** of the last 1000 send latencies
//! - **Poison-safe locking** with an explicit match (no `.expect()`)
//! - **Relaxed ordering** for independent counters

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::observability::{MetricsError, MetricsResult};

const LATENCY_SAMPLES: usize = 1000;

/// Running totals for drain cycles
#[derive(Debug)]
pub struct SyncMetrics {
    cycles: AtomicU64,
    synced: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    circuit_skipped: AtomicU64,
    lock_contended: AtomicU64,
    storage_errors: AtomicU64,
    send_latencies_ms: Mutex<VecDeque<u64>>,
}

/// Point-in-time copy of [`SyncMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncMetricsSnapshot {
    pub cycles: u64,
    pub synced: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub circuit_skipped: u64,
    pub lock_contended: u64,
    pub storage_errors: u64,
    pub send_p95_ms: Option<u64>,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            synced: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            circuit_skipped: AtomicU64::new(0),
            lock_contended: AtomicU64::new(0),
            storage_errors: AtomicU64::new(0),
            send_latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_SAMPLES)),
        }
    }

    pub fn record_cycle(&self) -> MetricsResult<()> {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_synced(&self) -> MetricsResult<()> {
        self.synced.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_retry(&self) -> MetricsResult<()> {
        self.retried.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_dead_letter(&self) -> MetricsResult<()> {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_circuit_skip(&self) -> MetricsResult<()> {
        self.circuit_skipped.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_lock_contended(&self) -> MetricsResult<()> {
        self.lock_contended.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_storage_error(&self) -> MetricsResult<()> {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Store one operator round-trip time
    pub fn record_send_latency(&self, duration: Duration) -> MetricsResult<()> {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let mut samples = self.lock_samples();
        samples.push_back(ms);
        if samples.len() > LATENCY_SAMPLES {
            samples.pop_front();
        }
        Ok(())
    }

    /// 95th percentile of the stored send latencies
    pub fn send_p95_ms(&self) -> MetricsResult<u64> {
        let samples = self.lock_samples();
        if samples.is_empty() {
            return Err(MetricsError::EmptyData { metric: "P95" });
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        drop(samples);
        sorted.sort_unstable();
        let index = (sorted.len() * 95).div_ceil(100).saturating_sub(1);
        Ok(sorted[index.min(sorted.len() - 1)])
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            synced: self.synced.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            circuit_skipped: self.circuit_skipped.load(Ordering::Relaxed),
            lock_contended: self.lock_contended.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            send_p95_ms: self.send_p95_ms().ok(),
        }
    }

    fn lock_samples(&self) -> std::sync::MutexGuard<'_, VecDeque<u64>> {
        match self.send_latencies_ms.lock() {
            Ok(guard) => guard,
            Err(poison_err) => {
                tracing::warn!(
                    metric = "SyncMetrics::send_latencies_ms",
                    "Mutex poisoned, recovering data"
                );
                poison_err.into_inner()
            }
        }
    }
}

/// Log and drop a failed metric write
pub(crate) fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        tracing::warn!(metric, error = %err, "metrics.record_failed");
    }
}
