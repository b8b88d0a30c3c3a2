//! One drain cycle: lock, fetch, send, record
//!
//! Each pending receipt moves `pending -> syncing` before the operator call
//! and ends the cycle in exactly one of: `synced`, back to `pending` with a
//! bumped retry count, `failed` with a dead-letter snapshot, or back to
//! `pending` untouched when the circuit refused the call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fiscalsync_common::{CallOutcome, CircuitBreaker, Clock, ErrorClassification, SystemClock};
use fiscalsync_core::{DistributedLock, FiscalOperatorClient, LockAcquisition, LockGuard, ReceiptBuffer};
use fiscalsync_domain::constants::REASON_MAX_RETRIES_EXCEEDED;
use fiscalsync_domain::{Receipt, RemoteError, Result, SyncConfig};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::metrics::{log_metric, SyncMetrics};

const MAX_ERROR_LEN: usize = 512;

/// Tunables for a drain cycle
#[derive(Debug, Clone)]
pub struct DrainSettings {
    pub batch_size: usize,
    pub max_retries: u32,
    pub call_timeout: Duration,
}

impl From<&SyncConfig> for DrainSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            batch_size: usize::try_from(config.batch_size).unwrap_or(usize::MAX),
            max_retries: config.max_retries,
            call_timeout: config.call_timeout(),
        }
    }
}

/// How the cycle stood with the drain lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DrainLock {
    Acquired { fencing_token: u64 },
    /// Another instance holds the lease; nothing was done
    Held,
    /// Store unreachable and policy allowed running without it
    Uncoordinated,
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub lock: DrainLock,
    pub fetched: usize,
    pub synced: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub circuit_skipped: usize,
    pub remote_failures: usize,
}

impl DrainReport {
    fn new(lock: DrainLock) -> Self {
        Self {
            lock,
            fetched: 0,
            synced: 0,
            retried: 0,
            dead_lettered: 0,
            circuit_skipped: 0,
            remote_failures: 0,
        }
    }

    /// Whether any operator call failed during the cycle
    pub fn had_remote_failures(&self) -> bool {
        self.remote_failures > 0
    }
}

/// Drives Phase 2 for one batch
pub struct DrainCycle<C: Clock = SystemClock> {
    buffer: Arc<dyn ReceiptBuffer>,
    operator: Arc<dyn FiscalOperatorClient>,
    breaker: CircuitBreaker<C>,
    lock: DistributedLock,
    settings: DrainSettings,
    metrics: Arc<SyncMetrics>,
}

impl<C: Clock> std::fmt::Debug for DrainCycle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainCycle")
            .field("breaker", &self.breaker)
            .field("lock", &self.lock)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> DrainCycle<C> {
    /// Assemble a cycle from its collaborators
    ///
    /// `metrics` is shared with whoever reports health, so pass the same
    /// handle to both.
    pub fn new(
        buffer: Arc<dyn ReceiptBuffer>,
        operator: Arc<dyn FiscalOperatorClient>,
        breaker: CircuitBreaker<C>,
        lock: DistributedLock,
        settings: DrainSettings,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self { buffer, operator, breaker, lock, settings, metrics }
    }

    pub fn buffer(&self) -> &Arc<dyn ReceiptBuffer> {
        &self.buffer
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Run one cycle
    ///
    /// `cancel` is checked between receipts, never inside a transition.
    /// Errors are storage failures (the cycle stops at the failing receipt)
    /// or `LockUnavailable` under the `block_sync` policy.
    #[instrument(skip_all)]
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<DrainReport> {
        log_metric(self.metrics.record_cycle(), "sync.cycle");

        let (mut guard, lock) = match self.lock.acquire().await? {
            LockAcquisition::Acquired(guard) => {
                let fencing_token = guard.fencing_token();
                (Some(guard), DrainLock::Acquired { fencing_token })
            }
            LockAcquisition::Held => {
                debug!(resource = %self.lock.resource(), "sync.tick_skipped_lock_held");
                log_metric(self.metrics.record_lock_contended(), "sync.lock_contended");
                return Ok(DrainReport::new(DrainLock::Held));
            }
            LockAcquisition::Uncoordinated => (None, DrainLock::Uncoordinated),
        };

        let mut report = DrainReport::new(lock);
        let result = self.drain_batch(guard.as_mut(), &mut report, cancel).await;

        if let Some(guard) = guard {
            guard.release().await;
        }

        match result {
            Ok(()) => {
                if report.fetched > 0 {
                    info!(
                        fetched = report.fetched,
                        synced = report.synced,
                        retried = report.retried,
                        dead_lettered = report.dead_lettered,
                        circuit_skipped = report.circuit_skipped,
                        "sync.cycle_completed"
                    );
                }
                Ok(report)
            }
            Err(err) => {
                if err.is_critical() {
                    error!(alert = true, error = %err, ?report, "sync.storage_failure");
                    log_metric(self.metrics.record_storage_error(), "sync.storage_error");
                }
                Err(err)
            }
        }
    }

    async fn drain_batch(
        &self,
        mut guard: Option<&mut LockGuard>,
        report: &mut DrainReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // The lease is ours, so anything still `syncing` was left by an
        // interrupted cycle
        if guard.is_some() {
            self.buffer.recover_in_flight().await?;
        }

        let batch = self.buffer.get_pending(self.settings.batch_size).await?;
        report.fetched = batch.len();

        for (index, receipt) in batch.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(remaining = batch.len() - index, "sync.cycle_cancelled");
                break;
            }
            if let Some(guard) = guard.as_deref_mut() {
                if !guard.ensure_held().await {
                    warn!(remaining = batch.len() - index, "sync.cycle_aborted_lock_lost");
                    break;
                }
            }

            // Retries used up by an earlier cycle that stopped before
            // dead-lettering; no further send
            if receipt.retry_count >= self.settings.max_retries {
                let last_error = receipt.last_error.as_deref().unwrap_or_default();
                self.dead_letter(receipt, receipt.retry_count, last_error, report).await?;
                continue;
            }

            if !self.buffer.mark_syncing(receipt.id).await? {
                debug!(receipt_id = %receipt.id, "sync.receipt_no_longer_pending");
                continue;
            }

            let circuit_open = self.sync_receipt(receipt, report).await?;
            if circuit_open {
                // The breaker refuses every call until its recovery timeout
                let skipped = batch.len() - index;
                report.circuit_skipped += skipped;
                for _ in 0..skipped {
                    log_metric(self.metrics.record_circuit_skip(), "sync.circuit_skip");
                }
                info!(skipped, breaker = %self.breaker.name(), "sync.circuit_open_skipping");
                break;
            }
        }
        Ok(())
    }

    /// Send one `syncing` receipt; returns `true` when the circuit refused it
    async fn sync_receipt(&self, receipt: &Receipt, report: &mut DrainReport) -> Result<bool> {
        let started = Instant::now();
        let outcome = self.breaker.call(|| self.send(receipt)).await;

        match outcome {
            CallOutcome::Success(server_time) => {
                log_metric(self.metrics.record_send_latency(started.elapsed()), "sync.send_latency");
                if self.buffer.mark_synced(receipt.id, server_time).await? {
                    report.synced += 1;
                    log_metric(self.metrics.record_synced(), "sync.synced");
                } else {
                    warn!(receipt_id = %receipt.id, "sync.mark_synced_ignored");
                }
                Ok(false)
            }
            CallOutcome::CircuitOpen => {
                self.buffer.return_to_pending(receipt.id).await?;
                Ok(true)
            }
            CallOutcome::Failure(err) => {
                report.remote_failures += 1;
                self.record_failure(receipt, &err, report).await?;
                Ok(false)
            }
        }
    }

    async fn send(&self, receipt: &Receipt) -> std::result::Result<i64, RemoteError> {
        let timeout = self.settings.call_timeout;
        let ack = tokio::time::timeout(timeout, self.operator.send(&receipt.fiscal_doc))
            .await
            .map_err(|_| RemoteError::timeout(timeout))??;

        if ack.accepted {
            Ok(ack.server_time)
        } else {
            Err(RemoteError::rejected("operator did not accept the document"))
        }
    }

    async fn record_failure(
        &self,
        receipt: &Receipt,
        err: &RemoteError,
        report: &mut DrainReport,
    ) -> Result<()> {
        let message = truncate_error(&err.to_string());
        let Some(attempts) = self.buffer.increment_retry(receipt.id, &message).await? else {
            warn!(receipt_id = %receipt.id, "sync.retry_target_missing");
            return Ok(());
        };

        report.retried += 1;
        log_metric(self.metrics.record_retry(), "sync.retry");
        debug!(receipt_id = %receipt.id, attempts, error = %err, "sync.remote_call_failed");

        if attempts >= self.settings.max_retries {
            self.dead_letter(receipt, attempts, &message, report).await?;
        }
        Ok(())
    }

    async fn dead_letter(
        &self,
        receipt: &Receipt,
        attempts: u32,
        last_error: &str,
        report: &mut DrainReport,
    ) -> Result<()> {
        if self.buffer.move_to_dead_letter(receipt.id, REASON_MAX_RETRIES_EXCEEDED).await? {
            report.dead_lettered += 1;
            log_metric(self.metrics.record_dead_letter(), "sync.dead_letter");
            warn!(
                receipt_id = %receipt.id,
                attempts,
                last_error = %last_error,
                "sync.receipt_dead_lettered"
            );
        }
        Ok(())
    }
}

fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_LEN {
        return message.to_string();
    }

    let mut truncated = message.chars().take(MAX_ERROR_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_errors_are_truncated() {
        let long = "x".repeat(2_000);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_LEN);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_error("timeout"), "timeout");
    }

    #[test]
    fn settings_follow_sync_config() {
        let config = SyncConfig::default();
        let settings = DrainSettings::from(&config);
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.max_retries, 20);
        assert_eq!(settings.call_timeout, Duration::from_secs(10));
    }

    #[test]
    fn report_serializes_lock_kind() {
        let report = DrainReport::new(DrainLock::Acquired { fencing_token: 3 });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["lock"]["kind"], "acquired");
        assert_eq!(json["lock"]["fencing_token"], 3);
        assert!(!report.had_remote_failures());
    }
}
