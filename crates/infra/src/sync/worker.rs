//! Background drain loop with explicit lifecycle management
//!
//! The loop runs a [`DrainCycle`] immediately on start and then once per
//! interval, stretched by capped exponential backoff after ticks with
//! remote or storage failures. `stop()` cancels cooperatively: the receipt
//! in flight finishes its transition before the task exits. Manual drains
//! share the same gate, so they never overlap a periodic one.
//!
//! # Example
//!
//! ```no_run
//! # use fiscalsync_infra::sync::{DrainCycle, SyncWorker, SyncWorkerConfig};
//! # async fn example(cycle: DrainCycle) -> fiscalsync_domain::Result<()> {
//! let worker = SyncWorker::new(cycle, SyncWorkerConfig::default());
//! worker.start().await?;
//! // ... application runs ...
//! worker.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fiscalsync_common::{BackoffStrategy, Clock, ErrorClassification, SystemClock, TickBackoff};
use fiscalsync_domain::{FiscalError, Result, SyncConfig};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::drain::{DrainCycle, DrainReport};
use crate::observability::SyncMetricsSnapshot;

/// Loop timing
#[derive(Debug, Clone)]
pub struct SyncWorkerConfig {
    /// Base wait between ticks
    pub interval: Duration,
    /// First extra wait after a failing tick
    pub backoff_initial: Duration,
    /// Cap on the extra wait
    pub backoff_max: Duration,
    /// How long `stop()` waits for the task
    pub stop_timeout: Duration,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncWorkerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            interval: config.interval(),
            backoff_initial: config.backoff_initial(),
            backoff_max: config.backoff_max(),
            stop_timeout: config.stop_timeout(),
        }
    }
}

/// Worker view for the operational surface
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealth {
    pub running: bool,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_report: Option<DrainReport>,
    pub last_error: Option<String>,
    /// Set by a critical failure (storage, or a cycle that panicked),
    /// cleared by the next clean cycle
    pub storage_alert: bool,
    pub consecutive_failed_ticks: u32,
    pub metrics: SyncMetricsSnapshot,
}

#[derive(Debug, Default)]
struct TickState {
    last_tick_at: Option<DateTime<Utc>>,
    last_report: Option<DrainReport>,
    last_error: Option<String>,
    storage_alert: bool,
    consecutive_failed_ticks: u32,
}

/// Serializes drains and records their outcome
struct Shared<C: Clock> {
    cycle: DrainCycle<C>,
    drain_gate: tokio::sync::Mutex<()>,
    state: Mutex<TickState>,
}

impl<C: Clock> Shared<C> {
    /// Run one gated cycle on its own task and record the outcome
    ///
    /// A panic inside the cycle comes back as `FiscalError::Internal`, so a
    /// misbehaving collaborator costs one tick and never the loop. The gate
    /// is a tokio mutex and does not poison.
    async fn drain(self: &Arc<Self>, cancel: &CancellationToken) -> Result<DrainReport> {
        let shared = Arc::clone(self);
        let cancel = cancel.clone();
        let tick = tokio::spawn(async move {
            let _gate = shared.drain_gate.lock().await;
            shared.cycle.run_once(&cancel).await
        });

        let result = match tick.await {
            Ok(result) => result,
            Err(err) => {
                error!(alert = true, panicked = err.is_panic(), error = %err, "sync.tick_aborted");
                Err(FiscalError::Internal(format!("drain cycle aborted: {err}")))
            }
        };
        self.record(&result);
        result
    }

    fn record(&self, result: &Result<DrainReport>) {
        let mut state = self.state.lock();
        state.last_tick_at = Some(Utc::now());
        match result {
            Ok(report) => {
                state.last_report = Some(report.clone());
                state.last_error = None;
                state.storage_alert = false;
                if report.had_remote_failures() {
                    state.consecutive_failed_ticks = state.consecutive_failed_ticks.saturating_add(1);
                } else {
                    state.consecutive_failed_ticks = 0;
                }
            }
            Err(err) => {
                state.last_error = Some(err.to_string());
                state.storage_alert |= err.is_critical();
                state.consecutive_failed_ticks = state.consecutive_failed_ticks.saturating_add(1);
            }
        }
    }
}

struct RunningTask {
    cancellation: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic drain task
///
/// Lifecycle methods take `&self` so the worker can sit behind an `Arc`
/// next to the health and manual-drain surface.
pub struct SyncWorker<C: Clock = SystemClock> {
    shared: Arc<Shared<C>>,
    config: SyncWorkerConfig,
    task: Mutex<Option<RunningTask>>,
}

impl<C: Clock> std::fmt::Debug for SyncWorker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl<C: Clock> SyncWorker<C> {
    pub fn new(cycle: DrainCycle<C>, config: SyncWorkerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                cycle,
                drain_gate: tokio::sync::Mutex::new(()),
                state: Mutex::new(TickState::default()),
            }),
            config,
            task: Mutex::new(None),
        }
    }

    /// Recover interrupted receipts and spawn the loop
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Err(FiscalError::Internal("sync worker already running".into()));
        }

        let recovered = self.shared.cycle.buffer().recover_in_flight().await?;

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            return Err(FiscalError::Internal("sync worker already running".into()));
        }

        let cancellation = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let cancel = cancellation.clone();
        let handle = tokio::spawn(async move {
            Self::run_loop(shared, config, cancel).await;
        });
        *task = Some(RunningTask { cancellation, handle });

        info!(recovered, interval_secs = self.config.interval.as_secs(), "sync.worker_started");
        Ok(())
    }

    /// Signal cancellation and wait for the loop to finish
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let running = self.task.lock().take();
        let Some(RunningTask { cancellation, handle }) = running else {
            return Err(FiscalError::Internal("sync worker not running".into()));
        };

        info!("sync.worker_stopping");
        cancellation.cancel();

        match tokio::time::timeout(self.config.stop_timeout, handle).await {
            Ok(Ok(())) => {
                info!("sync.worker_stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "sync.worker_panicked");
                Err(FiscalError::Internal(format!("sync worker task failed: {e}")))
            }
            Err(_) => {
                warn!(timeout_secs = self.config.stop_timeout.as_secs(), "sync.worker_stop_timeout");
                Err(FiscalError::Internal("sync worker did not stop in time".into()))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|running| !running.handle.is_finished())
    }

    /// Operator-triggered drain, using the same gate and lock as the loop
    #[instrument(skip(self))]
    pub async fn drain_now(&self) -> Result<DrainReport> {
        info!("sync.manual_drain");
        self.shared.drain(&CancellationToken::new()).await
    }

    pub fn health(&self) -> WorkerHealth {
        let state = self.shared.state.lock();
        WorkerHealth {
            running: self.is_running(),
            last_tick_at: state.last_tick_at,
            last_report: state.last_report.clone(),
            last_error: state.last_error.clone(),
            storage_alert: state.storage_alert,
            consecutive_failed_ticks: state.consecutive_failed_ticks,
            metrics: self.shared.cycle.metrics().snapshot(),
        }
    }

    async fn run_loop(shared: Arc<Shared<C>>, config: SyncWorkerConfig, cancel: CancellationToken) {
        let mut backoff =
            TickBackoff::new(BackoffStrategy::exponential(config.backoff_initial, config.backoff_max));

        loop {
            // Runs to completion; cancellation is honoured between receipts
            let had_failures = match shared.drain(&cancel).await {
                Ok(report) => report.had_remote_failures(),
                Err(FiscalError::LockUnavailable(reason)) => {
                    debug!(reason = %reason, "sync.tick_blocked_lock_unavailable");
                    false
                }
                Err(err) => {
                    warn!(error = %err, "sync.tick_failed");
                    true
                }
            };

            let extra = backoff.record_tick(had_failures);
            if !extra.is_zero() {
                debug!(extra_ms = extra.as_millis(), "sync.backoff");
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("sync.loop_cancelled");
                    break;
                }
                () = tokio::time::sleep(config.interval + extra) => {}
            }
        }
    }
}

impl<C: Clock> Drop for SyncWorker<C> {
    fn drop(&mut self) {
        if let Some(running) = self.task.get_mut().take() {
            warn!("sync.worker_dropped_while_running");
            running.cancellation.cancel();
        }
    }
}
