//! Fiscalization service - Phase 1 business logic

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fiscalsync_common::{CircuitBreaker, CircuitBreakerStats, Clock, SystemClock};
use fiscalsync_domain::{
    BufferStatus, CreatedReceipt, FiscalDocument, FiscalError, Result,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::ports::PrintDevice;
use crate::buffer::ReceiptBuffer;

const DEFAULT_PRINT_TIMEOUT: Duration = Duration::from_secs(10);

/// Combined operational view: buffer counts and operator breaker state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub buffer: BufferStatus,
    pub circuit_breaker: CircuitBreakerStats,
    pub checked_at: DateTime<Utc>,
}

/// Phase 1 entry point
///
/// Never calls the fiscal operator: a receipt is durable as soon as
/// [`FiscalizationService::create_receipt`] returns its id.
pub struct FiscalizationService<C: Clock = SystemClock> {
    buffer: Arc<dyn ReceiptBuffer>,
    printer: Arc<dyn PrintDevice>,
    breaker: CircuitBreaker<C>,
    print_timeout: Duration,
}

impl<C: Clock> FiscalizationService<C> {
    /// Create a new fiscalization service
    ///
    /// `breaker` should be the same instance the sync worker uses so the
    /// health read reflects live state.
    pub fn new(
        buffer: Arc<dyn ReceiptBuffer>,
        printer: Arc<dyn PrintDevice>,
        breaker: CircuitBreaker<C>,
    ) -> Self {
        Self { buffer, printer, breaker, print_timeout: DEFAULT_PRINT_TIMEOUT }
    }

    pub fn with_print_timeout(mut self, timeout: Duration) -> Self {
        self.print_timeout = timeout;
        self
    }

    /// Persist a receipt as pending, then print it locally
    ///
    /// Capacity and storage failures are returned to the caller. A print
    /// failure is logged and reported as `print: None`; the receipt stays
    /// durable and will still be synced.
    #[instrument(skip(self, fiscal_doc), fields(pos_id = %pos_id))]
    pub async fn create_receipt(
        &self,
        pos_id: &str,
        fiscal_doc: FiscalDocument,
    ) -> Result<CreatedReceipt> {
        if pos_id.trim().is_empty() {
            return Err(FiscalError::InvalidInput("pos_id must not be empty".to_string()));
        }

        let receipt_id = self.buffer.insert(pos_id, &fiscal_doc).await?;

        let print =
            match tokio::time::timeout(self.print_timeout, self.printer.print(&fiscal_doc)).await {
                Ok(Ok(confirmation)) => Some(confirmation),
                Ok(Err(err)) => {
                    warn!(receipt_id = %receipt_id, error = %err, "fiscalization.print_failed");
                    None
                }
                Err(_) => {
                    let timeout_ms = u64::try_from(self.print_timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        receipt_id = %receipt_id,
                        timeout_ms,
                        "fiscalization.print_timed_out"
                    );
                    None
                }
            };

        info!(receipt_id = %receipt_id, printed = print.is_some(), "fiscalization.receipt_created");
        Ok(CreatedReceipt { receipt_id, print })
    }

    /// Buffer status plus breaker snapshot
    pub async fn health(&self) -> Result<HealthReport> {
        let buffer = self.buffer.status().await?;
        Ok(HealthReport { buffer, circuit_breaker: self.breaker.stats(), checked_at: Utc::now() })
    }

    /// Administrative breaker reset
    pub fn reset_circuit_breaker(&self) {
        warn!(breaker = %self.breaker.name(), "fiscalization.breaker_reset_requested");
        self.breaker.reset();
    }

    pub fn buffer(&self) -> &Arc<dyn ReceiptBuffer> {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use fiscalsync_common::{CircuitBreakerConfig, CircuitState};
    use fiscalsync_domain::{
        AuditEvent, DeadLetterEntry, HybridTimestamp, PrintConfirmation, Receipt,
    };
    use parking_lot::Mutex;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    #[derive(Default)]
    struct MemoryBuffer {
        receipts: Mutex<Vec<Receipt>>,
        capacity: usize,
    }

    impl MemoryBuffer {
        fn with_capacity(capacity: usize) -> Self {
            Self { receipts: Mutex::new(Vec::new()), capacity }
        }
    }

    #[async_trait]
    impl ReceiptBuffer for MemoryBuffer {
        async fn insert(&self, pos_id: &str, fiscal_doc: &FiscalDocument) -> Result<Uuid> {
            let mut receipts = self.receipts.lock();
            if receipts.len() >= self.capacity {
                return Err(FiscalError::CapacityExceeded { capacity: self.capacity as u32 });
            }
            let counter = receipts.len() as u32;
            let receipt = Receipt::new_pending(
                pos_id,
                fiscal_doc.clone(),
                HybridTimestamp::new(1, counter),
                Utc::now(),
            );
            let id = receipt.id;
            receipts.push(receipt);
            Ok(id)
        }

        async fn get_pending(&self, limit: usize) -> Result<Vec<Receipt>> {
            Ok(self.receipts.lock().iter().take(limit).cloned().collect())
        }

        async fn get_receipt(&self, id: Uuid) -> Result<Option<Receipt>> {
            Ok(self.receipts.lock().iter().find(|r| r.id == id).cloned())
        }

        async fn status(&self) -> Result<BufferStatus> {
            let pending = self.receipts.lock().len() as u64;
            Ok(BufferStatus::from_counts(pending, 0, 0, 0, 0, self.capacity as u32))
        }

        async fn mark_syncing(&self, _id: Uuid) -> Result<bool> {
            Ok(false)
        }

        async fn return_to_pending(&self, _id: Uuid) -> Result<bool> {
            Ok(false)
        }

        async fn mark_synced(&self, _id: Uuid, _server_time: i64) -> Result<bool> {
            Ok(false)
        }

        async fn increment_retry(&self, _id: Uuid, _error: &str) -> Result<Option<u32>> {
            Ok(None)
        }

        async fn move_to_dead_letter(&self, _id: Uuid, _reason: &str) -> Result<bool> {
            Ok(false)
        }

        async fn recover_in_flight(&self) -> Result<u64> {
            Ok(0)
        }

        async fn dead_letters(&self, _limit: usize) -> Result<Vec<DeadLetterEntry>> {
            Ok(Vec::new())
        }

        async fn audit_trail(&self, _receipt_id: Uuid) -> Result<Vec<AuditEvent>> {
            Ok(Vec::new())
        }
    }

    struct ScriptedPrinter {
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedPrinter {
        fn new(fail: bool) -> Self {
            Self { fail, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl PrintDevice for ScriptedPrinter {
        async fn print(&self, _fiscal_doc: &FiscalDocument) -> Result<PrintConfirmation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FiscalError::Internal("paper out".to_string()));
            }
            Ok(PrintConfirmation { printed_at: Utc::now(), reference: Some("FM-1".to_string()) })
        }
    }

    /// Printer that never answers
    struct JammedPrinter;

    #[async_trait]
    impl PrintDevice for JammedPrinter {
        async fn print(&self, _fiscal_doc: &FiscalDocument) -> Result<PrintConfirmation> {
            std::future::pending().await
        }
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("test-operator", CircuitBreakerConfig::default()).unwrap()
    }

    fn doc() -> FiscalDocument {
        FiscalDocument::new(json!({ "total": 10 }))
    }

    #[tokio::test]
    async fn create_receipt_persists_and_prints() {
        let buffer = Arc::new(MemoryBuffer::with_capacity(10));
        let printer = Arc::new(ScriptedPrinter::new(false));
        let service = FiscalizationService::new(buffer.clone(), printer.clone(), breaker());

        let created = service.create_receipt("pos-1", doc()).await.unwrap();

        assert!(created.print.is_some());
        assert_eq!(printer.calls.load(Ordering::SeqCst), 1);
        assert!(buffer.get_receipt(created.receipt_id).await.unwrap().is_some());
    }

    /// Validates that a print failure never fails the create operation.
    ///
    /// Assertions:
    /// - Confirms the receipt id is returned with `print: None`.
    /// - Confirms the receipt is still stored.
    #[tokio::test]
    async fn print_failure_keeps_receipt_durable() {
        let buffer = Arc::new(MemoryBuffer::with_capacity(10));
        let service = FiscalizationService::new(
            buffer.clone(),
            Arc::new(ScriptedPrinter::new(true)),
            breaker(),
        );

        let created = service.create_receipt("pos-1", doc()).await.unwrap();

        assert!(created.print.is_none());
        assert_eq!(buffer.status().await.unwrap().pending, 1);
    }

    /// Validates the print timeout.
    ///
    /// Assertions:
    /// - Confirms a printer that never answers yields `print: None` once the
    ///   timeout elapses.
    /// - Confirms the receipt stays pending.
    #[tokio::test]
    async fn jammed_printer_times_out() {
        let buffer = Arc::new(MemoryBuffer::with_capacity(10));
        let service = FiscalizationService::new(buffer.clone(), Arc::new(JammedPrinter), breaker())
            .with_print_timeout(Duration::from_millis(20));

        let created = tokio::time::timeout(
            Duration::from_secs(2),
            service.create_receipt("pos-1", doc()),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(created.print.is_none());
        assert_eq!(buffer.status().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn capacity_error_propagates_without_printing() {
        let buffer = Arc::new(MemoryBuffer::with_capacity(1));
        let printer = Arc::new(ScriptedPrinter::new(false));
        let service = FiscalizationService::new(buffer, printer.clone(), breaker());

        service.create_receipt("pos-1", doc()).await.unwrap();
        let err = service.create_receipt("pos-1", doc()).await.unwrap_err();

        assert_eq!(err, FiscalError::CapacityExceeded { capacity: 1 });
        assert_eq!(printer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_pos_id_is_rejected() {
        let service = FiscalizationService::new(
            Arc::new(MemoryBuffer::with_capacity(1)),
            Arc::new(ScriptedPrinter::new(false)),
            breaker(),
        );

        let err = service.create_receipt("  ", doc()).await.unwrap_err();
        assert!(matches!(err, FiscalError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn health_combines_buffer_and_breaker() {
        let shared = breaker();
        let service = FiscalizationService::new(
            Arc::new(MemoryBuffer::with_capacity(4)),
            Arc::new(ScriptedPrinter::new(false)),
            shared.clone(),
        );
        service.create_receipt("pos-1", doc()).await.unwrap();
        for _ in 0..5 {
            shared.record_failure();
        }

        let health = service.health().await.unwrap();
        assert_eq!(health.buffer.pending, 1);
        assert!((health.buffer.percent_full - 25.0).abs() < f64::EPSILON);
        assert_eq!(health.circuit_breaker.state, CircuitState::Open);

        service.reset_circuit_breaker();
        assert_eq!(service.health().await.unwrap().circuit_breaker.state, CircuitState::Closed);
    }
}
