//! Drain cycle scenarios against a real SQLite buffer with a scripted
//! operator and a mock-clocked breaker.

mod support;

use std::sync::Arc;
use std::time::Duration;

use fiscalsync_common::{CircuitState, MockClock};
use fiscalsync_core::ReceiptBuffer;
use fiscalsync_domain::{AuditEventType, LockUnavailablePolicy, ReceiptStatus};
use fiscalsync_infra::lock::InProcessLockStore;
use fiscalsync_infra::sync::DrainLock;
use support::{breaker, cycle, doc, drain_lock, OperatorMode, ScriptedOperator, TestDatabase};
use tokio_util::sync::CancellationToken;

fn in_process_lock(owner: &str) -> fiscalsync_core::DistributedLock {
    drain_lock(Arc::new(InProcessLockStore::new()), owner, LockUnavailablePolicy::BlockSync)
}

/// Validates the happy path drain.
///
/// Assertions:
/// - Confirms 50 pending receipts are all synced after one cycle.
/// - Confirms each carries a server time and an audit `synced` event.
#[tokio::test(flavor = "multi_thread")]
async fn fifty_receipts_sync_in_one_cycle() {
    let db = TestDatabase::new();
    let buffer = db.buffer(200);
    let operator = ScriptedOperator::new(OperatorMode::Accept);
    let clock = MockClock::new();
    let drain = cycle(buffer.clone(), operator.clone(), breaker(&clock), in_process_lock("pos-a"), 20);

    let mut ids = Vec::new();
    for seq in 0..50 {
        ids.push(buffer.insert("pos-1", &doc(seq)).await.unwrap());
    }

    let report = drain.run_once(&CancellationToken::new()).await.unwrap();
    assert!(matches!(report.lock, DrainLock::Acquired { .. }));
    assert_eq!((report.fetched, report.synced, report.remote_failures), (50, 50, 0));

    let status = buffer.status().await.unwrap();
    assert_eq!((status.pending, status.syncing, status.synced), (0, 0, 50));

    for id in ids {
        let receipt = buffer.get_receipt(id).await.unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Synced);
        assert!(receipt.hlc.server_time.is_some());
        let trail = buffer.audit_trail(id).await.unwrap();
        assert_eq!(trail.last().map(|e| e.event_type), Some(AuditEventType::Synced));
    }
    assert_eq!(operator.calls(), 50);
}

/// Validates the breaker opens on the fifth failure and open skips cost no retries.
///
/// Assertions:
/// - Confirms the breaker is still closed after four failed cycles.
/// - Confirms the fifth failure opens it.
/// - Confirms the next cycle skips the receipt without calling the operator
///   and without bumping `retry_count`.
#[tokio::test(flavor = "multi_thread")]
async fn open_circuit_skips_without_consuming_retries() {
    let db = TestDatabase::new();
    let buffer = db.buffer(10);
    let operator = ScriptedOperator::new(OperatorMode::Fail);
    let clock = MockClock::new();
    let breaker = breaker(&clock);
    let drain = cycle(buffer.clone(), operator.clone(), breaker.clone(), in_process_lock("pos-a"), 20);
    let cancel = CancellationToken::new();

    let id = buffer.insert("pos-1", &doc(1)).await.unwrap();
    for _ in 0..4 {
        drain.run_once(&cancel).await.unwrap();
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    drain.run_once(&cancel).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(operator.calls(), 5);

    let report = drain.run_once(&cancel).await.unwrap();
    assert_eq!((report.circuit_skipped, report.remote_failures), (1, 0));
    assert_eq!(operator.calls(), 5);

    let receipt = buffer.get_receipt(id).await.unwrap().unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Pending);
    assert_eq!(receipt.retry_count, 5);
}

/// Validates recovery through half-open probes.
///
/// Assertions:
/// - Confirms the first call after the recovery timeout is admitted.
/// - Confirms two successful probes close the breaker and sync the receipts.
#[tokio::test(flavor = "multi_thread")]
async fn breaker_recovers_after_timeout() {
    let db = TestDatabase::new();
    let buffer = db.buffer(10);
    let operator = ScriptedOperator::new(OperatorMode::Fail);
    let clock = MockClock::new();
    let breaker = breaker(&clock);
    let drain = cycle(buffer.clone(), operator.clone(), breaker.clone(), in_process_lock("pos-a"), 20);
    let cancel = CancellationToken::new();

    for seq in 0..5 {
        buffer.insert("pos-1", &doc(seq)).await.unwrap();
    }
    drain.run_once(&cancel).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    operator.set_mode(OperatorMode::Accept);
    clock.advance(Duration::from_secs(61));

    let report = drain.run_once(&cancel).await.unwrap();
    assert_eq!(report.synced, 5);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(buffer.status().await.unwrap().synced, 5);
}

/// Validates the permanent-failure scenario end to end.
///
/// Assertions:
/// - Confirms every receipt reaches the dead-letter store after exactly 20
///   operator attempts.
/// - Confirms each appears there once and none remains pending.
#[tokio::test(flavor = "multi_thread")]
async fn permanent_failure_dead_letters_after_max_retries() {
    let db = TestDatabase::new();
    let buffer = db.buffer(10);
    let operator = ScriptedOperator::new(OperatorMode::Fail);
    let clock = MockClock::new();
    let drain = cycle(buffer.clone(), operator.clone(), breaker(&clock), in_process_lock("pos-a"), 20);
    let cancel = CancellationToken::new();

    let mut ids = Vec::new();
    for seq in 0..3 {
        ids.push(buffer.insert("pos-1", &doc(seq)).await.unwrap());
    }

    let mut cycles = 0;
    while buffer.status().await.unwrap().dead_letter_count < 3 {
        cycles += 1;
        assert!(cycles < 500, "drain did not converge");
        drain.run_once(&cancel).await.unwrap();
        clock.advance(Duration::from_secs(61));
    }
    // One more cycle must not touch failed receipts
    let report = drain.run_once(&cancel).await.unwrap();
    assert_eq!(report.fetched, 0);

    let status = buffer.status().await.unwrap();
    assert_eq!((status.pending, status.failed, status.dead_letter_count), (0, 3, 3));

    let letters = buffer.dead_letters(10).await.unwrap();
    assert_eq!(letters.len(), 3);
    for id in &ids {
        let entries: Vec<_> = letters.iter().filter(|l| l.original_receipt_id == *id).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].retry_attempts, 20);
        assert_eq!(entries[0].reason, "max_retries_exceeded");
    }
    assert!(operator.calls_per_doc().values().all(|calls| *calls == 20));
}

/// Validates a receipt whose retries were used up before a crash.
///
/// Assertions:
/// - Confirms a pending receipt already at `max_retries` is dead-lettered
///   without another operator call.
/// - Confirms the snapshot keeps the attempt count and last error.
#[tokio::test(flavor = "multi_thread")]
async fn exhausted_receipt_is_dead_lettered_without_sending() {
    let db = TestDatabase::new();
    let buffer = db.buffer(10);
    let operator = ScriptedOperator::new(OperatorMode::Accept);
    let clock = MockClock::new();
    let drain = cycle(buffer.clone(), operator.clone(), breaker(&clock), in_process_lock("pos-a"), 3);

    let exhausted = buffer.insert("pos-1", &doc(1)).await.unwrap();
    let fresh = buffer.insert("pos-1", &doc(2)).await.unwrap();
    for _ in 0..3 {
        buffer.increment_retry(exhausted, "connection reset").await.unwrap();
    }

    let report = drain.run_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.synced, 1);
    assert_eq!(operator.calls(), 1);
    assert_eq!(operator.calls_per_doc().get(&1), None);

    let letters = buffer.dead_letters(10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].original_receipt_id, exhausted);
    assert_eq!(letters[0].retry_attempts, 3);
    assert_eq!(letters[0].last_error.as_deref(), Some("connection reset"));

    let fresh = buffer.get_receipt(fresh).await.unwrap().unwrap();
    assert_eq!(fresh.status, ReceiptStatus::Synced);
}

/// Validates rejection and timeout both count as remote failures.
///
/// Assertions:
/// - Confirms an `accepted == false` ack bumps `retry_count`.
/// - Confirms a call slower than the timeout bumps it again.
#[tokio::test(flavor = "multi_thread")]
async fn rejection_and_timeout_consume_retry_budget() {
    let db = TestDatabase::new();
    let buffer = db.buffer(10);
    let operator = ScriptedOperator::new(OperatorMode::Reject);
    let clock = MockClock::new();
    let drain = cycle(buffer.clone(), operator.clone(), breaker(&clock), in_process_lock("pos-a"), 20);
    let cancel = CancellationToken::new();

    let id = buffer.insert("pos-1", &doc(1)).await.unwrap();
    let report = drain.run_once(&cancel).await.unwrap();
    assert_eq!(report.remote_failures, 1);

    operator.set_mode(OperatorMode::Slow(Duration::from_secs(2)));
    drain.run_once(&cancel).await.unwrap();

    let receipt = buffer.get_receipt(id).await.unwrap().unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Pending);
    assert_eq!(receipt.retry_count, 2);
    assert!(receipt.last_error.unwrap().contains("timed out"));
}

/// Validates a cancelled cycle leaves no receipt half-applied.
///
/// Assertions:
/// - Confirms nothing is sent when cancelled up front.
/// - Confirms no receipt is left `syncing`.
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_cycle_leaves_receipts_pending() {
    let db = TestDatabase::new();
    let buffer = db.buffer(10);
    let operator = ScriptedOperator::new(OperatorMode::Accept);
    let clock = MockClock::new();
    let drain = cycle(buffer.clone(), operator.clone(), breaker(&clock), in_process_lock("pos-a"), 20);

    for seq in 0..3 {
        buffer.insert("pos-1", &doc(seq)).await.unwrap();
    }
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = drain.run_once(&cancel).await.unwrap();
    assert_eq!((report.fetched, report.synced), (3, 0));
    assert_eq!(operator.calls(), 0);

    let status = buffer.status().await.unwrap();
    assert_eq!((status.pending, status.syncing), (3, 0));
}

/// Validates leftovers from an interrupted cycle are picked up.
///
/// Assertions:
/// - Confirms a receipt stuck in `syncing` is synced by the next cycle.
#[tokio::test(flavor = "multi_thread")]
async fn interrupted_syncing_receipt_is_recovered() {
    let db = TestDatabase::new();
    let buffer = db.buffer(10);
    let operator = ScriptedOperator::new(OperatorMode::Accept);
    let clock = MockClock::new();
    let drain = cycle(buffer.clone(), operator.clone(), breaker(&clock), in_process_lock("pos-a"), 20);

    let id = buffer.insert("pos-1", &doc(1)).await.unwrap();
    buffer.mark_syncing(id).await.unwrap();

    let report = drain.run_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(buffer.get_receipt(id).await.unwrap().unwrap().status, ReceiptStatus::Synced);
}
