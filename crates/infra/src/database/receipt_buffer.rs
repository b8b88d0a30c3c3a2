//! SQLite-backed durable receipt buffer
//!
//! Every mutating call runs as one `BEGIN IMMEDIATE` transaction behind an
//! in-process write gate and is fsynced (`synchronous=FULL`) before it
//! returns. Reads take their own pooled connection and never wait on the
//! gate; under WAL they see the last committed state.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fiscalsync_common::storage::SqliteConnection;
use fiscalsync_core::{HybridLogicalClock, ReceiptBuffer};
use fiscalsync_domain::{
    AuditEvent, AuditEventType, BufferStatus, DeadLetterEntry, FiscalDocument, FiscalError,
    HybridTimestamp, Receipt, ReceiptStatus, Result,
};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use serde_json::json;
use tokio::task;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::manager::{map_sql_error, DbManager};
use crate::errors::{map_join_error, map_storage_error};

const RECEIPT_COLUMNS: &str = "id, pos_id, created_at, hlc_local_time, hlc_logical_counter, \
     hlc_server_time, fiscal_doc, status, retry_count, last_error, synced_at";

/// Durable buffer over the shared SQLite database
#[derive(Debug, Clone)]
pub struct SqliteReceiptBuffer {
    db: Arc<DbManager>,
    clock: Arc<HybridLogicalClock>,
    capacity: u32,
    write_gate: Arc<Mutex<()>>,
}

impl SqliteReceiptBuffer {
    /// `db` must already be migrated
    pub fn new(db: Arc<DbManager>, clock: Arc<HybridLogicalClock>, capacity: u32) -> Self {
        Self { db, clock, capacity, write_gate: Arc::new(Mutex::new(())) }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Run `f` inside one immediate transaction, serialized with every other
    /// writer in this process
    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let gate = Arc::clone(&self.write_gate);

        task::spawn_blocking(move || -> Result<T> {
            let _gate = gate.lock();
            let metrics = Arc::clone(db.pool().metrics());
            let mut conn = db.get_connection()?;
            let tx = conn.immediate_transaction().map_err(map_storage_error)?;

            let value = match f(&tx) {
                Ok(value) => value,
                Err(err) => {
                    metrics.record_transaction(false);
                    return Err(err);
                }
            };

            match tx.commit() {
                Ok(()) => {
                    metrics.record_transaction(true);
                    Ok(value)
                }
                Err(err) => {
                    metrics.record_transaction(false);
                    Err(map_sql_error(err))
                }
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteConnection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> Result<T> {
            let conn = db.get_connection()?;
            f(&conn)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl ReceiptBuffer for SqliteReceiptBuffer {
    #[instrument(skip(self, fiscal_doc))]
    async fn insert(&self, pos_id: &str, fiscal_doc: &FiscalDocument) -> Result<Uuid> {
        let clock = Arc::clone(&self.clock);
        let capacity = self.capacity;
        let pos_id = pos_id.to_string();
        let fiscal_doc = fiscal_doc.clone();

        let receipt = self
            .write(move |tx| {
                let occupied = count_unsynced(tx).map_err(map_sql_error)?;
                if occupied >= u64::from(capacity) {
                    return Err(FiscalError::CapacityExceeded { capacity });
                }

                // Stamped inside the transaction so HLC order matches commit order
                let receipt =
                    Receipt::new_pending(pos_id, fiscal_doc, clock.generate(), Utc::now());
                insert_receipt(tx, &receipt).map_err(map_sql_error)?;
                append_audit(
                    tx,
                    AuditEventType::Created,
                    receipt.id,
                    &json!({ "pos_id": receipt.pos_id, "hlc": receipt.hlc.to_string() }),
                )
                .map_err(map_sql_error)?;
                Ok(receipt)
            })
            .await
            .inspect_err(|err| {
                if matches!(err, FiscalError::CapacityExceeded { .. }) {
                    warn!(capacity = self.capacity, "buffer.capacity_exceeded");
                }
            })?;

        debug!(receipt_id = %receipt.id, hlc = %receipt.hlc, "buffer.receipt_inserted");
        Ok(receipt.id)
    }

    async fn get_pending(&self, limit: usize) -> Result<Vec<Receipt>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.read(move |conn| {
            let sql = format!(
                "SELECT {RECEIPT_COLUMNS}
                 FROM receipts
                 WHERE status = 'pending'
                 ORDER BY COALESCE(hlc_server_time, hlc_local_time) ASC,
                          hlc_logical_counter ASC,
                          created_at ASC,
                          id ASC
                 LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_storage_error)?;
            stmt.query_map(params![limit], map_receipt_row).map_err(map_storage_error)
        })
        .await
    }

    async fn get_receipt(&self, id: Uuid) -> Result<Option<Receipt>> {
        self.read(move |conn| select_receipt(conn, id).map_err(map_sql_error)).await
    }

    async fn status(&self) -> Result<BufferStatus> {
        let capacity = self.capacity;
        self.read(move |conn| {
            // One statement, one snapshot
            conn.query_row(
                "SELECT
                     COALESCE(SUM(status = 'pending'), 0),
                     COALESCE(SUM(status = 'syncing'), 0),
                     COALESCE(SUM(status = 'synced'), 0),
                     COALESCE(SUM(status = 'failed'), 0),
                     (SELECT COUNT(*) FROM dead_letters)
                 FROM receipts",
                params![],
                |row| {
                    Ok(BufferStatus::from_counts(
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        capacity,
                    ))
                },
            )
            .map_err(map_storage_error)
        })
        .await
    }

    async fn mark_syncing(&self, id: Uuid) -> Result<bool> {
        self.write(move |tx| {
            let changed = tx
                .execute(
                    "UPDATE receipts SET status = 'syncing' WHERE id = ?1 AND status = 'pending'",
                    params![id.to_string()],
                )
                .map_err(map_sql_error)?;
            Ok(changed > 0)
        })
        .await
    }

    async fn return_to_pending(&self, id: Uuid) -> Result<bool> {
        self.write(move |tx| {
            let changed = tx
                .execute(
                    "UPDATE receipts SET status = 'pending' WHERE id = ?1 AND status = 'syncing'",
                    params![id.to_string()],
                )
                .map_err(map_sql_error)?;
            Ok(changed > 0)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn mark_synced(&self, id: Uuid, server_time: i64) -> Result<bool> {
        let updated = self
            .write(move |tx| {
                let now = Utc::now();
                let changed = tx
                    .execute(
                        "UPDATE receipts
                         SET status = 'synced',
                             hlc_server_time = COALESCE(hlc_server_time, ?2),
                             synced_at = ?3,
                             last_error = NULL
                         WHERE id = ?1 AND status IN ('pending', 'syncing')",
                        params![id.to_string(), server_time, now.timestamp_millis()],
                    )
                    .map_err(map_sql_error)?;
                if changed == 0 {
                    return Ok(false);
                }

                append_audit(tx, AuditEventType::Synced, id, &json!({ "server_time": server_time }))
                    .map_err(map_sql_error)?;
                Ok(true)
            })
            .await?;

        if updated {
            debug!(receipt_id = %id, server_time, "buffer.receipt_synced");
        } else {
            debug!(receipt_id = %id, "buffer.mark_synced_ignored");
        }
        Ok(updated)
    }

    async fn increment_retry(&self, id: Uuid, error: &str) -> Result<Option<u32>> {
        let error = error.to_string();
        self.write(move |tx| {
            let count: Option<u32> = tx
                .query_row(
                    "UPDATE receipts
                     SET retry_count = retry_count + 1,
                         last_error = ?2,
                         status = 'pending'
                     WHERE id = ?1 AND status IN ('pending', 'syncing')
                     RETURNING retry_count",
                    params![id.to_string(), error],
                    |row| row.get(0),
                )
                .optional()
                .map_err(map_sql_error)?;

            if let Some(attempt) = count {
                append_audit(
                    tx,
                    AuditEventType::RetryFailed,
                    id,
                    &json!({ "attempt": attempt, "error": error }),
                )
                .map_err(map_sql_error)?;
            }
            Ok(count)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn move_to_dead_letter(&self, id: Uuid, reason: &str) -> Result<bool> {
        let reason = reason.to_string();
        let moved = self
            .write(move |tx| {
                let Some(receipt) = select_receipt(tx, id).map_err(map_sql_error)? else {
                    return Ok(None);
                };
                if !receipt.status.is_unsynced() {
                    return Ok(None);
                }

                let failed_at = Utc::now();
                tx.execute(
                    "INSERT INTO dead_letters (original_receipt_id, pos_id, failed_at, reason,
                                               fiscal_doc, retry_attempts, last_error)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        id.to_string(),
                        receipt.pos_id,
                        failed_at.timestamp_millis(),
                        reason,
                        receipt.fiscal_doc.to_json(),
                        receipt.retry_count,
                        receipt.last_error,
                    ],
                )
                .map_err(map_sql_error)?;

                tx.execute(
                    "UPDATE receipts SET status = 'failed' WHERE id = ?1",
                    params![id.to_string()],
                )
                .map_err(map_sql_error)?;

                append_audit(
                    tx,
                    AuditEventType::DeadLettered,
                    id,
                    &json!({ "reason": reason, "retry_attempts": receipt.retry_count }),
                )
                .map_err(map_sql_error)?;
                Ok(Some(receipt.retry_count))
            })
            .await?;

        match moved {
            Some(retry_attempts) => {
                warn!(receipt_id = %id, retry_attempts, "buffer.receipt_dead_lettered");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn recover_in_flight(&self) -> Result<u64> {
        let recovered = self
            .write(move |tx| {
                let ids: Vec<String> = {
                    let mut stmt = tx
                        .prepare("SELECT id FROM receipts WHERE status = 'syncing'")
                        .map_err(map_sql_error)?;
                    let rows = stmt.query_map(params![], |row| row.get(0)).map_err(map_sql_error)?;
                    rows.collect::<rusqlite::Result<Vec<String>>>().map_err(map_sql_error)?
                };

                for raw in &ids {
                    tx.execute(
                        "UPDATE receipts SET status = 'pending' WHERE id = ?1",
                        params![raw],
                    )
                    .map_err(map_sql_error)?;
                    append_audit_raw(
                        tx,
                        AuditEventType::Recovered,
                        raw,
                        &json!({ "from": "syncing" }),
                    )
                    .map_err(map_sql_error)?;
                }
                Ok(ids.len() as u64)
            })
            .await?;

        if recovered > 0 {
            info!(recovered, "buffer.in_flight_recovered");
        }
        Ok(recovered)
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.read(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT original_receipt_id, pos_id, failed_at, reason, fiscal_doc,
                            retry_attempts, last_error
                     FROM dead_letters
                     ORDER BY failed_at DESC, id DESC
                     LIMIT ?1",
                )
                .map_err(map_storage_error)?;
            stmt.query_map(params![limit], map_dead_letter_row).map_err(map_storage_error)
        })
        .await
    }

    async fn audit_trail(&self, receipt_id: Uuid) -> Result<Vec<AuditEvent>> {
        self.read(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, event_type, receipt_id, timestamp, metadata
                     FROM audit_events
                     WHERE receipt_id = ?1
                     ORDER BY id ASC",
                )
                .map_err(map_storage_error)?;
            stmt.query_map(params![receipt_id.to_string()], map_audit_row)
                .map_err(map_storage_error)
        })
        .await
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

fn count_unsynced(conn: &rusqlite::Connection) -> rusqlite::Result<u64> {
    conn.query_row(
        "SELECT COUNT(*) FROM receipts WHERE status IN ('pending', 'syncing')",
        params![],
        |row| row.get(0),
    )
}

fn insert_receipt(conn: &rusqlite::Connection, receipt: &Receipt) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO receipts (id, pos_id, created_at, hlc_local_time, hlc_logical_counter,
                               hlc_server_time, fiscal_doc, status, retry_count, last_error,
                               synced_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            receipt.id.to_string(),
            receipt.pos_id,
            receipt.created_at.timestamp_millis(),
            receipt.hlc.local_time,
            receipt.hlc.logical_counter,
            receipt.hlc.server_time,
            receipt.fiscal_doc.to_json(),
            receipt.status.to_string(),
            receipt.retry_count,
            receipt.last_error,
            receipt.synced_at.map(|t| t.timestamp_millis()),
        ],
    )?;
    Ok(())
}

fn select_receipt(conn: &rusqlite::Connection, id: Uuid) -> rusqlite::Result<Option<Receipt>> {
    conn.query_row(
        &format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?1"),
        params![id.to_string()],
        map_receipt_row,
    )
    .optional()
}

fn append_audit(
    conn: &rusqlite::Connection,
    event_type: AuditEventType,
    receipt_id: Uuid,
    metadata: &serde_json::Value,
) -> rusqlite::Result<()> {
    append_audit_raw(conn, event_type, &receipt_id.to_string(), metadata)
}

fn append_audit_raw(
    conn: &rusqlite::Connection,
    event_type: AuditEventType,
    receipt_id: &str,
    metadata: &serde_json::Value,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO audit_events (event_type, receipt_id, timestamp, metadata)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            event_type.to_string(),
            receipt_id,
            Utc::now().timestamp_millis(),
            metadata.to_string(),
        ],
    )?;
    Ok(())
}

// ============================================================================
// Row Mapping
// ============================================================================

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn invalid_data(column: usize, message: String) -> rusqlite::Error {
    conversion_error(column, std::io::Error::new(std::io::ErrorKind::InvalidData, message))
}

fn uuid_column(row: &Row<'_>, column: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(column)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(column, e))
}

fn millis_column(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(column)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| invalid_data(column, format!("timestamp out of range: {millis}")))
}

fn fiscal_doc_column(row: &Row<'_>, column: usize) -> rusqlite::Result<FiscalDocument> {
    let raw: String = row.get(column)?;
    FiscalDocument::from_json(&raw).map_err(|e| conversion_error(column, e))
}

fn map_receipt_row(row: &Row<'_>) -> rusqlite::Result<Receipt> {
    let status_str: String = row.get(7)?;
    let status = ReceiptStatus::from_str(&status_str).map_err(|e| invalid_data(7, e))?;

    let synced_at = match row.get::<_, Option<i64>>(10)? {
        Some(_) => Some(millis_column(row, 10)?),
        None => None,
    };

    Ok(Receipt {
        id: uuid_column(row, 0)?,
        pos_id: row.get(1)?,
        created_at: millis_column(row, 2)?,
        hlc: HybridTimestamp {
            local_time: row.get(3)?,
            logical_counter: row.get(4)?,
            server_time: row.get(5)?,
        },
        fiscal_doc: fiscal_doc_column(row, 6)?,
        status,
        retry_count: row.get(8)?,
        last_error: row.get(9)?,
        synced_at,
    })
}

fn map_dead_letter_row(row: &Row<'_>) -> rusqlite::Result<DeadLetterEntry> {
    Ok(DeadLetterEntry {
        original_receipt_id: uuid_column(row, 0)?,
        pos_id: row.get(1)?,
        failed_at: millis_column(row, 2)?,
        reason: row.get(3)?,
        fiscal_doc: fiscal_doc_column(row, 4)?,
        retry_attempts: row.get(5)?,
        last_error: row.get(6)?,
    })
}

fn map_audit_row(row: &Row<'_>) -> rusqlite::Result<AuditEvent> {
    let event_str: String = row.get(1)?;
    let event_type = AuditEventType::from_str(&event_str).map_err(|e| invalid_data(1, e))?;
    let metadata_raw: String = row.get(4)?;
    let metadata = serde_json::from_str(&metadata_raw).map_err(|e| conversion_error(4, e))?;

    Ok(AuditEvent {
        id: row.get(0)?,
        event_type,
        receipt_id: uuid_column(row, 2)?,
        timestamp: millis_column(row, 3)?,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use fiscalsync_core::ManualWallClock;
    use tempfile::TempDir;

    use super::*;

    fn open(capacity: u32, wall: ManualWallClock) -> (TempDir, SqliteReceiptBuffer) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(DbManager::open_path(dir.path().join("fiscal.db"), 4).unwrap());
        db.run_migrations().unwrap();
        let clock = Arc::new(HybridLogicalClock::with_wall_clock(wall));
        (dir, SqliteReceiptBuffer::new(db, clock, capacity))
    }

    fn doc(n: u32) -> FiscalDocument {
        FiscalDocument::new(json!({ "seq": n }))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_stamps_and_audits() {
        let (_dir, buffer) = open(10, ManualWallClock::new(1_000));

        let id = buffer.insert("pos-1", &doc(1)).await.unwrap();
        let receipt = buffer.get_receipt(id).await.unwrap().unwrap();

        assert_eq!(receipt.status, ReceiptStatus::Pending);
        assert_eq!(receipt.retry_count, 0);
        assert_eq!((receipt.hlc.local_time, receipt.hlc.logical_counter), (1_000, 0));
        assert_eq!(receipt.fiscal_doc, doc(1));

        let trail = buffer.audit_trail(id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].event_type, AuditEventType::Created);
        assert_eq!(trail[0].metadata["pos_id"], "pos-1");
    }

    /// Validates synced receipts free capacity while syncing ones do not.
    ///
    /// Assertions:
    /// - Confirms the insert after a full buffer fails.
    /// - Confirms a synced receipt makes room for one more.
    #[tokio::test(flavor = "multi_thread")]
    async fn capacity_counts_unsynced_only() {
        let (_dir, buffer) = open(2, ManualWallClock::new(1_000));

        let first = buffer.insert("pos-1", &doc(1)).await.unwrap();
        buffer.insert("pos-1", &doc(2)).await.unwrap();
        assert!(buffer.mark_syncing(first).await.unwrap());
        assert_eq!(
            buffer.insert("pos-1", &doc(3)).await.unwrap_err(),
            FiscalError::CapacityExceeded { capacity: 2 }
        );

        assert!(buffer.mark_synced(first, 1_005).await.unwrap());
        buffer.insert("pos-1", &doc(3)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_synced_sets_server_time_once() {
        let (_dir, buffer) = open(10, ManualWallClock::new(1_000));
        let id = buffer.insert("pos-1", &doc(1)).await.unwrap();

        assert!(buffer.mark_synced(id, 1_010).await.unwrap());
        assert!(!buffer.mark_synced(id, 2_000).await.unwrap());

        let receipt = buffer.get_receipt(id).await.unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Synced);
        assert_eq!(receipt.hlc.server_time, Some(1_010));
        assert!(receipt.synced_at.is_some());
        assert!(receipt.is_consistent());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn increment_retry_returns_receipt_to_pending() {
        let (_dir, buffer) = open(10, ManualWallClock::new(1_000));
        let id = buffer.insert("pos-1", &doc(1)).await.unwrap();
        buffer.mark_syncing(id).await.unwrap();

        assert_eq!(buffer.increment_retry(id, "timeout").await.unwrap(), Some(1));
        assert_eq!(buffer.increment_retry(id, "rejected").await.unwrap(), Some(2));

        let receipt = buffer.get_receipt(id).await.unwrap().unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Pending);
        assert_eq!(receipt.last_error.as_deref(), Some("rejected"));
    }

    /// Validates dead-lettering is atomic and happens once.
    ///
    /// Assertions:
    /// - Confirms the snapshot carries retry count and last error.
    /// - Confirms a second call returns false and adds nothing.
    #[tokio::test(flavor = "multi_thread")]
    async fn move_to_dead_letter_snapshots_once() {
        let (_dir, buffer) = open(10, ManualWallClock::new(1_000));
        let id = buffer.insert("pos-1", &doc(7)).await.unwrap();
        buffer.increment_retry(id, "transport down").await.unwrap();

        assert!(buffer.move_to_dead_letter(id, "max_retries_exceeded").await.unwrap());
        assert!(!buffer.move_to_dead_letter(id, "max_retries_exceeded").await.unwrap());

        let letters = buffer.dead_letters(10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].original_receipt_id, id);
        assert_eq!(letters[0].retry_attempts, 1);
        assert_eq!(letters[0].last_error.as_deref(), Some("transport down"));
        assert_eq!(letters[0].fiscal_doc, doc(7));

        let status = buffer.status().await.unwrap();
        assert_eq!((status.pending, status.failed, status.dead_letter_count), (0, 1, 1));

        let events: Vec<_> =
            buffer.audit_trail(id).await.unwrap().into_iter().map(|e| e.event_type).collect();
        assert_eq!(
            events,
            vec![AuditEventType::Created, AuditEventType::RetryFailed, AuditEventType::DeadLettered]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_ids_are_no_ops() {
        let (_dir, buffer) = open(10, ManualWallClock::new(1_000));
        let ghost = Uuid::now_v7();

        assert!(!buffer.mark_synced(ghost, 1).await.unwrap());
        assert!(!buffer.mark_syncing(ghost).await.unwrap());
        assert_eq!(buffer.increment_retry(ghost, "x").await.unwrap(), None);
        assert!(!buffer.move_to_dead_letter(ghost, "x").await.unwrap());
        assert!(buffer.get_receipt(ghost).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recover_in_flight_resets_syncing() {
        let (_dir, buffer) = open(10, ManualWallClock::new(1_000));
        let a = buffer.insert("pos-1", &doc(1)).await.unwrap();
        let b = buffer.insert("pos-1", &doc(2)).await.unwrap();
        buffer.mark_syncing(a).await.unwrap();

        assert_eq!(buffer.recover_in_flight().await.unwrap(), 1);
        assert_eq!(buffer.recover_in_flight().await.unwrap(), 0);

        let pending: Vec<_> =
            buffer.get_pending(10).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(pending, vec![a, b]);
        assert_eq!(
            buffer.audit_trail(a).await.unwrap().last().map(|e| e.event_type),
            Some(AuditEventType::Recovered)
        );
    }
}
