//! The per-store change-capture log.
//!
//! Every mutating operation on a governed table is recorded here as an
//! immutable `ChangeRecord`, in the same transaction as the row write.
//! Sequence numbers are assigned by the log and are strictly increasing
//! per store.

use crate::apply::{delete_row, upsert_row};
use crate::error::{StoreError, StoreResult};
use crate::inspector::table_schema;
use crate::store::Store;
use driftsync_model::{time, ChangeRecord, OperationKind};
use rusqlite::{params, Connection, OptionalExtension};

/// Write handle for one store's change log, bound to the mutating
/// process's identity (origin store name and optional session id).
#[derive(Debug, Clone)]
pub struct ChangeLog {
    origin: String,
    session_id: Option<String>,
}

impl ChangeLog {
    /// Creates a log handle for the given origin store.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            session_id: None,
        }
    }

    /// Attaches an originating session id to subsequent records.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Inserts a row and logs the mutation atomically.
    pub fn record_insert(
        &self,
        store: &mut Store,
        table: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> StoreResult<ChangeRecord> {
        let record = self.stamp(ChangeRecord::insert(
            table,
            key,
            payload,
            &self.origin,
            time::now_ms(),
        ));
        self.write(store, record)
    }

    /// Updates a row and logs the mutation atomically.
    pub fn record_update(
        &self,
        store: &mut Store,
        table: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> StoreResult<ChangeRecord> {
        let record = self.stamp(ChangeRecord::update(
            table,
            key,
            payload,
            &self.origin,
            time::now_ms(),
        ));
        self.write(store, record)
    }

    /// Deletes a row and logs the mutation atomically.
    pub fn record_delete(&self, store: &mut Store, table: &str, key: &str) -> StoreResult<ChangeRecord> {
        let record = self.stamp(ChangeRecord::delete(table, key, &self.origin, time::now_ms()));
        self.write(store, record)
    }

    fn stamp(&self, record: ChangeRecord) -> ChangeRecord {
        match &self.session_id {
            Some(session) => record.with_session(session.clone()),
            None => record,
        }
    }

    /// Performs the row write and log append in one transaction.
    fn write(&self, store: &mut Store, mut record: ChangeRecord) -> StoreResult<ChangeRecord> {
        let txn = store.conn_mut().transaction()?;

        match record.op {
            OperationKind::Insert | OperationKind::Update => {
                let payload = record.payload.as_ref().ok_or_else(|| {
                    StoreError::apply_failed(&record.table, "non-delete record without payload")
                })?;
                upsert_row(&txn, &record.table, payload)?;
            }
            OperationKind::Delete => {
                let schema = table_schema(&txn, &record.table)?.ok_or_else(|| {
                    StoreError::apply_failed(&record.table, "table does not exist")
                })?;
                let pk_columns: Vec<&str> = schema
                    .primary_key_columns()
                    .map(|c| c.name.as_str())
                    .collect();
                delete_row(&txn, &record.table, &pk_columns, &record.primary_key)?;
            }
        }

        record.seq = Self::append(&txn, &record)?;
        txn.commit()?;
        Ok(record)
    }

    /// Appends one record to the change log inside the caller's
    /// transaction. Returns the assigned sequence number.
    ///
    /// The caller is responsible for performing the governed-row write
    /// in the same transaction; if either fails, both roll back.
    pub fn append(conn: &Connection, record: &ChangeRecord) -> StoreResult<u64> {
        let payload_text = record
            .payload
            .as_ref()
            .map(|p| serde_json::to_string(p))
            .transpose()?;

        conn.execute(
            "INSERT INTO change_log
                 (table_name, primary_key, op, payload, payload_hash, origin, timestamp_ms, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.table,
                record.primary_key,
                record.op.as_str(),
                payload_text,
                record.payload_hash,
                record.origin,
                record.timestamp_ms,
                record.session_id,
            ],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Reads records with `seq > since`, ascending, up to `limit`.
    ///
    /// The returned sequence is strictly ordered and restartable from any
    /// checkpoint; a non-monotonic result is reported as corruption.
    pub fn read_since(
        conn: &Connection,
        store_name: &str,
        since: u64,
        limit: usize,
    ) -> StoreResult<Vec<ChangeRecord>> {
        let mut stmt = conn.prepare(
            "SELECT seq, table_name, primary_key, op, payload, payload_hash,
                    origin, timestamp_ms, session_id
             FROM change_log
             WHERE seq > ?1
             ORDER BY seq ASC
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![since as i64, limit as i64], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        let mut prev = since;
        for row in rows {
            let record = row?;
            if record.seq <= prev {
                return Err(StoreError::log_corruption(
                    store_name,
                    format!("sequence {} observed after {}", record.seq, prev),
                ));
            }
            prev = record.seq;
            records.push(record);
        }
        Ok(records)
    }

    /// Returns the latest change-log entry for a (table, key), if any.
    ///
    /// This is the bounded conflict-detection window: only the most
    /// recent entry per key is consulted.
    pub fn latest_for_key(
        conn: &Connection,
        table: &str,
        key: &str,
    ) -> StoreResult<Option<ChangeRecord>> {
        let record = conn
            .query_row(
                "SELECT seq, table_name, primary_key, op, payload, payload_hash,
                        origin, timestamp_ms, session_id
                 FROM change_log
                 WHERE table_name = ?1 AND primary_key = ?2
                 ORDER BY seq DESC
                 LIMIT 1",
                params![table, key],
                row_to_record,
            )
            .optional()?;
        record.transpose()
    }

    /// Highest sequence number in the log, or 0 if empty.
    pub fn max_seq(conn: &Connection) -> StoreResult<u64> {
        let max: Option<i64> =
            conn.query_row("SELECT MAX(seq) FROM change_log", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0) as u64)
    }

    /// Verifies that a known checkpoint is consistent with the log.
    ///
    /// A checkpoint beyond the log's highest sequence means entries were
    /// lost or the log was truncated out-of-band; that store needs a full
    /// resync and the condition is reported upward, never auto-repaired.
    pub fn verify_checkpoint(conn: &Connection, store_name: &str, checkpoint: u64) -> StoreResult<()> {
        let max = Self::max_seq(conn)?;
        if checkpoint > max {
            return Err(StoreError::log_corruption(
                store_name,
                format!("checkpoint {checkpoint} exceeds highest logged sequence {max}"),
            ));
        }
        Ok(())
    }
}

type RowResult = Result<StoreResult<ChangeRecord>, rusqlite::Error>;

fn row_to_record(row: &rusqlite::Row<'_>) -> RowResult {
    let seq: i64 = row.get(0)?;
    let table: String = row.get(1)?;
    let primary_key: String = row.get(2)?;
    let op_text: String = row.get(3)?;
    let payload_text: Option<String> = row.get(4)?;
    let payload_hash: String = row.get(5)?;
    let origin: String = row.get(6)?;
    let timestamp_ms: i64 = row.get(7)?;
    let session_id: Option<String> = row.get(8)?;

    Ok(build_record(
        seq,
        table,
        primary_key,
        op_text,
        payload_text,
        payload_hash,
        origin,
        timestamp_ms,
        session_id,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_record(
    seq: i64,
    table: String,
    primary_key: String,
    op_text: String,
    payload_text: Option<String>,
    payload_hash: String,
    origin: String,
    timestamp_ms: i64,
    session_id: Option<String>,
) -> StoreResult<ChangeRecord> {
    let op = OperationKind::from_str(&op_text)
        .ok_or_else(|| StoreError::log_corruption(&origin, format!("unknown op {op_text:?}")))?;
    let payload = payload_text
        .map(|text| serde_json::from_str(&text))
        .transpose()?;

    Ok(ChangeRecord {
        seq: seq as u64,
        table,
        primary_key,
        op,
        payload,
        payload_hash,
        origin,
        timestamp_ms,
        session_id,
    })
}
