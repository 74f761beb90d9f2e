//! Run and conflict history in the shared analytics store.
//!
//! Event logging is best-effort: a failure to record history is logged
//! and swallowed, never allowed to fail the sync run it describes.

use driftsync_model::{Conflict, SyncRunResult};
use driftsync_store::{Store, StoreDescriptor, StoreError, StoreResult};
use uuid::Uuid;

const EVENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sync_events (
        run_id TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        target TEXT NOT NULL,
        started_at_ms INTEGER NOT NULL,
        finished_at_ms INTEGER NOT NULL,
        applied INTEGER NOT NULL,
        skipped INTEGER NOT NULL,
        conflicted INTEGER NOT NULL,
        failed INTEGER NOT NULL,
        checkpoint INTEGER NOT NULL,
        success INTEGER NOT NULL,
        error TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_sync_events_pair
        ON sync_events (source, target, started_at_ms);
    CREATE TABLE IF NOT EXISTS sync_conflicts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        table_name TEXT NOT NULL,
        primary_key TEXT NOT NULL,
        source_origin TEXT NOT NULL,
        target_origin TEXT NOT NULL,
        winner TEXT,
        strategy TEXT,
        reason TEXT,
        detected_at_ms INTEGER NOT NULL
    );
";

/// Writes run summaries and conflict resolutions to the analytics
/// store. Opens a fresh connection per call so it can be shared across
/// reconciler threads.
#[derive(Debug, Clone)]
pub struct SyncEventLogger {
    descriptor: StoreDescriptor,
}

impl SyncEventLogger {
    /// Creates a logger writing to the given analytics store.
    pub fn new(descriptor: StoreDescriptor) -> Self {
        Self { descriptor }
    }

    /// Records one run summary. Best-effort.
    pub fn record_run(&self, result: &SyncRunResult) {
        if let Err(err) = self.try_record_run(result) {
            tracing::warn!(
                store = %self.descriptor.name,
                run_id = %result.run_id,
                error = %err,
                "failed to record sync run event"
            );
        }
    }

    /// Records the conflicts of one run. Best-effort.
    pub fn record_conflicts(&self, run_id: Uuid, conflicts: &[Conflict]) {
        if conflicts.is_empty() {
            return;
        }
        if let Err(err) = self.try_record_conflicts(run_id, conflicts) {
            tracing::warn!(
                store = %self.descriptor.name,
                run_id = %run_id,
                error = %err,
                "failed to record conflict history"
            );
        }
    }

    /// Latest recorded run for a pair, if any.
    pub fn latest_for_pair(&self, source: &str, target: &str) -> StoreResult<Option<SyncRunResult>> {
        let store = self.open()?;
        let mut stmt = store.conn().prepare(
            "SELECT run_id, source, target, started_at_ms, finished_at_ms,
                    applied, skipped, conflicted, failed, checkpoint, success, error
             FROM sync_events
             WHERE source = ?1 AND target = ?2
             ORDER BY started_at_ms DESC
             LIMIT 1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![source, target], row_to_result)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    /// Most recent runs across all pairs, newest first.
    pub fn recent(&self, limit: usize) -> StoreResult<Vec<SyncRunResult>> {
        let store = self.open()?;
        let mut stmt = store.conn().prepare(
            "SELECT run_id, source, target, started_at_ms, finished_at_ms,
                    applied, skipped, conflicted, failed, checkpoint, success, error
             FROM sync_events
             ORDER BY started_at_ms DESC
             LIMIT ?1",
        )?;
        let results = stmt
            .query_map([limit as i64], row_to_result)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    fn open(&self) -> StoreResult<Store> {
        let store = Store::open(&self.descriptor)?;
        store
            .conn()
            .execute_batch(EVENTS_SCHEMA)
            .map_err(StoreError::from)?;
        Ok(store)
    }

    fn try_record_run(&self, result: &SyncRunResult) -> StoreResult<()> {
        let store = self.open()?;
        store.conn().execute(
            "INSERT OR REPLACE INTO sync_events
                 (run_id, source, target, started_at_ms, finished_at_ms,
                  applied, skipped, conflicted, failed, checkpoint, success, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                result.run_id.to_string(),
                result.source,
                result.target,
                result.started_at_ms,
                result.finished_at_ms,
                result.counts.applied as i64,
                result.counts.skipped as i64,
                result.counts.conflicted as i64,
                result.counts.failed as i64,
                result.checkpoint as i64,
                result.success,
                result.error_summary(),
            ],
        )?;
        Ok(())
    }

    fn try_record_conflicts(&self, run_id: Uuid, conflicts: &[Conflict]) -> StoreResult<()> {
        let mut store = self.open()?;
        let txn = store.conn_mut().transaction()?;
        for conflict in conflicts {
            let resolution = conflict.outcome.resolution();
            let reason = match &conflict.outcome {
                driftsync_model::ResolutionOutcome::Unresolved { reason } => Some(reason.clone()),
                driftsync_model::ResolutionOutcome::Resolved(_) => None,
            };
            txn.execute(
                "INSERT INTO sync_conflicts
                     (run_id, table_name, primary_key, source_origin, target_origin,
                      winner, strategy, reason, detected_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    run_id.to_string(),
                    conflict.table,
                    conflict.primary_key,
                    conflict.source_record.origin,
                    conflict.target_record.origin,
                    resolution.map(|r| r.winner.as_str()),
                    resolution.map(|r| r.strategy.as_str()),
                    reason,
                    conflict.detected_at_ms,
                ],
            )?;
        }
        txn.commit()?;
        Ok(())
    }
}

fn row_to_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRunResult> {
    let run_id: String = row.get(0)?;
    let error: Option<String> = row.get(11)?;
    Ok(SyncRunResult {
        run_id: Uuid::parse_str(&run_id).unwrap_or_else(|_| Uuid::nil()),
        source: row.get(1)?,
        target: row.get(2)?,
        started_at_ms: row.get(3)?,
        finished_at_ms: row.get(4)?,
        counts: driftsync_model::RunCounts {
            applied: row.get::<_, i64>(5)? as u64,
            skipped: row.get::<_, i64>(6)? as u64,
            conflicted: row.get::<_, i64>(7)? as u64,
            failed: row.get::<_, i64>(8)? as u64,
        },
        errors: error.into_iter().collect(),
        checkpoint: row.get::<_, i64>(9)? as u64,
        success: row.get(10)?,
    })
}
