//! The per-pair sync run state machine.
//!
//! One [`SyncManager`] drives one directed run: open both stores, check
//! schema compatibility, then stream change records from the source's
//! log in batches. Each batch is applied to the target and committed in
//! a single transaction together with its checkpoint advance, so a
//! committed batch and its checkpoint can never diverge. Replaying a
//! batch after a crash is safe because row application is keyed.

use crate::config::SyncPairConfig;
use crate::error::{SyncError, SyncResult};
use crate::resolver::ConflictResolver;
use driftsync_model::{
    time, ChangeRecord, Conflict, RunCounts, SchemaFingerprint, SyncRunResult, Winner,
};
use driftsync_store::{
    apply_record, fingerprint, table_create_sql, ChangeLog, Checkpoint, Store, StoreError,
    StoreRegistry,
};
use parking_lot::RwLock;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Lifecycle of a sync run. Advances monotonically; `Failed` is
/// terminal from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Opening stores and verifying preconditions.
    Initializing,
    /// Schemas compared and found compatible.
    SchemaChecked,
    /// Reading a batch from the source change log.
    Streaming,
    /// Applying a batch to the target.
    Applying,
    /// The current batch's transaction was committed.
    Committed,
    /// All pending records consumed; terminal success state.
    Checkpointed,
    /// The run stopped on an error; terminal.
    Failed,
}

impl RunState {
    /// Returns true for the two terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Checkpointed | RunState::Failed)
    }
}

/// Everything a run produced: the persisted result plus the transient
/// conflicts, which only outlive the run when resolution logging is on.
#[derive(Debug)]
pub struct RunOutcome {
    /// The run summary.
    pub result: SyncRunResult,
    /// Conflicts detected during the run, resolved or not.
    pub conflicts: Vec<Conflict>,
    /// True if non-fatal structural drift was observed.
    pub schema_drift: bool,
}

impl RunOutcome {
    /// Number of conflicts left unresolved.
    pub fn unresolved(&self) -> u64 {
        self.conflicts.iter().filter(|c| !c.is_resolved()).count() as u64
    }
}

#[derive(Default)]
struct RunProgress {
    counts: RunCounts,
    conflicts: Vec<Conflict>,
    checkpoint: u64,
    schema_drift: bool,
}

enum Disposition {
    Apply,
    Skip,
    Conflicted(Conflict),
}

/// Drives sync runs for one configured pair.
pub struct SyncManager<'a> {
    registry: &'a StoreRegistry,
    config: SyncPairConfig,
    default_resolver: ConflictResolver,
    table_resolvers: HashMap<String, ConflictResolver>,
    state: RwLock<RunState>,
    cancelled: AtomicBool,
}

impl<'a> SyncManager<'a> {
    /// Creates a manager for one pair, building resolvers from the
    /// pair's strategy and per-table overrides.
    pub fn new(registry: &'a StoreRegistry, config: SyncPairConfig) -> Self {
        let default_resolver =
            ConflictResolver::new(config.strategy.clone(), config.priority.clone());
        let table_resolvers = config
            .table_strategies
            .iter()
            .map(|(table, strategy)| {
                (
                    table.clone(),
                    ConflictResolver::new(strategy.clone(), config.priority.clone()),
                )
            })
            .collect();

        Self {
            registry,
            config,
            default_resolver,
            table_resolvers,
            state: RwLock::new(RunState::Initializing),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    /// The pair this manager drives.
    pub fn config(&self) -> &SyncPairConfig {
        &self.config
    }

    /// Requests cancellation. Honored at the next batch boundary;
    /// already committed batches stay committed.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Executes one full sync run.
    ///
    /// Never panics on sync failures: errors are folded into the
    /// returned result and the run ends in `Failed`.
    pub fn run(&self) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let started_at_ms = time::now_ms();
        self.set_state(RunState::Initializing);

        tracing::info!(
            run_id = %run_id,
            source = %self.config.source,
            target = %self.config.target,
            "sync run starting"
        );

        let mut progress = RunProgress::default();
        let mut errors = Vec::new();
        let success = match self.execute(&mut progress) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    run_id = %run_id,
                    source = %self.config.source,
                    target = %self.config.target,
                    error = %err,
                    "sync run failed"
                );
                self.set_state(RunState::Failed);
                errors.push(err.to_string());
                false
            }
        };

        let result = SyncRunResult {
            run_id,
            source: self.config.source.clone(),
            target: self.config.target.clone(),
            started_at_ms,
            finished_at_ms: time::now_ms(),
            counts: progress.counts,
            errors,
            checkpoint: progress.checkpoint,
            success,
        };

        tracing::info!(
            run_id = %run_id,
            applied = result.counts.applied,
            skipped = result.counts.skipped,
            conflicted = result.counts.conflicted,
            checkpoint = result.checkpoint,
            success,
            "sync run finished"
        );

        RunOutcome {
            result,
            conflicts: progress.conflicts,
            schema_drift: progress.schema_drift,
        }
    }

    fn execute(&self, progress: &mut RunProgress) -> SyncResult<()> {
        let source = self.open_with_retry(&self.config.source)?;
        let mut target = self.open_with_retry(&self.config.target)?;

        if self.config.create_missing_tables {
            self.create_missing_tables(&source, &target)?;
        }

        let source_schema = fingerprint(&source)?;
        let target_schema = fingerprint(&target)?;
        let diff = source_schema.diff(&target_schema);
        progress.schema_drift = !diff.is_empty();
        if diff.is_incompatible() {
            return Err(SyncError::SchemaIncompatible {
                source_store: self.config.source.clone(),
                target: self.config.target.clone(),
                diff: Box::new(diff),
            });
        }
        self.set_state(RunState::SchemaChecked);

        let mut checkpoint =
            Checkpoint::load(target.conn(), &self.config.source, &self.config.target)?;
        ChangeLog::verify_checkpoint(source.conn(), &self.config.source, checkpoint)?;
        progress.checkpoint = checkpoint;

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(SyncError::Cancelled);
            }

            self.set_state(RunState::Streaming);
            let batch = ChangeLog::read_since(
                source.conn(),
                &self.config.source,
                checkpoint,
                self.config.batch_size,
            )?;
            if batch.is_empty() {
                break;
            }
            let full = batch.len() == self.config.batch_size;

            self.set_state(RunState::Applying);
            checkpoint = self.apply_batch(&source_schema, &mut target, &batch, checkpoint, progress)?;

            if !full {
                break;
            }
        }

        self.set_state(RunState::Checkpointed);
        Ok(())
    }

    /// Applies one batch inside a single target transaction that also
    /// advances the checkpoint.
    ///
    /// A write failure rolls the whole batch back and leaves the
    /// checkpoint at the previous boundary. An unresolved conflict
    /// commits the records applied before it, checkpoints to just
    /// before the conflicting record, and stops the run.
    fn apply_batch(
        &self,
        source_schema: &SchemaFingerprint,
        target: &mut Store,
        batch: &[ChangeRecord],
        since: u64,
        progress: &mut RunProgress,
    ) -> SyncResult<u64> {
        let mut batch_counts = RunCounts::default();
        let mut batch_conflicts = Vec::new();
        let mut committed_seq = since;
        let mut halt = None;

        let txn = target.conn_mut().transaction().map_err(StoreError::from)?;

        for record in batch {
            match self.classify(&txn, record)? {
                Disposition::Apply => {
                    self.apply_to_target(&txn, source_schema, record)?;
                    batch_counts.applied += 1;
                }
                Disposition::Skip => batch_counts.skipped += 1,
                Disposition::Conflicted(conflict) => {
                    batch_counts.conflicted += 1;
                    let winner = conflict.winner();
                    batch_conflicts.push(conflict);
                    match winner {
                        Some(Winner::Source) => {
                            self.apply_to_target(&txn, source_schema, record)?;
                            batch_counts.applied += 1;
                        }
                        Some(Winner::Target) => batch_counts.skipped += 1,
                        None => {
                            halt = Some(SyncError::UnresolvedConflict {
                                table: record.table.clone(),
                                primary_key: record.primary_key.clone(),
                            });
                            break;
                        }
                    }
                }
            }
            committed_seq = record.seq;
        }

        Checkpoint::advance(&txn, &self.config.source, &self.config.target, committed_seq)?;
        self.set_state(RunState::Committed);
        txn.commit().map_err(StoreError::from)?;

        progress.counts.merge(batch_counts);
        progress.conflicts.append(&mut batch_conflicts);
        progress.checkpoint = committed_seq;

        match halt {
            Some(err) => Err(err),
            None => Ok(committed_seq),
        }
    }

    /// Decides what to do with one incoming record by consulting the
    /// target's latest change-log entry for the same (table, key).
    fn classify(&self, conn: &Connection, record: &ChangeRecord) -> SyncResult<Disposition> {
        let Some(latest) = ChangeLog::latest_for_key(conn, &record.table, &record.primary_key)?
        else {
            return Ok(Disposition::Apply);
        };

        if latest.payload_hash == record.payload_hash {
            // Already holds this exact version; replay is a no-op.
            return Ok(Disposition::Skip);
        }
        if latest.origin == record.origin {
            // The target holds an older version from the same origin,
            // not an independent edit.
            return Ok(Disposition::Apply);
        }

        let resolver = self
            .table_resolvers
            .get(&record.table)
            .unwrap_or(&self.default_resolver);
        let outcome = resolver.resolve(record, &latest);

        tracing::debug!(
            table = %record.table,
            key = %record.primary_key,
            strategy = resolver.kind().as_str(),
            resolved = outcome.resolution().is_some(),
            "conflict detected"
        );

        Ok(Disposition::Conflicted(Conflict::new(
            record.clone(),
            latest,
            outcome,
            time::now_ms(),
        )))
    }

    /// Applies a record to the target and mirrors it into the target's
    /// change log, preserving the record's origin for downstream echo
    /// suppression.
    fn apply_to_target(
        &self,
        conn: &Connection,
        source_schema: &SchemaFingerprint,
        record: &ChangeRecord,
    ) -> SyncResult<()> {
        let schema = source_schema.table(&record.table).ok_or_else(|| {
            StoreError::apply_failed(&record.table, "table is not governed by the source")
        })?;
        apply_record(conn, record, schema)?;
        ChangeLog::append(conn, record)?;
        Ok(())
    }

    fn open_with_retry(&self, name: &str) -> SyncResult<Store> {
        let mut attempt = 0;
        loop {
            match self
                .registry
                .open_with_timeout(name, self.config.connection_timeout)
            {
                Ok(store) => return Ok(store),
                Err(err) if err.is_retryable() && attempt < self.config.retry.limit => {
                    attempt += 1;
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        store = name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "store open failed, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Replays `CREATE TABLE` statements from the source for governed
    /// tables absent on the target. Runs before the schema check so a
    /// freshly provisioned target passes it.
    fn create_missing_tables(&self, source: &Store, target: &Store) -> SyncResult<()> {
        for table in source.governed_tables() {
            if table_create_sql(target.conn(), table)?.is_some() {
                continue;
            }
            let Some(sql) = table_create_sql(source.conn(), table)? else {
                continue;
            };
            tracing::info!(table, target = %self.config.target, "creating missing governed table");
            target.conn().execute_batch(&sql).map_err(StoreError::from)?;
        }
        Ok(())
    }

    fn set_state(&self, next: RunState) {
        *self.state.write() = next;
        tracing::trace!(state = ?next, source = %self.config.source, "run state");
    }
}
