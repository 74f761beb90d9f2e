//! Run results and aggregate drift reporting.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-run record counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Records applied to the target.
    pub applied: u64,
    /// Records skipped (target's version won, or no-op).
    pub skipped: u64,
    /// Records that conflicted with a divergent target version.
    pub conflicted: u64,
    /// Records that could not be applied.
    pub failed: u64,
}

impl RunCounts {
    /// Total records seen by the run.
    pub fn total(&self) -> u64 {
        self.applied + self.skipped + self.failed
    }

    /// Folds the counters of a committed batch into the run totals.
    pub fn merge(&mut self, other: RunCounts) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.conflicted += other.conflicted;
        self.failed += other.failed;
    }
}

/// Summary of one sync manager invocation. Immutable once created;
/// persisted to the shared analytics store by the event logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunResult {
    /// Unique run id.
    pub run_id: Uuid,
    /// Source store name.
    pub source: String,
    /// Target store name.
    pub target: String,
    /// Run start, unix epoch milliseconds.
    pub started_at_ms: i64,
    /// Run end, unix epoch milliseconds.
    pub finished_at_ms: i64,
    /// Record counters.
    pub counts: RunCounts,
    /// Errors captured during the run.
    pub errors: Vec<String>,
    /// Checkpoint value after the run.
    pub checkpoint: u64,
    /// True if the run reached its terminal success state.
    pub success: bool,
}

impl SyncRunResult {
    /// Run duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.finished_at_ms.saturating_sub(self.started_at_ms)
    }

    /// One-line error summary for the analytics row.
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// Final status of one pair within a reconciler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    /// The run reached its terminal success state.
    Succeeded,
    /// The run failed; the checkpoint stayed at its last committed value.
    Failed,
    /// The pair was skipped (store unhealthy or misconfigured).
    Skipped,
}

/// Per-pair entry in a drift report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    /// Source store name.
    pub source: String,
    /// Target store name.
    pub target: String,
    /// Final status.
    pub status: PairStatus,
    /// Conflicts detected during the pass.
    pub conflicts: u64,
    /// Conflicts left unresolved (block checkpoint advancement).
    pub unresolved: u64,
    /// True if structural drift was detected between the pair.
    pub schema_drift: bool,
    /// Checkpoint after the pass.
    pub checkpoint: u64,
    /// First error, when the pair failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PairReport {
    /// Returns true if the pair needs operator attention: it failed, has
    /// unresolved conflicts, or shows structural drift.
    pub fn is_behind(&self) -> bool {
        self.status != PairStatus::Succeeded || self.unresolved > 0 || self.schema_drift
    }
}

/// Aggregate outcome of one reconciler pass over all configured pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// When the pass finished, unix epoch milliseconds.
    pub generated_at_ms: i64,
    /// Per-pair outcomes.
    pub pairs: Vec<PairReport>,
}

impl DriftReport {
    /// Returns true if every pair succeeded with no drift.
    pub fn all_clean(&self) -> bool {
        self.pairs.iter().all(|p| !p.is_behind())
    }

    /// Pairs that need operator attention.
    pub fn behind(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|p| p.is_behind())
    }
}
