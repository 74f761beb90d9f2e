//! Conflict detection and resolution outcomes.

use crate::record::ChangeRecord;
use serde::{Deserialize, Serialize};

/// Which side of a conflict wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// The source store's version is applied.
    Source,
    /// The target store's version is kept.
    Target,
}

impl Winner {
    /// Converts to the string stored in the analytics tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::Source => "source",
            Winner::Target => "target",
        }
    }
}

/// The strategy that produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Later timestamp wins, ties broken by source priority.
    LastWriteWins,
    /// Configured source priority decides regardless of timestamps.
    SourcePriority,
    /// A caller-supplied callback decided.
    Custom,
}

impl StrategyKind {
    /// Converts to the string stored in the analytics tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::LastWriteWins => "last_write_wins",
            StrategyKind::SourcePriority => "source_priority",
            StrategyKind::Custom => "custom",
        }
    }
}

/// A successful resolution of one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The winning side.
    pub winner: Winner,
    /// The strategy that decided.
    pub strategy: StrategyKind,
}

/// Outcome of running the resolver over one conflicting pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ResolutionOutcome {
    /// A winner was chosen.
    Resolved(Resolution),
    /// The resolver declined; the record is excluded from this run and
    /// retried on the next pass.
    Unresolved {
        /// Why resolution failed.
        reason: String,
    },
}

impl ResolutionOutcome {
    /// Returns the resolution, if one was reached.
    pub fn resolution(&self) -> Option<Resolution> {
        match self {
            ResolutionOutcome::Resolved(r) => Some(*r),
            ResolutionOutcome::Unresolved { .. } => None,
        }
    }
}

/// A detected divergence: the same (table, primary key) with different
/// payload hashes across the two stores of a sync run.
///
/// Conflicts are created transiently during a run and persisted only when
/// resolution logging is enabled; they are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Governed table.
    pub table: String,
    /// Normalized primary-key value.
    pub primary_key: String,
    /// The source store's competing record.
    pub source_record: ChangeRecord,
    /// The target store's competing record.
    pub target_record: ChangeRecord,
    /// How the conflict was (or was not) resolved.
    pub outcome: ResolutionOutcome,
    /// Unix epoch milliseconds at detection time.
    pub detected_at_ms: i64,
}

impl Conflict {
    /// Creates a conflict with its resolution outcome.
    pub fn new(
        source_record: ChangeRecord,
        target_record: ChangeRecord,
        outcome: ResolutionOutcome,
        detected_at_ms: i64,
    ) -> Self {
        Self {
            table: source_record.table.clone(),
            primary_key: source_record.primary_key.clone(),
            source_record,
            target_record,
            outcome,
            detected_at_ms,
        }
    }

    /// Returns true if a winner was chosen.
    pub fn is_resolved(&self) -> bool {
        matches!(self.outcome, ResolutionOutcome::Resolved(_))
    }

    /// Returns the winning side, if resolved.
    pub fn winner(&self) -> Option<Winner> {
        self.outcome.resolution().map(|r| r.winner)
    }

    /// Returns the winning record, if resolved.
    pub fn winning_record(&self) -> Option<&ChangeRecord> {
        match self.winner()? {
            Winner::Source => Some(&self.source_record),
            Winner::Target => Some(&self.target_record),
        }
    }
}
