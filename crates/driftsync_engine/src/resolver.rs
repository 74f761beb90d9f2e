//! Deterministic conflict resolution.

use driftsync_model::{ChangeRecord, Resolution, ResolutionOutcome, StrategyKind, Winner};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied resolution callback.
///
/// Receives the source and target records and either picks a winner or
/// returns a reason for declining. A declined conflict is unresolved:
/// the run stops its checkpoint just before the record and retries it
/// on the next pass.
pub type CustomResolver =
    Arc<dyn Fn(&ChangeRecord, &ChangeRecord) -> Result<Winner, String> + Send + Sync>;

/// How a pair (or one table of a pair) resolves divergent records.
#[derive(Clone)]
pub enum ConflictStrategy {
    /// Later timestamp wins; ties fall back to source priority, then to
    /// lexicographic origin order.
    LastWriteWins,
    /// The configured priority order decides regardless of timestamps.
    SourcePriority,
    /// A caller-supplied callback decides.
    Custom(CustomResolver),
}

impl ConflictStrategy {
    /// The kind recorded in analytics rows.
    pub fn kind(&self) -> StrategyKind {
        match self {
            ConflictStrategy::LastWriteWins => StrategyKind::LastWriteWins,
            ConflictStrategy::SourcePriority => StrategyKind::SourcePriority,
            ConflictStrategy::Custom(_) => StrategyKind::Custom,
        }
    }
}

impl fmt::Debug for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().as_str())
    }
}

/// Resolves conflicts deterministically: the same two records always
/// produce the same outcome, so concurrent runs over the same pair
/// cannot disagree.
pub struct ConflictResolver {
    strategy: ConflictStrategy,
    priority: Vec<String>,
}

impl ConflictResolver {
    /// Creates a resolver with a strategy and a store priority order
    /// (first entry wins ties; unlisted stores rank last).
    pub fn new(strategy: ConflictStrategy, priority: Vec<String>) -> Self {
        Self { strategy, priority }
    }

    /// The strategy kind this resolver applies.
    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Resolves one conflicting pair of records.
    pub fn resolve(&self, source: &ChangeRecord, target: &ChangeRecord) -> ResolutionOutcome {
        match &self.strategy {
            ConflictStrategy::LastWriteWins => {
                let winner = match source.timestamp_ms.cmp(&target.timestamp_ms) {
                    Ordering::Greater => Winner::Source,
                    Ordering::Less => Winner::Target,
                    Ordering::Equal => self.priority_winner(source, target),
                };
                ResolutionOutcome::Resolved(Resolution {
                    winner,
                    strategy: StrategyKind::LastWriteWins,
                })
            }
            ConflictStrategy::SourcePriority => {
                let unranked = self.priority.len();
                if self.rank(&source.origin) == unranked && self.rank(&target.origin) == unranked {
                    return ResolutionOutcome::Unresolved {
                        reason: format!(
                            "neither origin {:?} nor {:?} appears in the priority order",
                            source.origin, target.origin
                        ),
                    };
                }
                ResolutionOutcome::Resolved(Resolution {
                    winner: self.priority_winner(source, target),
                    strategy: StrategyKind::SourcePriority,
                })
            }
            ConflictStrategy::Custom(callback) => match callback(source, target) {
                Ok(winner) => ResolutionOutcome::Resolved(Resolution {
                    winner,
                    strategy: StrategyKind::Custom,
                }),
                Err(reason) => ResolutionOutcome::Unresolved { reason },
            },
        }
    }

    /// Priority tie-break: lower rank wins, then lexicographic origin
    /// order. Total over all inputs, so resolution stays deterministic.
    fn priority_winner(&self, source: &ChangeRecord, target: &ChangeRecord) -> Winner {
        match self.rank(&source.origin).cmp(&self.rank(&target.origin)) {
            Ordering::Less => Winner::Source,
            Ordering::Greater => Winner::Target,
            Ordering::Equal => {
                if source.origin <= target.origin {
                    Winner::Source
                } else {
                    Winner::Target
                }
            }
        }
    }

    fn rank(&self, origin: &str) -> usize {
        self.priority
            .iter()
            .position(|name| name == origin)
            .unwrap_or(self.priority.len())
    }
}
