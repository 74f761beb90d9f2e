//! Error types for the sync engine.

use driftsync_model::SchemaDiff;
use driftsync_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Error from the store layer.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The two stores' schemas diverge in a way that makes sync
    /// impossible: a governed table missing on the target, or a
    /// mismatch on a primary-key column. Nothing is applied.
    #[error("schemas of {source_store} and {target} are incompatible")]
    SchemaIncompatible {
        /// Source store name.
        source_store: String,
        /// Target store name.
        target: String,
        /// The structural differences found.
        diff: Box<SchemaDiff>,
    },

    /// The resolver declined to pick a winner. The run commits what it
    /// applied before this record and stops; the checkpoint never moves
    /// past an unresolved conflict.
    #[error("unresolved conflict on table {table}, key {primary_key}")]
    UnresolvedConflict {
        /// Governed table.
        table: String,
        /// Normalized primary-key value.
        primary_key: String,
    },

    /// The run was cancelled. Observed at a batch boundary; all
    /// previously committed batches stay committed.
    #[error("sync run cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns true if retrying the run may succeed without operator
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let unavailable: SyncError =
            StoreError::connection_unavailable("production", "locked").into();
        assert!(unavailable.is_retryable());

        let conflict = SyncError::UnresolvedConflict {
            table: "sessions".into(),
            primary_key: "7".into(),
        };
        assert!(!conflict.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn display_names_the_key() {
        let err = SyncError::UnresolvedConflict {
            table: "sessions".into(),
            primary_key: "7".into(),
        };
        let text = err.to_string();
        assert!(text.contains("sessions"));
        assert!(text.contains('7'));
    }
}
