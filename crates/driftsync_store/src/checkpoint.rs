//! Checkpoint persistence per (source, target) pair.
//!
//! Checkpoints live in the target store and are advanced inside the same
//! transaction as the batch they cover, so a committed batch and its
//! checkpoint are inseparable.

use crate::error::StoreResult;
use driftsync_model::time;
use rusqlite::{params, Connection, OptionalExtension};

/// Checkpoint table operations.
pub struct Checkpoint;

impl Checkpoint {
    /// Loads the checkpoint for a pair, or 0 if the pair has never synced.
    pub fn load(conn: &Connection, source: &str, target: &str) -> StoreResult<u64> {
        let seq: Option<i64> = conn
            .query_row(
                "SELECT seq FROM sync_checkpoints WHERE source = ?1 AND target = ?2",
                params![source, target],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq.unwrap_or(0) as u64)
    }

    /// Advances the checkpoint for a pair inside the caller's transaction.
    ///
    /// The update is monotonic: a smaller value never overwrites a larger
    /// one. Rolling a checkpoint back is a manual recovery procedure done
    /// directly against the table, never through this call.
    pub fn advance(conn: &Connection, source: &str, target: &str, seq: u64) -> StoreResult<()> {
        conn.execute(
            "INSERT INTO sync_checkpoints (source, target, seq, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (source, target) DO UPDATE SET
                 seq = MAX(seq, excluded.seq),
                 updated_at_ms = excluded.updated_at_ms",
            params![source, target, seq as i64, time::now_ms()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, StoreDescriptor};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> Store {
        let descriptor = StoreDescriptor::new("analytics", dir.path().join("analytics.db"), vec![]);
        Store::open(&descriptor).unwrap()
    }

    #[test]
    fn missing_checkpoint_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert_eq!(
            Checkpoint::load(store.conn(), "production", "analytics").unwrap(),
            0
        );
    }

    #[test]
    fn advance_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        Checkpoint::advance(store.conn(), "production", "analytics", 7).unwrap();
        assert_eq!(
            Checkpoint::load(store.conn(), "production", "analytics").unwrap(),
            7
        );

        Checkpoint::advance(store.conn(), "production", "analytics", 12).unwrap();
        assert_eq!(
            Checkpoint::load(store.conn(), "production", "analytics").unwrap(),
            12
        );
    }

    #[test]
    fn advance_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        Checkpoint::advance(store.conn(), "production", "analytics", 10).unwrap();
        Checkpoint::advance(store.conn(), "production", "analytics", 3).unwrap();

        assert_eq!(
            Checkpoint::load(store.conn(), "production", "analytics").unwrap(),
            10
        );
    }

    #[test]
    fn pairs_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        Checkpoint::advance(store.conn(), "production", "analytics", 5).unwrap();
        Checkpoint::advance(store.conn(), "monitoring", "analytics", 9).unwrap();

        assert_eq!(
            Checkpoint::load(store.conn(), "production", "analytics").unwrap(),
            5
        );
        assert_eq!(
            Checkpoint::load(store.conn(), "monitoring", "analytics").unwrap(),
            9
        );
    }
}
