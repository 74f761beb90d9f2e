//! JSON-serializable status snapshots for operator tooling.

use crate::config::SyncPairConfig;
use crate::events::SyncEventLogger;
use driftsync_model::{time, DriftReport, SyncRunResult};
use driftsync_store::{Checkpoint, StoreRegistry};
use serde::Serialize;

/// Status of one configured pair.
#[derive(Debug, Clone, Serialize)]
pub struct PairStatusEntry {
    /// Source store name.
    pub source: String,
    /// Target store name.
    pub target: String,
    /// Last-known-healthy flags for both stores, if registered.
    pub source_healthy: Option<bool>,
    /// See `source_healthy`.
    pub target_healthy: Option<bool>,
    /// Committed checkpoint read from the target store.
    pub checkpoint: u64,
    /// Most recent recorded run, when an event logger is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<SyncRunResult>,
    /// Why status collection failed for this pair, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot of the whole subsystem at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// When the snapshot was taken, unix epoch milliseconds.
    pub generated_at_ms: i64,
    /// Per-pair status.
    pub pairs: Vec<PairStatusEntry>,
    /// Most recent drift report, if a pass has run in this process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftReport>,
}

impl StatusSnapshot {
    /// Collects status for every configured pair.
    ///
    /// Failures to reach a store are folded into that pair's entry so a
    /// single unreachable store never hides the others.
    pub fn collect(
        registry: &StoreRegistry,
        events: Option<&SyncEventLogger>,
        pairs: &[SyncPairConfig],
        drift: Option<DriftReport>,
    ) -> Self {
        let entries = pairs
            .iter()
            .map(|pair| collect_pair(registry, events, pair))
            .collect();

        Self {
            generated_at_ms: time::now_ms(),
            pairs: entries,
            drift,
        }
    }
}

fn collect_pair(
    registry: &StoreRegistry,
    events: Option<&SyncEventLogger>,
    pair: &SyncPairConfig,
) -> PairStatusEntry {
    let mut entry = PairStatusEntry {
        source: pair.source.clone(),
        target: pair.target.clone(),
        source_healthy: registry.is_healthy(&pair.source),
        target_healthy: registry.is_healthy(&pair.target),
        checkpoint: 0,
        last_run: None,
        error: None,
    };

    match registry.open(&pair.target) {
        Ok(target) => match Checkpoint::load(target.conn(), &pair.source, &pair.target) {
            Ok(checkpoint) => entry.checkpoint = checkpoint,
            Err(err) => entry.error = Some(err.to_string()),
        },
        Err(err) => entry.error = Some(err.to_string()),
    }

    if let Some(events) = events {
        match events.latest_for_pair(&pair.source, &pair.target) {
            Ok(last_run) => entry.last_run = last_run,
            Err(err) => {
                tracing::warn!(
                    source = %pair.source,
                    target = %pair.target,
                    error = %err,
                    "failed to read run history"
                );
            }
        }
    }

    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::SyncManager;
    use driftsync_store::{ChangeLog, StoreDescriptor};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn snapshot_reflects_checkpoints_and_failures() {
        let dir = TempDir::new().unwrap();
        let registry = StoreRegistry::from_descriptors(vec![
            StoreDescriptor::new(
                "production",
                dir.path().join("production.db"),
                vec!["sessions".into()],
            ),
            StoreDescriptor::new(
                "analytics",
                dir.path().join("analytics.db"),
                vec!["sessions".into()],
            ),
        ]);
        for name in ["production", "analytics"] {
            registry
                .open(name)
                .unwrap()
                .conn()
                .execute_batch("CREATE TABLE sessions (id INTEGER PRIMARY KEY, name TEXT);")
                .unwrap();
        }

        let mut production = registry.open("production").unwrap();
        ChangeLog::new("production")
            .record_insert(&mut production, "sessions", "1", json!({"id": 1, "name": "a"}))
            .unwrap();
        drop(production);

        SyncManager::new(&registry, SyncPairConfig::new("production", "analytics")).run();

        let pairs = vec![
            SyncPairConfig::new("production", "analytics"),
            SyncPairConfig::new("production", "ghost"),
        ];
        let snapshot = StatusSnapshot::collect(&registry, None, &pairs, None);

        assert_eq!(snapshot.pairs.len(), 2);
        assert_eq!(snapshot.pairs[0].checkpoint, 1);
        assert!(snapshot.pairs[0].error.is_none());
        assert!(snapshot.pairs[1].error.is_some());

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"checkpoint\":1"));
    }
}
