//! Fan-out over all configured pairs, plus filesystem watching.

use crate::config::SyncPairConfig;
use crate::events::SyncEventLogger;
use crate::manager::SyncManager;
use driftsync_model::{time, DriftReport, PairReport, PairStatus};
use driftsync_store::StoreRegistry;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Runs every configured pair and aggregates the outcome into a
/// [`DriftReport`].
///
/// Pairs run on scoped threads, one per pair, with a per-target lock so
/// two pairs never write the same target concurrently. A failing pair
/// is isolated: it is reported and the remaining pairs still run.
pub struct Reconciler<'a> {
    registry: &'a StoreRegistry,
    events: Option<SyncEventLogger>,
    target_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    last_report: RwLock<Option<DriftReport>>,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler over a registry.
    pub fn new(registry: &'a StoreRegistry) -> Self {
        Self {
            registry,
            events: None,
            target_locks: Mutex::new(HashMap::new()),
            last_report: RwLock::new(None),
        }
    }

    /// Attaches an event logger; every run and (when enabled per pair)
    /// its conflicts are persisted.
    pub fn with_event_logger(mut self, events: SyncEventLogger) -> Self {
        self.events = Some(events);
        self
    }

    /// Runs one reconciliation pass over all pairs.
    pub fn run_all(&self, pairs: &[SyncPairConfig]) -> DriftReport {
        let slots: Mutex<Vec<Option<PairReport>>> =
            Mutex::new((0..pairs.len()).map(|_| None).collect());

        std::thread::scope(|scope| {
            for (index, pair) in pairs.iter().enumerate() {
                let slots = &slots;
                scope.spawn(move || {
                    let lock = self.target_lock(&pair.target);
                    let _guard = lock.lock();
                    let report = self.run_pair(pair);
                    slots.lock()[index] = Some(report);
                });
            }
        });

        let report = DriftReport {
            generated_at_ms: time::now_ms(),
            pairs: slots.into_inner().into_iter().flatten().collect(),
        };
        *self.last_report.write() = Some(report.clone());
        report
    }

    /// Runs a single pair and converts the outcome into a pair report.
    pub fn run_pair(&self, pair: &SyncPairConfig) -> PairReport {
        if self.registry.descriptor(&pair.source).is_none()
            || self.registry.descriptor(&pair.target).is_none()
        {
            tracing::warn!(
                source = %pair.source,
                target = %pair.target,
                "pair references an unregistered store, skipping"
            );
            return PairReport {
                source: pair.source.clone(),
                target: pair.target.clone(),
                status: PairStatus::Skipped,
                conflicts: 0,
                unresolved: 0,
                schema_drift: false,
                checkpoint: 0,
                error: Some("unregistered store".into()),
            };
        }

        let manager = SyncManager::new(self.registry, pair.clone());
        let outcome = manager.run();

        if let Some(events) = &self.events {
            events.record_run(&outcome.result);
            if pair.log_resolutions {
                events.record_conflicts(outcome.result.run_id, &outcome.conflicts);
            }
        }

        PairReport {
            source: pair.source.clone(),
            target: pair.target.clone(),
            status: if outcome.result.success {
                PairStatus::Succeeded
            } else {
                PairStatus::Failed
            },
            conflicts: outcome.result.counts.conflicted,
            unresolved: outcome.unresolved(),
            schema_drift: outcome.schema_drift,
            checkpoint: outcome.result.checkpoint,
            error: outcome.result.errors.first().cloned(),
        }
    }

    /// The report of the most recent pass, if any.
    pub fn last_report(&self) -> Option<DriftReport> {
        self.last_report.read().clone()
    }

    fn target_lock(&self, target: &str) -> Arc<Mutex<()>> {
        self.target_locks
            .lock()
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Polls store files for modification-time changes and invokes a
/// callback when any of them moves.
///
/// Polling, not OS notification: the stores are plain SQLite files that
/// may live on network mounts where inotify is unreliable.
pub struct Watcher {
    interval: Duration,
}

impl Watcher {
    /// Creates a watcher with the given poll interval.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Polls until `stop` is set, invoking `on_change` whenever any
    /// watched file's modification time changes.
    pub fn watch<F: FnMut()>(&self, paths: &[PathBuf], stop: &AtomicBool, mut on_change: F) {
        let mut last: Vec<Option<SystemTime>> = paths.iter().map(|p| mtime(p)).collect();

        while !stop.load(Ordering::SeqCst) {
            std::thread::sleep(self.interval);
            let current: Vec<Option<SystemTime>> = paths.iter().map(|p| mtime(p)).collect();
            if current != last {
                tracing::debug!("watched store files changed");
                on_change();
                last = current;
            }
        }
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_store::{ChangeLog, StoreDescriptor};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn registry_with(dir: &TempDir, names: &[&str]) -> StoreRegistry {
        let descriptors = names
            .iter()
            .map(|name| {
                StoreDescriptor::new(
                    *name,
                    dir.path().join(format!("{name}.db")),
                    vec!["sessions".into()],
                )
            })
            .collect();
        let registry = StoreRegistry::from_descriptors(descriptors);
        for name in names {
            let store = registry.open(name).unwrap();
            store
                .conn()
                .execute_batch("CREATE TABLE sessions (id INTEGER PRIMARY KEY, name TEXT);")
                .unwrap();
        }
        registry
    }

    fn seed(registry: &StoreRegistry, store_name: &str, rows: &[(i64, &str)]) {
        let mut store = registry.open(store_name).unwrap();
        let log = ChangeLog::new(store_name);
        for (id, name) in rows {
            log.record_insert(
                &mut store,
                "sessions",
                &id.to_string(),
                json!({"id": id, "name": name}),
            )
            .unwrap();
        }
    }

    #[test]
    fn pass_over_multiple_pairs() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&dir, &["production", "monitoring", "analytics"]);
        seed(&registry, "production", &[(1, "a")]);
        seed(&registry, "monitoring", &[(2, "b")]);

        let pairs = vec![
            SyncPairConfig::new("production", "analytics"),
            SyncPairConfig::new("monitoring", "analytics"),
        ];

        let reconciler = Reconciler::new(&registry);
        let report = reconciler.run_all(&pairs);

        assert_eq!(report.pairs.len(), 2);
        assert!(report.all_clean());
        assert_eq!(reconciler.last_report().unwrap(), report);

        let target = registry.open("analytics").unwrap();
        let rows: i64 = target
            .conn()
            .query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn failing_pair_is_isolated() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&dir, &["production", "analytics"]);
        seed(&registry, "production", &[(1, "a")]);

        let pairs = vec![
            SyncPairConfig::new("production", "analytics"),
            SyncPairConfig::new("ghost", "analytics"),
        ];

        let report = Reconciler::new(&registry).run_all(&pairs);

        assert_eq!(report.pairs.len(), 2);
        assert!(!report.all_clean());
        assert_eq!(report.behind().count(), 1);

        let good = report
            .pairs
            .iter()
            .find(|p| p.source == "production")
            .unwrap();
        assert_eq!(good.status, PairStatus::Succeeded);

        let bad = report.pairs.iter().find(|p| p.source == "ghost").unwrap();
        assert_eq!(bad.status, PairStatus::Skipped);
    }

    #[test]
    fn event_logger_receives_runs() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&dir, &["production", "analytics"]);
        seed(&registry, "production", &[(1, "a")]);

        let events = SyncEventLogger::new(StoreDescriptor::new(
            "events",
            dir.path().join("events.db"),
            vec![],
        ));
        let reconciler = Reconciler::new(&registry).with_event_logger(events.clone());
        reconciler.run_all(&[SyncPairConfig::new("production", "analytics")]);

        let latest = events
            .latest_for_pair("production", "analytics")
            .unwrap()
            .unwrap();
        assert!(latest.success);
        assert_eq!(latest.counts.applied, 1);
    }

    #[test]
    fn watcher_fires_on_mtime_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("watched.db");
        std::fs::write(&path, b"v1").unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let hits = Arc::new(AtomicUsize::new(0));

        let handle = {
            let stop = Arc::clone(&stop);
            let hits = Arc::clone(&hits);
            let paths = vec![path.clone()];
            std::thread::spawn(move || {
                Watcher::new(Duration::from_millis(5)).watch(&paths, &stop, || {
                    hits.fetch_add(1, Ordering::SeqCst);
                });
            })
        };

        // Coarse mtime resolution on some filesystems; wait before rewriting
        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(&path, b"v2 with different length").unwrap();

        for _ in 0..100 {
            if hits.load(Ordering::SeqCst) > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        stop.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(hits.load(Ordering::SeqCst) > 0);
    }
}
