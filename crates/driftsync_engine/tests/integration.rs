//! End-to-end runs over real SQLite files.

use driftsync_engine::{Reconciler, RetryConfig, SyncManager, SyncPairConfig};
use driftsync_model::ChangeRecord;
use driftsync_store::{ChangeLog, Checkpoint, Store, StoreDescriptor, StoreRegistry};
use serde_json::json;
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
            .execute_batch(
                "CREATE TABLE sessions (id INTEGER PRIMARY KEY, name TEXT, updated_at INTEGER);",
            )
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

/// Writes a row and its log entry with a caller-controlled timestamp,
/// the way a previous sync pass (or an external writer honoring the
/// log contract) would.
fn write_versioned(store: &mut Store, id: i64, name: &str, origin: &str, timestamp_ms: i64) {
    let record = ChangeRecord::update(
        "sessions",
        &id.to_string(),
        json!({"id": id, "name": name, "updated_at": timestamp_ms}),
        origin,
        timestamp_ms,
    );
    let txn = store.conn_mut().transaction().unwrap();
    driftsync_store::upsert_row(&txn, "sessions", record.payload.as_ref().unwrap()).unwrap();
    ChangeLog::append(&txn, &record).unwrap();
    txn.commit().unwrap();
}

fn session_name(registry: &StoreRegistry, store_name: &str, id: i64) -> String {
    let store = registry.open(store_name).unwrap();
    store
        .conn()
        .query_row("SELECT name FROM sessions WHERE id = ?1", [id], |r| {
            r.get(0)
        })
        .unwrap()
}

fn session_count(registry: &StoreRegistry, store_name: &str) -> i64 {
    let store = registry.open(store_name).unwrap();
    store
        .conn()
        .query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
        .unwrap()
}

#[test]
fn fresh_target_catches_up_in_batches() {
    let dir = TempDir::new().unwrap();
    let registry = registry_with(&dir, &["production", "analytics"]);
    seed(
        &registry,
        "production",
        &[(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")],
    );

    let config = SyncPairConfig::new("production", "analytics").with_batch_size(2);
    let outcome = SyncManager::new(&registry, config).run();

    assert!(outcome.result.success);
    assert_eq!(outcome.result.counts.applied, 5);
    assert_eq!(outcome.result.checkpoint, 5);
    assert_eq!(session_count(&registry, "analytics"), 5);

    // The target's log mirrors the records with their original origin
    let target = registry.open("analytics").unwrap();
    let mirrored = ChangeLog::read_since(target.conn(), "analytics", 0, 10).unwrap();
    assert_eq!(mirrored.len(), 5);
    assert!(mirrored.iter().all(|r| r.origin == "production"));
}

#[test]
fn divergent_edits_resolve_by_last_write() {
    let dir = TempDir::new().unwrap();
    let registry = registry_with(&dir, &["production", "analytics"]);

    // Both stores edited the same row independently; the source edit
    // is newer for id 1, the target edit is newer for id 2.
    {
        let mut source = registry.open("production").unwrap();
        write_versioned(&mut source, 1, "source-new", "production", 2_000);
        write_versioned(&mut source, 2, "source-old", "production", 1_000);
    }
    {
        let mut target = registry.open("analytics").unwrap();
        write_versioned(&mut target, 1, "target-old", "analytics", 1_000);
        write_versioned(&mut target, 2, "target-new", "analytics", 2_000);
    }

    let outcome =
        SyncManager::new(&registry, SyncPairConfig::new("production", "analytics")).run();

    assert!(outcome.result.success);
    assert_eq!(outcome.result.counts.conflicted, 2);
    assert_eq!(outcome.result.counts.applied, 1);
    assert_eq!(outcome.result.counts.skipped, 1);
    assert_eq!(outcome.unresolved(), 0);

    assert_eq!(session_name(&registry, "analytics", 1), "source-new");
    assert_eq!(session_name(&registry, "analytics", 2), "target-new");
}

#[test]
fn failed_batch_rolls_back_and_resumes_from_checkpoint() {
    let dir = TempDir::new().unwrap();
    let registry = registry_with(&dir, &["production", "analytics"]);
    seed(&registry, "production", &[(1, "a"), (2, "b"), (3, "c")]);

    // Make the second batch fail at the target
    registry
        .open("analytics")
        .unwrap()
        .conn()
        .execute_batch(
            "CREATE TRIGGER block_two BEFORE INSERT ON sessions
             WHEN NEW.id = 2
             BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
        )
        .unwrap();

    let config = SyncPairConfig::new("production", "analytics")
        .with_batch_size(1)
        .with_retry(RetryConfig::no_retry());
    let outcome = SyncManager::new(&registry, config.clone()).run();

    assert!(!outcome.result.success);
    assert_eq!(outcome.result.counts.applied, 1);
    assert_eq!(outcome.result.checkpoint, 1);
    assert_eq!(session_count(&registry, "analytics"), 1);

    let target = registry.open("analytics").unwrap();
    assert_eq!(
        Checkpoint::load(target.conn(), "production", "analytics").unwrap(),
        1
    );
    drop(target);

    // Clear the fault and rerun: the run resumes at record 2 and
    // applies nothing twice.
    registry
        .open("analytics")
        .unwrap()
        .conn()
        .execute_batch("DROP TRIGGER block_two;")
        .unwrap();

    let outcome = SyncManager::new(&registry, config).run();
    assert!(outcome.result.success);
    assert_eq!(outcome.result.counts.applied, 2);
    assert_eq!(outcome.result.checkpoint, 3);
    assert_eq!(session_count(&registry, "analytics"), 3);
}

#[test]
fn incompatible_schema_fails_without_touching_the_target() {
    let dir = TempDir::new().unwrap();
    let registry = registry_with(&dir, &["production"]);
    seed(&registry, "production", &[(1, "a")]);

    let mut registry = registry;
    registry.register(StoreDescriptor::new(
        "analytics",
        dir.path().join("analytics.db"),
        vec!["sessions".into()],
    ));
    registry
        .open("analytics")
        .unwrap()
        .conn()
        .execute_batch("CREATE TABLE sessions (id TEXT PRIMARY KEY, name TEXT);")
        .unwrap();

    let outcome =
        SyncManager::new(&registry, SyncPairConfig::new("production", "analytics")).run();

    assert!(!outcome.result.success);
    assert_eq!(outcome.result.counts.total(), 0);
    assert_eq!(outcome.result.checkpoint, 0);
    assert_eq!(session_count(&registry, "analytics"), 0);
    assert!(outcome.result.errors[0].contains("incompatible"));
}

#[test]
fn reconciler_pass_reports_drift_per_pair() {
    let dir = TempDir::new().unwrap();
    let registry = registry_with(&dir, &["production", "monitoring", "analytics"]);
    seed(&registry, "production", &[(1, "a"), (2, "b")]);
    seed(&registry, "monitoring", &[(3, "c")]);

    let pairs = vec![
        SyncPairConfig::new("production", "analytics"),
        SyncPairConfig::new("monitoring", "analytics"),
    ];
    let report = Reconciler::new(&registry).run_all(&pairs);

    assert!(report.all_clean());
    assert_eq!(session_count(&registry, "analytics"), 3);

    // Idempotent: a second pass changes nothing
    let report = Reconciler::new(&registry).run_all(&pairs);
    assert!(report.all_clean());
    assert_eq!(session_count(&registry, "analytics"), 3);
    assert!(report.pairs.iter().all(|p| p.conflicts == 0));
}
