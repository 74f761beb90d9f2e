//! Store descriptors, connections, and the registry.

use crate::error::{StoreError, StoreResult};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Default busy timeout for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Validates a table or column identifier.
///
/// Only alphanumeric characters and underscores are allowed; this keeps
/// identifier interpolation into SQL safe.
pub fn sanitize_identifier(name: &str) -> StoreResult<&str> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Static description of one named store.
#[derive(Debug, Clone)]
pub struct StoreDescriptor {
    /// Unique store name.
    pub name: String,
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Governed tables tracked in the change log.
    pub governed_tables: Vec<String>,
}

impl StoreDescriptor {
    /// Creates a descriptor.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        governed_tables: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            governed_tables,
        }
    }
}

/// An open connection to one named store.
///
/// Opening sets WAL journal mode and a busy timeout, and ensures the
/// sync bookkeeping tables (change log, checkpoints) exist.
pub struct Store {
    name: String,
    governed_tables: Vec<String>,
    conn: Connection,
}

impl Store {
    /// Opens a store from its descriptor with the default timeout.
    pub fn open(descriptor: &StoreDescriptor) -> StoreResult<Self> {
        Self::open_with_timeout(descriptor, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens a store with an explicit busy timeout.
    pub fn open_with_timeout(
        descriptor: &StoreDescriptor,
        busy_timeout: Duration,
    ) -> StoreResult<Self> {
        for table in &descriptor.governed_tables {
            sanitize_identifier(table)?;
        }

        let conn = open_connection(&descriptor.name, &descriptor.path, busy_timeout)?;

        let store = Self {
            name: descriptor.name.clone(),
            governed_tables: descriptor.governed_tables.clone(),
            conn,
        };
        store.ensure_bookkeeping()?;
        Ok(store)
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Governed tables of this store.
    pub fn governed_tables(&self) -> &[String] {
        &self.governed_tables
    }

    /// Read access to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access, required to begin transactions.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Creates the change log and checkpoint tables if absent.
    fn ensure_bookkeeping(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS change_log (
                 seq INTEGER PRIMARY KEY AUTOINCREMENT,
                 table_name TEXT NOT NULL,
                 primary_key TEXT NOT NULL,
                 op TEXT NOT NULL,
                 payload TEXT,
                 payload_hash TEXT NOT NULL,
                 origin TEXT NOT NULL,
                 timestamp_ms INTEGER NOT NULL,
                 session_id TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_change_log_key
                 ON change_log (table_name, primary_key);
             CREATE TABLE IF NOT EXISTS sync_checkpoints (
                 source TEXT NOT NULL,
                 target TEXT NOT NULL,
                 seq INTEGER NOT NULL,
                 updated_at_ms INTEGER NOT NULL,
                 PRIMARY KEY (source, target)
             );",
        )?;
        Ok(())
    }
}

fn open_connection(name: &str, path: &Path, busy_timeout: Duration) -> StoreResult<Connection> {
    let map_err = |e: rusqlite::Error| StoreError::connection_unavailable(name, e.to_string());

    let conn = Connection::open(path).map_err(map_err)?;
    conn.busy_timeout(busy_timeout).map_err(map_err)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(map_err)?;
    conn.execute("PRAGMA foreign_keys=ON;", []).map_err(map_err)?;
    Ok(conn)
}

struct RegisteredStore {
    descriptor: StoreDescriptor,
    healthy: AtomicBool,
}

/// Registry of all configured stores.
///
/// Stores are registered at process start from static configuration and
/// never removed at runtime. Each store's last-known-healthy flag is
/// updated on every connection attempt.
#[derive(Default)]
pub struct StoreRegistry {
    stores: Vec<RegisteredStore>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from descriptors.
    pub fn from_descriptors(descriptors: Vec<StoreDescriptor>) -> Self {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor);
        }
        registry
    }

    /// Registers a store. Later registrations with the same name replace
    /// the descriptor (configuration reload).
    pub fn register(&mut self, descriptor: StoreDescriptor) {
        if let Some(existing) = self
            .stores
            .iter_mut()
            .find(|s| s.descriptor.name == descriptor.name)
        {
            existing.descriptor = descriptor;
        } else {
            self.stores.push(RegisteredStore {
                descriptor,
                healthy: AtomicBool::new(true),
            });
        }
    }

    /// Looks up a descriptor by name.
    pub fn descriptor(&self, name: &str) -> Option<&StoreDescriptor> {
        self.stores
            .iter()
            .find(|s| s.descriptor.name == name)
            .map(|s| &s.descriptor)
    }

    /// Names of all registered stores, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.descriptor.name.as_str()).collect()
    }

    /// Last-known-healthy flag for a store.
    pub fn is_healthy(&self, name: &str) -> Option<bool> {
        self.stores
            .iter()
            .find(|s| s.descriptor.name == name)
            .map(|s| s.healthy.load(Ordering::SeqCst))
    }

    /// Opens a store by name, updating its health flag.
    pub fn open(&self, name: &str) -> StoreResult<Store> {
        self.open_with_timeout(name, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens a store by name with an explicit busy timeout.
    pub fn open_with_timeout(&self, name: &str, busy_timeout: Duration) -> StoreResult<Store> {
        let entry = self
            .stores
            .iter()
            .find(|s| s.descriptor.name == name)
            .ok_or_else(|| {
                StoreError::connection_unavailable(name, "store is not registered")
            })?;

        match Store::open_with_timeout(&entry.descriptor, busy_timeout) {
            Ok(store) => {
                entry.healthy.store(true, Ordering::SeqCst);
                Ok(store)
            }
            Err(err) => {
                entry.healthy.store(false, Ordering::SeqCst);
                tracing::warn!(store = name, error = %err, "store connection failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(dir: &TempDir, name: &str) -> StoreDescriptor {
        StoreDescriptor::new(name, dir.path().join(format!("{name}.db")), vec![])
    }

    #[test]
    fn sanitize_accepts_plain_identifiers() {
        assert!(sanitize_identifier("sessions").is_ok());
        assert!(sanitize_identifier("audit_events_2024").is_ok());
    }

    #[test]
    fn sanitize_rejects_injection() {
        assert!(sanitize_identifier("sessions; DROP TABLE x").is_err());
        assert!(sanitize_identifier("\"quoted\"").is_err());
        assert!(sanitize_identifier("").is_err());
    }

    #[test]
    fn open_creates_bookkeeping_tables() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&descriptor(&dir, "production")).unwrap();

        let count: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('change_log', 'sync_checkpoints')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn open_rejects_bad_governed_table() {
        let dir = TempDir::new().unwrap();
        let mut descriptor = descriptor(&dir, "production");
        descriptor.governed_tables = vec!["bad name".into()];

        assert!(matches!(
            Store::open(&descriptor),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn registry_health_tracking() {
        let dir = TempDir::new().unwrap();
        let mut registry = StoreRegistry::new();
        registry.register(descriptor(&dir, "production"));

        assert_eq!(registry.is_healthy("production"), Some(true));
        assert!(registry.open("production").is_ok());
        assert_eq!(registry.is_healthy("production"), Some(true));

        // A directory path cannot be opened as a database file
        registry.register(StoreDescriptor::new(
            "broken",
            dir.path().to_path_buf(),
            vec![],
        ));
        assert!(registry.open("broken").is_err());
        assert_eq!(registry.is_healthy("broken"), Some(false));
    }

    #[test]
    fn registry_unknown_store() {
        let registry = StoreRegistry::new();
        assert!(matches!(
            registry.open("nope"),
            Err(StoreError::ConnectionUnavailable { .. })
        ));
        assert!(registry.descriptor("nope").is_none());
    }
}
