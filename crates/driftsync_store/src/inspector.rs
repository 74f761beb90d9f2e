//! Schema inspection of governed tables.

use crate::error::{StoreError, StoreResult};
use crate::store::{sanitize_identifier, Store};
use driftsync_model::{ColumnInfo, SchemaFingerprint, TableSchema};
use rusqlite::{Connection, OptionalExtension};

/// Reads the governed tables of a store and produces its normalized
/// schema fingerprint.
///
/// Fails with `SchemaUnavailable` if any governed table is missing
/// entirely. Read-only.
pub fn fingerprint(store: &Store) -> StoreResult<SchemaFingerprint> {
    let mut tables = Vec::with_capacity(store.governed_tables().len());

    for table in store.governed_tables() {
        let schema = table_schema(store.conn(), table)?.ok_or_else(|| {
            StoreError::schema_unavailable(
                store.name(),
                format!("governed table {table} is missing"),
            )
        })?;
        tables.push(schema);
    }

    Ok(SchemaFingerprint::new(store.name(), tables))
}

/// Reads one table's column layout via `PRAGMA table_info`.
///
/// Returns `None` if the table does not exist.
pub(crate) fn table_schema(conn: &Connection, table: &str) -> StoreResult<Option<TableSchema>> {
    let table = sanitize_identifier(table)?;

    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let decl_type: String = row.get(2)?;
            let not_null: i64 = row.get(3)?;
            let pk: i64 = row.get(5)?;
            Ok(ColumnInfo::new(name, decl_type, not_null != 0, pk > 0))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Ok(None);
    }
    Ok(Some(TableSchema::new(table, columns)))
}

/// Returns the original `CREATE TABLE` statement for a table, if present.
///
/// Used to replay missing governed tables onto a target when table
/// creation is enabled for a pair.
pub fn table_create_sql(conn: &Connection, table: &str) -> StoreResult<Option<String>> {
    let table = sanitize_identifier(table)?;
    let sql = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreDescriptor;
    use tempfile::TempDir;

    fn open_with_sessions(dir: &TempDir, name: &str) -> Store {
        let descriptor = StoreDescriptor::new(
            name,
            dir.path().join(format!("{name}.db")),
            vec!["sessions".into()],
        );
        let store = Store::open(&descriptor).unwrap();
        store
            .conn()
            .execute_batch(
                "CREATE TABLE sessions (
                     id INTEGER PRIMARY KEY,
                     name TEXT NOT NULL,
                     updated_at INTEGER
                 );",
            )
            .unwrap();
        store
    }

    #[test]
    fn fingerprint_reads_columns_in_order() {
        let dir = TempDir::new().unwrap();
        let store = open_with_sessions(&dir, "production");

        let fp = fingerprint(&store).unwrap();
        let table = fp.table("sessions").unwrap();

        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.columns[0].name, "id");
        assert!(table.columns[0].is_primary_key);
        assert_eq!(table.columns[0].decl_type, "INTEGER");
        assert_eq!(table.columns[1].name, "name");
        assert!(table.columns[1].not_null);
        assert!(!table.columns[2].not_null);
    }

    #[test]
    fn matching_stores_share_fingerprint_hash() {
        let dir = TempDir::new().unwrap();
        let a = open_with_sessions(&dir, "production");
        let b = open_with_sessions(&dir, "analytics");

        let fp_a = fingerprint(&a).unwrap();
        let fp_b = fingerprint(&b).unwrap();
        assert!(fp_a.matches(&fp_b));
    }

    #[test]
    fn missing_governed_table_is_schema_unavailable() {
        let dir = TempDir::new().unwrap();
        let descriptor = StoreDescriptor::new(
            "monitoring",
            dir.path().join("monitoring.db"),
            vec!["sessions".into()],
        );
        let store = Store::open(&descriptor).unwrap();

        assert!(matches!(
            fingerprint(&store),
            Err(StoreError::SchemaUnavailable { .. })
        ));
    }

    #[test]
    fn create_sql_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_with_sessions(&dir, "production");

        let sql = table_create_sql(store.conn(), "sessions").unwrap().unwrap();
        assert!(sql.to_uppercase().contains("CREATE TABLE"));

        assert!(table_create_sql(store.conn(), "absent").unwrap().is_none());
    }
}
