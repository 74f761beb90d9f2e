//! Keyed row application: upserts and deletes against governed tables.
//!
//! Writes are keyed `INSERT OR REPLACE` / keyed deletes, never blind
//! appends, so applying an already-applied record is a no-op. This is
//! what makes batch replay after a crash safe.

use crate::error::{StoreError, StoreResult};
use crate::store::sanitize_identifier;
use driftsync_model::{ChangeRecord, OperationKind, TableSchema, KEY_SEPARATOR};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};

/// Converts a JSON payload field to a SQLite value.
///
/// Booleans map to 0/1, nested structures are stored as JSON text.
fn to_sql_value(value: &serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Upserts one row from its JSON snapshot.
pub fn upsert_row(conn: &Connection, table: &str, payload: &serde_json::Value) -> StoreResult<()> {
    let table = sanitize_identifier(table)?;
    let object = payload
        .as_object()
        .ok_or_else(|| StoreError::apply_failed(table, "payload is not a JSON object"))?;
    if object.is_empty() {
        return Err(StoreError::apply_failed(table, "payload has no columns"));
    }

    let mut columns = Vec::with_capacity(object.len());
    let mut values = Vec::with_capacity(object.len());
    for (column, value) in object {
        columns.push(format!("\"{}\"", sanitize_identifier(column)?));
        values.push(to_sql_value(value));
    }

    let placeholders = (1..=values.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT OR REPLACE INTO \"{table}\" ({}) VALUES ({placeholders})",
        columns.join(", ")
    );

    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

/// Deletes one row by its normalized primary-key value.
pub fn delete_row(
    conn: &Connection,
    table: &str,
    pk_columns: &[&str],
    key: &str,
) -> StoreResult<()> {
    let table = sanitize_identifier(table)?;
    if pk_columns.is_empty() {
        return Err(StoreError::MissingPrimaryKey {
            table: table.to_string(),
        });
    }

    let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    if parts.len() != pk_columns.len() {
        return Err(StoreError::apply_failed(
            table,
            format!(
                "key {key:?} has {} part(s), primary key has {} column(s)",
                parts.len(),
                pk_columns.len()
            ),
        ));
    }

    let mut clauses = Vec::with_capacity(pk_columns.len());
    for (i, column) in pk_columns.iter().enumerate() {
        clauses.push(format!("\"{}\" = ?{}", sanitize_identifier(column)?, i + 1));
    }
    let sql = format!("DELETE FROM \"{table}\" WHERE {}", clauses.join(" AND "));

    conn.execute(&sql, params_from_iter(parts.iter().map(|p| p.to_string())))?;
    Ok(())
}

/// Applies one change record to a governed table.
///
/// The table schema supplies the primary-key columns for deletes.
pub fn apply_record(
    conn: &Connection,
    record: &ChangeRecord,
    schema: &TableSchema,
) -> StoreResult<()> {
    match record.op {
        OperationKind::Insert | OperationKind::Update => {
            let payload = record.payload.as_ref().ok_or_else(|| {
                StoreError::apply_failed(&record.table, "non-delete record without payload")
            })?;
            upsert_row(conn, &record.table, payload)
        }
        OperationKind::Delete => {
            let pk_columns: Vec<&str> = schema
                .primary_key_columns()
                .map(|c| c.name.as_str())
                .collect();
            delete_row(conn, &record.table, &pk_columns, &record.primary_key)
        }
    }
}
