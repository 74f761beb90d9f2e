//! Change-capture records.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of mutation recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Row was inserted.
    Insert,
    /// Row was updated.
    Update,
    /// Row was deleted.
    Delete,
}

impl OperationKind {
    /// Converts to the string stored in the change log.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// Converts from the stored string.
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "insert" => Some(OperationKind::Insert),
            "update" => Some(OperationKind::Update),
            "delete" => Some(OperationKind::Delete),
            _ => None,
        }
    }
}

/// Separator used when normalizing composite primary-key values.
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Normalizes primary-key value parts into the string form stored in the
/// change log. Single-column keys pass through unchanged.
pub fn normalize_key<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(KEY_SEPARATOR);
        }
        out.push_str(part.as_ref());
    }
    out
}

/// Computes the canonical hash of a row payload.
///
/// The payload is a JSON object snapshot of the row. `serde_json` maps are
/// key-ordered, so serializing and hashing the text form is stable across
/// processes.
pub fn payload_hash(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex_string(&hasher.finalize())
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// A single logged mutation in a store's change-capture log.
///
/// # Invariants
///
/// - `seq` is strictly increasing per store and never reused
/// - A record is immutable once written
/// - `payload` is the row snapshot after the operation; absent for deletes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Sequence number, monotonic per store. The checkpoint unit.
    pub seq: u64,
    /// Governed table the mutation touched.
    pub table: String,
    /// Normalized primary-key value.
    pub primary_key: String,
    /// Operation kind.
    pub op: OperationKind,
    /// Row snapshot after the operation. `None` for deletes.
    pub payload: Option<serde_json::Value>,
    /// Canonical hash of the payload.
    pub payload_hash: String,
    /// Name of the store that originated the mutation.
    pub origin: String,
    /// Unix epoch milliseconds at which the mutation was logged.
    pub timestamp_ms: i64,
    /// Originating session id, when known.
    pub session_id: Option<String>,
}

impl ChangeRecord {
    /// Creates an insert record. The sequence number is assigned on append.
    pub fn insert(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        payload: serde_json::Value,
        origin: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        let hash = payload_hash(&payload);
        Self {
            seq: 0,
            table: table.into(),
            primary_key: primary_key.into(),
            op: OperationKind::Insert,
            payload: Some(payload),
            payload_hash: hash,
            origin: origin.into(),
            timestamp_ms,
            session_id: None,
        }
    }

    /// Creates an update record.
    pub fn update(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        payload: serde_json::Value,
        origin: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        let hash = payload_hash(&payload);
        Self {
            seq: 0,
            table: table.into(),
            primary_key: primary_key.into(),
            op: OperationKind::Update,
            payload: Some(payload),
            payload_hash: hash,
            origin: origin.into(),
            timestamp_ms,
            session_id: None,
        }
    }

    /// Creates a delete record. Deletes carry no payload; their hash is
    /// the canonical hash of JSON null so divergence checks stay uniform.
    pub fn delete(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        origin: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            seq: 0,
            table: table.into(),
            primary_key: primary_key.into(),
            op: OperationKind::Delete,
            payload: None,
            payload_hash: payload_hash(&serde_json::Value::Null),
            origin: origin.into(),
            timestamp_ms,
            session_id: None,
        }
    }

    /// Sets the originating session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Returns true if this record removes the row.
    pub fn is_delete(&self) -> bool {
        self.op == OperationKind::Delete
    }

    /// Returns true if `other` holds a divergent version of the same row.
    pub fn diverges_from(&self, other: &ChangeRecord) -> bool {
        self.table == other.table
            && self.primary_key == other.primary_key
            && self.payload_hash != other.payload_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_kind_strings() {
        assert_eq!(OperationKind::Insert.as_str(), "insert");
        assert_eq!(OperationKind::from_str("update"), Some(OperationKind::Update));
        assert_eq!(OperationKind::from_str("upsert"), None);
    }

    #[test]
    fn payload_hash_is_stable() {
        let a = json!({"id": 1, "name": "alpha"});
        let b = json!({"name": "alpha", "id": 1});

        // serde_json maps are key-ordered, so field order does not matter
        assert_eq!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn payload_hash_detects_changes() {
        let a = json!({"id": 1, "name": "alpha"});
        let b = json!({"id": 1, "name": "beta"});
        assert_ne!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn insert_record_carries_payload() {
        let record = ChangeRecord::insert("sessions", "42", json!({"id": 42}), "production", 1_000);

        assert_eq!(record.op, OperationKind::Insert);
        assert_eq!(record.payload, Some(json!({"id": 42})));
        assert_eq!(record.payload_hash, payload_hash(&json!({"id": 42})));
        assert!(!record.is_delete());
    }

    #[test]
    fn delete_record_has_no_payload() {
        let record = ChangeRecord::delete("sessions", "42", "production", 1_000);

        assert!(record.is_delete());
        assert!(record.payload.is_none());
        assert_eq!(record.payload_hash, payload_hash(&serde_json::Value::Null));
    }

    #[test]
    fn divergence_requires_same_key() {
        let a = ChangeRecord::insert("sessions", "1", json!({"v": 1}), "production", 1);
        let b = ChangeRecord::insert("sessions", "1", json!({"v": 2}), "analytics", 2);
        let c = ChangeRecord::insert("sessions", "2", json!({"v": 2}), "analytics", 2);

        assert!(a.diverges_from(&b));
        assert!(!a.diverges_from(&c));
        assert!(!a.diverges_from(&a.clone()));
    }

    #[test]
    fn session_id_builder() {
        let record = ChangeRecord::delete("sessions", "1", "production", 1).with_session("sess-9");
        assert_eq!(record.session_id.as_deref(), Some("sess-9"));
    }

    proptest::proptest! {
        #[test]
        fn normalized_keys_split_back_into_parts(
            parts in proptest::collection::vec("[a-z0-9]{1,6}", 1..4),
        ) {
            let key = normalize_key(&parts);
            let split: Vec<&str> = key.split(KEY_SEPARATOR).collect();
            let expected: Vec<&str> = parts.iter().map(String::as_str).collect();
            proptest::prop_assert_eq!(split, expected);
        }

        #[test]
        fn equal_payloads_share_a_hash(id in 0i64..10_000, name in "[a-z]{1,12}") {
            let a = json!({"id": id, "name": name.clone()});
            let b = json!({"name": name, "id": id});
            proptest::prop_assert_eq!(payload_hash(&a), payload_hash(&b));
        }
    }
}
