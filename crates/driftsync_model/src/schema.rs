//! Schema fingerprints and structural drift detection.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One column of a governed table, as declared in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type, normalized to uppercase.
    pub decl_type: String,
    /// True if the column is declared NOT NULL.
    pub not_null: bool,
    /// True if the column participates in the primary key.
    pub is_primary_key: bool,
}

impl ColumnInfo {
    /// Creates a column description, normalizing the declared type.
    pub fn new(
        name: impl Into<String>,
        decl_type: impl AsRef<str>,
        not_null: bool,
        is_primary_key: bool,
    ) -> Self {
        Self {
            name: name.into(),
            decl_type: decl_type.as_ref().trim().to_uppercase(),
            not_null,
            is_primary_key,
        }
    }
}

/// The ordered column layout of one governed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    /// Creates a table schema.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Returns the primary-key columns in declaration order.
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A normalized schema fingerprint for one store's governed tables.
///
/// Two stores that are supposed to share a table shape produce equal
/// fingerprint hashes; any structural divergence changes the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFingerprint {
    /// Name of the store the fingerprint was taken from.
    pub store: String,
    /// Governed tables, sorted by name.
    pub tables: Vec<TableSchema>,
    /// Stable hash over the normalized structure.
    pub hash: String,
}

impl SchemaFingerprint {
    /// Creates a fingerprint, sorting tables and computing the stable hash.
    pub fn new(store: impl Into<String>, mut tables: Vec<TableSchema>) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));

        let mut hasher = Sha256::new();
        for table in &tables {
            hasher.update(table.name.as_bytes());
            hasher.update(b"\n");
            for column in &table.columns {
                hasher.update(column.name.as_bytes());
                hasher.update(b"|");
                hasher.update(column.decl_type.as_bytes());
                hasher.update(b"|");
                hasher.update([u8::from(column.not_null), u8::from(column.is_primary_key)]);
                hasher.update(b"\n");
            }
            hasher.update(b"--\n");
        }

        let digest = hasher.finalize();
        let mut hash = String::with_capacity(64);
        for b in digest {
            hash.push_str(&format!("{b:02x}"));
        }

        Self {
            store: store.into(),
            tables,
            hash,
        }
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Returns true if both fingerprints describe the same structure.
    pub fn matches(&self, other: &SchemaFingerprint) -> bool {
        self.hash == other.hash
    }

    /// Compares this fingerprint (source) against another (target).
    pub fn diff(&self, target: &SchemaFingerprint) -> SchemaDiff {
        let mut missing_in_source = Vec::new();
        let mut missing_in_target = Vec::new();
        let mut column_diffs = Vec::new();

        for table in &self.tables {
            match target.table(&table.name) {
                None => missing_in_target.push(table.name.clone()),
                Some(other) => diff_columns(table, other, &mut column_diffs),
            }
        }

        for table in &target.tables {
            if self.table(&table.name).is_none() {
                missing_in_source.push(table.name.clone());
            }
        }

        SchemaDiff {
            source: self.store.clone(),
            target: target.store.clone(),
            missing_in_source,
            missing_in_target,
            column_diffs,
        }
    }
}

fn diff_columns(source: &TableSchema, target: &TableSchema, out: &mut Vec<ColumnDiff>) {
    for column in &source.columns {
        match target.column(&column.name) {
            None => out.push(ColumnDiff {
                table: source.name.clone(),
                column: column.name.clone(),
                on_primary_key: column.is_primary_key,
                kind: ColumnDiffKind::MissingInTarget,
            }),
            Some(other) => {
                if column.decl_type != other.decl_type {
                    out.push(ColumnDiff {
                        table: source.name.clone(),
                        column: column.name.clone(),
                        on_primary_key: column.is_primary_key || other.is_primary_key,
                        kind: ColumnDiffKind::TypeMismatch {
                            source: column.decl_type.clone(),
                            target: other.decl_type.clone(),
                        },
                    });
                }
                if column.is_primary_key != other.is_primary_key {
                    out.push(ColumnDiff {
                        table: source.name.clone(),
                        column: column.name.clone(),
                        on_primary_key: true,
                        kind: ColumnDiffKind::PrimaryKeyMismatch,
                    });
                }
                if column.not_null != other.not_null {
                    out.push(ColumnDiff {
                        table: source.name.clone(),
                        column: column.name.clone(),
                        on_primary_key: column.is_primary_key,
                        kind: ColumnDiffKind::NullabilityMismatch,
                    });
                }
            }
        }
    }

    for column in &target.columns {
        if source.column(&column.name).is_none() {
            out.push(ColumnDiff {
                table: source.name.clone(),
                column: column.name.clone(),
                on_primary_key: column.is_primary_key,
                kind: ColumnDiffKind::MissingInSource,
            });
        }
    }
}

/// Kind of column-level difference between two table shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDiffKind {
    /// Column exists on the target but not the source.
    MissingInSource,
    /// Column exists on the source but not the target.
    MissingInTarget,
    /// Declared types differ.
    TypeMismatch {
        /// Declared type on the source.
        source: String,
        /// Declared type on the target.
        target: String,
    },
    /// Primary-key membership differs.
    PrimaryKeyMismatch,
    /// NOT NULL constraint differs.
    NullabilityMismatch,
}

/// One column-level difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDiff {
    /// Table the difference was found in.
    pub table: String,
    /// Column name.
    pub column: String,
    /// True if the difference touches a primary-key column.
    pub on_primary_key: bool,
    /// The kind of difference.
    pub kind: ColumnDiffKind,
}

/// Structural differences between a source and a target fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiff {
    /// Source store name.
    pub source: String,
    /// Target store name.
    pub target: String,
    /// Governed tables present only on the target.
    pub missing_in_source: Vec<String>,
    /// Governed tables present only on the source.
    pub missing_in_target: Vec<String>,
    /// Column-level differences on shared tables.
    pub column_diffs: Vec<ColumnDiff>,
}

impl SchemaDiff {
    /// Returns true if the two structures are identical.
    pub fn is_empty(&self) -> bool {
        self.missing_in_source.is_empty()
            && self.missing_in_target.is_empty()
            && self.column_diffs.is_empty()
    }

    /// Returns true if the difference makes sync impossible: a governed
    /// table missing on the target, or a mismatch on a primary-key column.
    pub fn is_incompatible(&self) -> bool {
        !self.missing_in_target.is_empty()
            || self.column_diffs.iter().any(|d| {
                d.on_primary_key
                    && matches!(
                        d.kind,
                        ColumnDiffKind::TypeMismatch { .. }
                            | ColumnDiffKind::PrimaryKeyMismatch
                            | ColumnDiffKind::MissingInTarget
                    )
            })
    }
}
