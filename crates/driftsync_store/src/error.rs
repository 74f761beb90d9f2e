//! Error types for the store layer.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the SQLite store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened or reached. Retryable with backoff.
    #[error("store unavailable: {name}: {message}")]
    ConnectionUnavailable {
        /// Store name.
        name: String,
        /// Underlying failure.
        message: String,
    },

    /// The store's schema could not be read, or a governed table is
    /// missing entirely. Fatal for this store's participation in sync.
    #[error("schema unavailable for store {store}: {message}")]
    SchemaUnavailable {
        /// Store name.
        store: String,
        /// What went wrong.
        message: String,
    },

    /// The change log's sequence numbers are inconsistent with known
    /// checkpoints. Fatal; requires a manual resync of the store.
    #[error("change log corruption in store {store}: {message}")]
    LogCorruption {
        /// Store name.
        store: String,
        /// Description of the inconsistency.
        message: String,
    },

    /// A table or column identifier failed validation.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A governed table has no usable primary key.
    #[error("table {table} has no primary key")]
    MissingPrimaryKey {
        /// The offending table.
        table: String,
    },

    /// A change record could not be applied to a governed table.
    #[error("cannot apply record to {table}: {message}")]
    ApplyFailed {
        /// The table the write targeted.
        table: String,
        /// What went wrong.
        message: String,
    },

    /// Underlying SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Payload (de)serialization error.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Creates a connection-unavailable error.
    pub fn connection_unavailable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionUnavailable {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a schema-unavailable error.
    pub fn schema_unavailable(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaUnavailable {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Creates a log-corruption error.
    pub fn log_corruption(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Creates an apply-failed error.
    pub fn apply_failed(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApplyFailed {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConnectionUnavailable { .. })
    }
}
