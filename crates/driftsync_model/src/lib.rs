//! # DriftSync Model
//!
//! Data model types for DriftSync cross-store reconciliation.
//!
//! This crate provides:
//! - `ChangeRecord` for change-capture entries
//! - `SchemaFingerprint` and `SchemaDiff` for structural drift detection
//! - `Conflict` and `Resolution` for divergent-row handling
//! - `SyncRunResult` and `DriftReport` for run reporting
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod record;
mod report;
mod schema;
pub mod time;

pub use conflict::{Conflict, Resolution, ResolutionOutcome, StrategyKind, Winner};
pub use record::{normalize_key, payload_hash, ChangeRecord, OperationKind, KEY_SEPARATOR};
pub use report::{DriftReport, PairReport, PairStatus, RunCounts, SyncRunResult};
pub use schema::{ColumnDiff, ColumnDiffKind, ColumnInfo, SchemaDiff, SchemaFingerprint, TableSchema};
