//! # DriftSync Store
//!
//! SQLite store layer for DriftSync.
//!
//! This crate provides:
//! - `Store` and `StoreRegistry` for named, independently-owned databases
//! - Schema inspection and fingerprinting of governed tables
//! - The per-store change-capture log (append-only ledger)
//! - Checkpoint persistence per (source, target) pair
//! - Keyed upsert/delete row application
//!
//! Every mutation of a governed table must go through the change log's
//! `record_*` helpers (or append to the log inside the same transaction
//! as the row write); this is the sole contract external writers honor.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod change_log;
mod checkpoint;
mod error;
mod inspector;
mod store;

pub use apply::{apply_record, delete_row, upsert_row};
pub use change_log::ChangeLog;
pub use checkpoint::Checkpoint;
pub use error::{StoreError, StoreResult};
pub use inspector::{fingerprint, table_create_sql};
pub use store::{sanitize_identifier, Store, StoreDescriptor, StoreRegistry};
