//! # DriftSync Engine
//!
//! Sync runs, conflict resolution, and cross-store reconciliation.
//!
//! This crate provides:
//! - `SyncManager` for one directed (source -> target) run
//! - `ConflictResolver` with pluggable resolution strategies
//! - `Reconciler` for a full pass over all configured pairs
//! - `SyncEventLogger` for run and conflict history
//! - `Watcher` for modification-time based change polling
//!
//! Runs stream change records in batches; each batch commits together
//! with its checkpoint in one target transaction, so interrupted runs
//! resume exactly where the last committed batch ended.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod events;
mod manager;
mod reconciler;
mod resolver;
mod status;

pub use config::{RetryConfig, SyncPairConfig, DEFAULT_BATCH_SIZE, DEFAULT_CONNECTION_TIMEOUT};
pub use error::{SyncError, SyncResult};
pub use events::SyncEventLogger;
pub use manager::{RunOutcome, RunState, SyncManager};
pub use reconciler::{Reconciler, Watcher};
pub use resolver::{ConflictResolver, ConflictStrategy, CustomResolver};
pub use status::{PairStatusEntry, StatusSnapshot};
