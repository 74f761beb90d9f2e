//! CLI command implementations.

pub mod events;
pub mod reconcile;
pub mod status;
pub mod sync;
