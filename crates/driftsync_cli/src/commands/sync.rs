//! Sync command implementation.

use crate::config::ConfigFile;
use driftsync_engine::{Reconciler, SyncPairConfig};
use driftsync_model::PairStatus;
use std::path::Path;

/// Runs the sync command for one pair.
///
/// If the pair is declared in the configuration its settings apply;
/// otherwise a default last-write-wins pair is built from the two
/// store names.
pub fn run(
    config_path: &Path,
    source: &str,
    target: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::load(config_path)?;
    let registry = config.registry();

    let pair = config
        .pair_configs()?
        .into_iter()
        .find(|p| p.source == source && p.target == target)
        .unwrap_or_else(|| SyncPairConfig::new(source, target));

    let mut reconciler = Reconciler::new(&registry);
    if let Some(events) = config.event_logger() {
        reconciler = reconciler.with_event_logger(events);
    }

    let report = reconciler.run_pair(&pair);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} -> {}: applied checkpoint {} with {} conflict(s), {} unresolved",
            report.source, report.target, report.checkpoint, report.conflicts, report.unresolved
        );
        if let Some(error) = &report.error {
            println!("error: {error}");
        }
    }

    match report.status {
        PairStatus::Succeeded => Ok(()),
        _ => Err(report
            .error
            .clone()
            .unwrap_or_else(|| "sync failed".to_string())
            .into()),
    }
}
