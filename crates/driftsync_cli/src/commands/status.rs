//! Status command implementation.

use crate::config::ConfigFile;
use driftsync_engine::StatusSnapshot;
use std::path::Path;

/// Runs the status command.
pub fn run(config_path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::load(config_path)?;
    let registry = config.registry();
    let pairs = config.pair_configs()?;
    let events = config.event_logger();

    let snapshot = StatusSnapshot::collect(&registry, events.as_ref(), &pairs, None);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Status at {} ms", snapshot.generated_at_ms);
    for pair in &snapshot.pairs {
        print!(
            "  {} -> {}  checkpoint={}",
            pair.source, pair.target, pair.checkpoint
        );
        if let Some(last_run) = &pair.last_run {
            print!(
                "  last run: {} ({} applied, {} conflicted)",
                if last_run.success { "ok" } else { "failed" },
                last_run.counts.applied,
                last_run.counts.conflicted
            );
        }
        if let Some(error) = &pair.error {
            print!("  error: {error}");
        }
        println!();
    }
    Ok(())
}
