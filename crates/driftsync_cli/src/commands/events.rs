//! Events command implementation.

use crate::config::ConfigFile;
use std::path::Path;

/// Runs the events command.
pub fn run(config_path: &Path, limit: usize, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::load(config_path)?;
    let events = config
        .event_logger()
        .ok_or("no analytics_store configured")?;

    let runs = events.recent(limit)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No recorded runs");
        return Ok(());
    }

    println!("Recent sync runs (newest first):");
    for run in &runs {
        print!(
            "  {}  {} -> {}  {}  applied={} skipped={} conflicted={} checkpoint={} ({} ms)",
            run.run_id,
            run.source,
            run.target,
            if run.success { "ok" } else { "FAILED" },
            run.counts.applied,
            run.counts.skipped,
            run.counts.conflicted,
            run.checkpoint,
            run.duration_ms()
        );
        if let Some(summary) = run.error_summary() {
            print!("  error: {summary}");
        }
        println!();
    }
    Ok(())
}
