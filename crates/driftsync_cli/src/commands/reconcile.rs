//! Reconcile command implementation.

use crate::config::ConfigFile;
use driftsync_engine::{Reconciler, Watcher};
use driftsync_model::{DriftReport, PairStatus};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// Runs the reconcile command.
pub fn run(
    config_path: &Path,
    watch: bool,
    interval: Duration,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::load(config_path)?;
    let registry = config.registry();
    let pairs = config.pair_configs()?;
    if pairs.is_empty() {
        return Err("no pairs configured".into());
    }

    let mut reconciler = Reconciler::new(&registry);
    if let Some(events) = config.event_logger() {
        reconciler = reconciler.with_event_logger(events);
    }

    let report = reconciler.run_all(&pairs);
    print_report(&report, format)?;

    if watch {
        let paths: Vec<PathBuf> = config.stores.iter().map(|s| s.path.clone()).collect();
        println!(
            "watching {} store file(s), polling every {}s",
            paths.len(),
            interval.as_secs()
        );
        // Runs until the process is terminated
        let stop = AtomicBool::new(false);
        Watcher::new(interval).watch(&paths, &stop, || {
            let report = reconciler.run_all(&pairs);
            if let Err(err) = print_report(&report, format) {
                eprintln!("failed to print report: {err}");
            }
        });
        return Ok(());
    }

    if report.pairs.iter().any(|p| p.status == PairStatus::Failed) {
        return Err("one or more pairs failed".into());
    }
    Ok(())
}

fn print_report(report: &DriftReport, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Drift report (generated at {} ms)", report.generated_at_ms);
    for pair in &report.pairs {
        let status = match pair.status {
            PairStatus::Succeeded => "ok",
            PairStatus::Failed => "FAILED",
            PairStatus::Skipped => "skipped",
        };
        print!(
            "  {} -> {}  {}  conflicts={} unresolved={} checkpoint={}",
            pair.source, pair.target, status, pair.conflicts, pair.unresolved, pair.checkpoint
        );
        if pair.schema_drift {
            print!("  [schema drift]");
        }
        if let Some(error) = &pair.error {
            print!("  error: {error}");
        }
        println!();
    }
    println!();
    if report.all_clean() {
        println!("✓ All pairs clean");
    } else {
        println!("✗ {} pair(s) need attention", report.behind().count());
    }
    Ok(())
}
