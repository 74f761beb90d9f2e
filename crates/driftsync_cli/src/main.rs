//! DriftSync CLI
//!
//! Command-line tools for cross-store reconciliation.
//!
//! # Commands
//!
//! - `reconcile` - Run one pass over all configured pairs (or watch)
//! - `sync` - Run a single source -> target pair
//! - `status` - Show checkpoints and run history per pair
//! - `events` - List recent sync runs from the analytics store

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// DriftSync command-line reconciliation tools.
#[derive(Parser)]
#[command(name = "driftsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(global = true, short, long, default_value = "driftsync.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass over all configured pairs
    Reconcile {
        /// Keep running: watch store files and re-run on change
        #[arg(short, long)]
        watch: bool,

        /// Poll interval in seconds when watching
        #[arg(short, long, default_value = "5")]
        interval: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a single source -> target pair
    Sync {
        /// Source store name
        source: String,

        /// Target store name
        target: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show checkpoints and run history per pair
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List recent sync runs from the analytics store
    Events {
        /// Maximum number of runs to list
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Reconcile {
            watch,
            interval,
            format,
        } => {
            commands::reconcile::run(&cli.config, watch, Duration::from_secs(interval), &format)?;
        }
        Commands::Sync {
            source,
            target,
            format,
        } => {
            commands::sync::run(&cli.config, &source, &target, &format)?;
        }
        Commands::Status { format } => {
            commands::status::run(&cli.config, &format)?;
        }
        Commands::Events { limit, format } => {
            commands::events::run(&cli.config, limit, &format)?;
        }
        Commands::Version => {
            println!("DriftSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
