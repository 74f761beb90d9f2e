//! TOML configuration: stores, pairs, and the analytics store.

use driftsync_engine::{ConflictStrategy, RetryConfig, SyncEventLogger, SyncPairConfig};
use driftsync_store::{StoreDescriptor, StoreRegistry};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading or interpreting a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path}: {source}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML.
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A pair references a store that is not declared.
    #[error("pair {source_store} -> {target} references undeclared store {missing}")]
    UndeclaredStore {
        /// Pair source.
        source_store: String,
        /// Pair target.
        target: String,
        /// The missing store name.
        missing: String,
    },

    /// An unknown strategy name.
    #[error("unknown strategy {0:?}; expected last_write_wins or source_priority")]
    UnknownStrategy(String),
}

/// One `[[stores]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Unique store name.
    pub name: String,
    /// Path to the SQLite file.
    pub path: PathBuf,
    /// Governed tables.
    #[serde(default)]
    pub tables: Vec<String>,
}

/// One `[[pairs]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    /// Source store name.
    pub source: String,
    /// Target store name.
    pub target: String,
    /// Strategy name: `last_write_wins` (default) or `source_priority`.
    /// Custom strategies are registered programmatically, not in TOML.
    #[serde(default)]
    pub strategy: Option<String>,
    /// Per-table strategy overrides.
    #[serde(default)]
    pub table_strategies: HashMap<String, String>,
    /// Store priority order for tie-breaking.
    #[serde(default)]
    pub priority: Vec<String>,
    /// Records per batch.
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Connection-failure retry limit.
    #[serde(default)]
    pub retry_limit: Option<u32>,
    /// Base backoff delay in seconds.
    #[serde(default)]
    pub retry_backoff_base_seconds: Option<u64>,
    /// Replay missing governed tables onto the target.
    #[serde(default)]
    pub create_missing_tables: bool,
    /// Persist conflict resolutions to the analytics store.
    #[serde(default)]
    pub log_resolutions: bool,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// All stores.
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
    /// All directed pairs.
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
    /// Name of the store that receives run and conflict history.
    #[serde(default)]
    pub analytics_store: Option<String>,
}

impl ConfigFile {
    /// Loads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ConfigFile = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for pair in &self.pairs {
            for name in [&pair.source, &pair.target] {
                if !self.stores.iter().any(|s| &s.name == name) {
                    return Err(ConfigError::UndeclaredStore {
                        source_store: pair.source.clone(),
                        target: pair.target.clone(),
                        missing: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Builds the store registry.
    pub fn registry(&self) -> StoreRegistry {
        StoreRegistry::from_descriptors(
            self.stores
                .iter()
                .map(|s| StoreDescriptor::new(s.name.clone(), s.path.clone(), s.tables.clone()))
                .collect(),
        )
    }

    /// Builds the engine pair configurations.
    pub fn pair_configs(&self) -> Result<Vec<SyncPairConfig>, ConfigError> {
        self.pairs.iter().map(|p| self.build_pair(p)).collect()
    }

    /// Builds the event logger, if an analytics store is configured.
    pub fn event_logger(&self) -> Option<SyncEventLogger> {
        let name = self.analytics_store.as_deref()?;
        let store = self.stores.iter().find(|s| s.name == name)?;
        Some(SyncEventLogger::new(StoreDescriptor::new(
            store.name.clone(),
            store.path.clone(),
            store.tables.clone(),
        )))
    }

    fn build_pair(&self, pair: &PairConfig) -> Result<SyncPairConfig, ConfigError> {
        let mut config = SyncPairConfig::new(&pair.source, &pair.target)
            .with_priority(pair.priority.clone())
            .with_create_missing_tables(pair.create_missing_tables)
            .with_resolution_logging(pair.log_resolutions);

        if let Some(name) = &pair.strategy {
            config = config.with_strategy(parse_strategy(name)?);
        }
        for (table, name) in &pair.table_strategies {
            config = config.with_table_strategy(table.clone(), parse_strategy(name)?);
        }
        if let Some(batch_size) = pair.batch_size {
            config = config.with_batch_size(batch_size);
        }

        let mut retry = RetryConfig::default();
        if let Some(limit) = pair.retry_limit {
            retry.limit = limit;
        }
        if let Some(seconds) = pair.retry_backoff_base_seconds {
            retry.backoff_base = Duration::from_secs(seconds);
        }
        Ok(config.with_retry(retry))
    }
}

fn parse_strategy(name: &str) -> Result<ConflictStrategy, ConfigError> {
    match name {
        "last_write_wins" => Ok(ConflictStrategy::LastWriteWins),
        "source_priority" => Ok(ConflictStrategy::SourcePriority),
        other => Err(ConfigError::UnknownStrategy(other.to_string())),
    }
}
