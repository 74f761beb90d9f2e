//! Per-pair sync configuration.

use crate::resolver::ConflictStrategy;
use std::collections::HashMap;
use std::time::Duration;

/// Default number of change records streamed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default busy timeout when opening the pair's stores.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry policy for transient store-open failures.
///
/// Only connection failures are retried; schema incompatibility, log
/// corruption, and unresolved conflicts always surface immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub limit: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub backoff_base: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            limit: 3,
            backoff_base: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            limit: 0,
            ..Self::default()
        }
    }

    /// Delay before the given retry attempt (1-based). Attempt 0 has no
    /// delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(16);
        let delay = self.backoff_base.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}

/// Configuration of one directed sync pair (source -> target).
#[derive(Debug, Clone)]
pub struct SyncPairConfig {
    /// Source store name.
    pub source: String,
    /// Target store name.
    pub target: String,
    /// Default conflict strategy for the pair.
    pub strategy: ConflictStrategy,
    /// Per-table strategy overrides.
    pub table_strategies: HashMap<String, ConflictStrategy>,
    /// Store names in priority order (first wins ties).
    pub priority: Vec<String>,
    /// Records streamed per batch transaction.
    pub batch_size: usize,
    /// Retry policy for store-open failures.
    pub retry: RetryConfig,
    /// Busy timeout for both stores' connections.
    pub connection_timeout: Duration,
    /// Replay missing governed tables onto the target before the
    /// schema check.
    pub create_missing_tables: bool,
    /// Persist every detected conflict to the analytics store.
    pub log_resolutions: bool,
}

impl SyncPairConfig {
    /// Creates a pair with defaults: last-write-wins, batches of
    /// [`DEFAULT_BATCH_SIZE`], the default retry policy.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            strategy: ConflictStrategy::LastWriteWins,
            table_strategies: HashMap::new(),
            priority: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryConfig::default(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            create_missing_tables: false,
            log_resolutions: false,
        }
    }

    /// Sets the default conflict strategy.
    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Overrides the strategy for one governed table.
    pub fn with_table_strategy(
        mut self,
        table: impl Into<String>,
        strategy: ConflictStrategy,
    ) -> Self {
        self.table_strategies.insert(table.into(), strategy);
        self
    }

    /// Sets the store priority order used for tie-breaking and the
    /// source-priority strategy.
    pub fn with_priority(mut self, priority: Vec<String>) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the batch size. Values below 1 are clamped to 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the connection busy timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Enables replaying missing governed tables onto the target.
    pub fn with_create_missing_tables(mut self, enabled: bool) -> Self {
        self.create_missing_tables = enabled;
        self
    }

    /// Enables persisting conflict resolutions to the analytics store.
    pub fn with_resolution_logging(mut self, enabled: bool) -> Self {
        self.log_resolutions = enabled;
        self
    }
}
