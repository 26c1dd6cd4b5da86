//! Configuration for a feedview process.
//!
//! Every section has defaults, so an empty YAML file (or no file at all)
//! yields a working configuration.
//!
//! ```yaml
//! storage:
//!   type: SlateDb
//!   path: sensors
//!   object_store:
//!     type: Local
//!     path: /var/lib/feedview
//! indexer:
//!   max_batch: 500
//! subscriptions:
//!   capacity: 1024
//! ```

use std::path::Path;
use std::time::Duration;

use common::StorageConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub indexer: IndexerConfig,
    pub subscriptions: SubscriptionConfig,
}

/// Controls how each view pulls and commits batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Most feed entries pulled per indexing cycle.
    pub max_batch: usize,

    /// Attempts per batch before a transient failure halts the view.
    pub max_attempts: u32,

    /// Pause between attempts of a failed batch.
    pub retry_backoff_ms: u64,

    /// Wait for each batch commit to be durable before publishing its
    /// events. Turning this off lets a crash replay a batch whose events
    /// were already published.
    pub await_durable: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_batch: 100,
            max_attempts: 5,
            retry_backoff_ms: 100,
            await_durable: true,
        }
    }
}

impl IndexerConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Events buffered per subscriber before new ones are dropped.
    pub capacity: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Reads a YAML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidInput(format!("failed to read config {}: {}", path.display(), e))
    })?;
    parse_config(&contents)
}

pub(crate) fn parse_config(contents: &str) -> Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)
        .map_err(|e| Error::InvalidInput(format!("failed to parse config: {}", e)))?;
    if config.indexer.max_batch == 0 {
        return Err(Error::InvalidInput(
            "indexer.max_batch must be at least 1".to_string(),
        ));
    }
    if config.indexer.max_attempts == 0 {
        return Err(Error::InvalidInput(
            "indexer.max_attempts must be at least 1".to_string(),
        ));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_every_section() {
        // given/when
        let config = parse_config("").unwrap();

        // then
        assert_eq!(config, Config::default());
        assert_eq!(config.indexer.max_batch, 100);
        assert_eq!(config.indexer.max_attempts, 5);
        assert_eq!(config.indexer.retry_backoff(), Duration::from_millis(100));
        assert!(config.indexer.await_durable);
        assert_eq!(config.subscriptions.capacity, 256);
    }

    #[test]
    fn should_fill_missing_fields_with_defaults() {
        // given
        let yaml = r#"
storage:
  type: InMemory
indexer:
  max_batch: 10
"#;

        // when
        let config = parse_config(yaml).unwrap();

        // then
        assert_eq!(config.storage, StorageConfig::InMemory);
        assert_eq!(config.indexer.max_batch, 10);
        assert_eq!(config.indexer.max_attempts, 5);
        assert!(config.indexer.await_durable);
        assert_eq!(config.subscriptions.capacity, 256);
    }

    #[test]
    fn should_reject_zero_batch_size() {
        // given
        let yaml = "indexer:\n  max_batch: 0\n";

        // when
        let result = parse_config(yaml);

        // then
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn should_report_unreadable_file() {
        let result = load_config("/nonexistent/feedview.yaml");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
