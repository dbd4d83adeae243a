//! Batch orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for `max_workers`.
pub const MAX_WORKERS: usize = 1024;

/// How a run is split into batches and paced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per batch. Batches run strictly one after another.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Items of one batch processed concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Pause between two batches (milliseconds).
    #[serde(default = "default_inter_batch_delay")]
    pub inter_batch_delay_ms: u64,

    /// Extra attempts for an item that failed with a retryable error.
    #[serde(default = "default_max_item_retries")]
    pub max_item_retries: u32,
}

fn default_batch_size() -> usize {
    10
}

fn default_max_workers() -> usize {
    4
}

fn default_inter_batch_delay() -> u64 {
    1000
}

fn default_max_item_retries() -> u32 {
    2
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            inter_batch_delay_ms: default_inter_batch_delay(),
            max_item_retries: default_max_item_retries(),
        }
    }
}

impl BatchConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_inter_batch_delay_ms(mut self, delay_ms: u64) -> Self {
        self.inter_batch_delay_ms = delay_ms;
        self
    }

    pub fn with_max_item_retries(mut self, retries: u32) -> Self {
        self.max_item_retries = retries;
        self
    }

    /// Number of batches needed for `items` items.
    pub fn batch_count(&self, items: usize) -> usize {
        if self.batch_size == 0 {
            return 0;
        }
        items.div_ceil(self.batch_size)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.max_workers == 0 {
            return Err("max_workers must be at least 1".to_string());
        }
        if self.max_workers > MAX_WORKERS {
            return Err(format!("max_workers cannot exceed {}", MAX_WORKERS));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BatchConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.inter_batch_delay(), Duration::from_secs(1));
        assert_eq!(config.max_item_retries, 2);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            batch_size = 25
            max_item_retries = 0
        "#;
        let config: BatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.max_item_retries, 0);
    }

    #[test]
    fn test_batch_count() {
        let config = BatchConfig::default().with_batch_size(5);
        assert_eq!(config.batch_count(0), 0);
        assert_eq!(config.batch_count(10), 2);
        assert_eq!(config.batch_count(11), 3);
    }

    #[test]
    fn test_validate() {
        assert!(BatchConfig::default().validate().is_ok());
        assert!(BatchConfig::default().with_batch_size(0).validate().is_err());
        assert!(BatchConfig::default().with_max_workers(0).validate().is_err());
        assert!(BatchConfig::default().with_max_workers(MAX_WORKERS).validate().is_ok());
        assert!(BatchConfig::default()
            .with_max_workers(MAX_WORKERS + 1)
            .validate()
            .is_err());
    }
}
