//! Configuration management for the media streaming gateway

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Block size and fetch limits must be multiples of this
pub const BLOCK_ALIGNMENT: usize = 4 * 1024;

/// Largest transfer the remote API serves in one block fetch
pub const MAX_TRANSFER_SIZE: usize = 1024 * 1024;

/// Configuration for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Address the HTTP server binds to (default: 0.0.0.0:8080)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Size of each remote block fetch in bytes (default: 1MB)
    /// Must be a power of two between 4KB and 1MB
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Upper bound for the single fetch that serves a photo (default: 1MB)
    #[serde(default = "default_block_size")]
    pub photo_fetch_limit: usize,

    /// Timeout for a single block fetch in seconds (default: none)
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,

    /// Metadata cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Answer unsatisfiable ranges with 416 instead of 400 (default: false)
    #[serde(default)]
    pub range_not_satisfiable_416: bool,

    /// Directory holding one JSON peer snapshot per worker (optional)
    #[serde(default)]
    pub peer_directory_path: Option<String>,

    /// Remote API workers; at least one is required
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,

    /// Log filter used when RUST_LOG is not set (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Metadata cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Time-to-live of resolved metadata in seconds (default: 3600 = 1 hour)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of cached entries (default: unbounded)
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// Serve a resolution even when storing it in the cache fails (default: false)
    #[serde(default)]
    pub fail_open: bool,
}

/// One authenticated handle to the remote API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// Name used in logs and metrics
    pub name: String,

    /// Base URL of the remote bridge
    pub base_url: String,

    /// Bearer token of this worker's session
    pub token: String,

    /// Remote identity of the session; location handles are scoped to it
    pub identity: i64,
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_entries: None,
            fail_open: false,
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_block_size() -> usize {
    MAX_TRANSFER_SIZE
}

fn default_cache_ttl() -> u64 {
    3600 // 1 hour
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            listen_address: default_listen_address(),
            block_size: default_block_size(),
            photo_fetch_limit: default_block_size(),
            fetch_timeout_secs: None,
            cache: CacheConfig::default(),
            range_not_satisfiable_416: false,
            peer_directory_path: None,
            workers: Vec::new(),
            metrics_endpoint: None,
            log_level: default_log_level(),
        }
    }
}

impl StreamConfig {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Returns
    /// * `Ok(StreamConfig)` if loading and validation succeed
    /// * `Err(StreamError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            StreamError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: StreamConfig = serde_yaml::from_str(content).map_err(|e| {
            StreamError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - block_size must be a power of two between 4KB and 1MB
    /// - photo_fetch_limit must be a multiple of 4KB, at most 1MB
    /// - cache.ttl_secs must be > 0
    /// - fetch_timeout_secs, when set, must be > 0
    /// - at least one worker, with unique names and non-empty base URLs
    pub fn validate(&self) -> Result<()> {
        if self.block_size < BLOCK_ALIGNMENT
            || self.block_size > MAX_TRANSFER_SIZE
            || !self.block_size.is_power_of_two()
        {
            return Err(StreamError::ConfigError(format!(
                "block_size must be a power of two between {}KB and {}KB, got {} bytes",
                BLOCK_ALIGNMENT / 1024,
                MAX_TRANSFER_SIZE / 1024,
                self.block_size
            )));
        }

        if self.photo_fetch_limit == 0
            || self.photo_fetch_limit > MAX_TRANSFER_SIZE
            || self.photo_fetch_limit % BLOCK_ALIGNMENT != 0
        {
            return Err(StreamError::ConfigError(format!(
                "photo_fetch_limit must be a multiple of {}KB up to {}KB, got {} bytes",
                BLOCK_ALIGNMENT / 1024,
                MAX_TRANSFER_SIZE / 1024,
                self.photo_fetch_limit
            )));
        }

        if self.cache.ttl_secs == 0 {
            return Err(StreamError::ConfigError(
                "cache.ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.cache.max_entries == Some(0) {
            return Err(StreamError::ConfigError(
                "cache.max_entries must be greater than 0 when set".to_string(),
            ));
        }

        if self.fetch_timeout_secs == Some(0) {
            return Err(StreamError::ConfigError(
                "fetch_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        if self.workers.is_empty() {
            return Err(StreamError::ConfigError(
                "at least one worker must be configured".to_string(),
            ));
        }

        for (i, worker) in self.workers.iter().enumerate() {
            if worker.base_url.is_empty() {
                return Err(StreamError::ConfigError(format!(
                    "worker '{}' has an empty base_url",
                    worker.name
                )));
            }
            if self.workers[..i].iter().any(|other| other.name == worker.name) {
                return Err(StreamError::ConfigError(format!(
                    "duplicate worker name '{}'",
                    worker.name
                )));
            }
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(name: &str) -> WorkerConfig {
        WorkerConfig {
            name: name.to_string(),
            base_url: "http://bridge.local".to_string(),
            token: "secret".to_string(),
            identity: 777,
        }
    }

    fn valid_config() -> StreamConfig {
        StreamConfig {
            workers: vec![worker("primary")],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.block_size, 1024 * 1024);
        assert_eq!(config.photo_fetch_limit, 1024 * 1024);
        assert_eq!(config.cache.ttl_secs, 3600);
        assert!(!config.cache.fail_open);
        assert!(!config.range_not_satisfiable_416);
        assert_eq!(config.listen_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_workers() {
        let config = StreamConfig::default();
        assert!(matches!(config.validate(), Err(StreamError::ConfigError(_))));
    }

    #[test]
    fn test_validate_block_size() {
        let mut config = valid_config();
        config.block_size = 2048; // below alignment
        assert!(config.validate().is_err());

        config.block_size = 2 * 1024 * 1024; // above transfer limit
        assert!(config.validate().is_err());

        config.block_size = 12 * 1024; // not a power of two
        assert!(config.validate().is_err());

        config.block_size = 64 * 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_photo_fetch_limit() {
        let mut config = valid_config();
        config.photo_fetch_limit = 5000;
        assert!(config.validate().is_err());

        config.photo_fetch_limit = 512 * 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_cache_ttl() {
        let mut config = valid_config();
        config.cache.ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_worker_names() {
        let mut config = valid_config();
        config.workers.push(worker("primary"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
listen_address: "127.0.0.1:9000"
block_size: 524288
fetch_timeout_secs: 15
cache:
  ttl_secs: 600
  fail_open: true
range_not_satisfiable_416: true
workers:
  - name: w1
    base_url: "http://bridge-1:8081"
    token: "abc"
    identity: 1001
  - name: w2
    base_url: "http://bridge-2:8081"
    token: "def"
    identity: 1002
"#;
        let config = StreamConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert_eq!(config.block_size, 512 * 1024);
        assert_eq!(config.fetch_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.cache_ttl(), Duration::from_secs(600));
        assert!(config.cache.fail_open);
        assert!(config.range_not_satisfiable_416);
        assert_eq!(config.workers.len(), 2);
        assert_eq!(config.workers[1].identity, 1002);
        // Unset values fall back to defaults
        assert_eq!(config.photo_fetch_limit, 1024 * 1024);
    }

    #[test]
    fn test_from_yaml_invalid() {
        assert!(StreamConfig::from_yaml("block_size: [").is_err());
    }
}
