//! Log storage configuration.
//!
//! Defaults match a production scheduler: a two second shutdown grace
//! period, hourly snapshots and 512 KiB log entries. Settings can be built
//! in code with the `with_*` methods or read from a TOML file:
//!
//! ```toml
//! shutdown_grace_period_ms = 2000
//! snapshot_interval_ms = 3600000
//! max_entry_size = 524288
//! digest = "xxh3"          # "crc32", "xxh3" or "sha256"
//! ```

use replog_durability::{digest_by_name, StreamConfig, DEFAULT_DIGEST, DEFAULT_MAX_ENTRY_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Smallest accepted max entry size (1 KiB)
pub const MIN_ENTRY_SIZE: usize = 1024;

/// Largest accepted max entry size (64 MiB)
pub const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// Configuration for [`LogStorage`](crate::LogStorage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogStorageConfig {
    /// How long `stop()` waits for in-flight snapshot work (default: 2s).
    pub shutdown_grace_period_ms: u64,

    /// Time between scheduled snapshots (default: 1h).
    pub snapshot_interval_ms: u64,

    /// Maximum payload bytes per log entry (default: 512 KiB).
    ///
    /// Larger payloads are split into several entries.
    pub max_entry_size: usize,

    /// Payload digest algorithm: `"crc32"`, `"xxh3"` or `"sha256"`.
    pub digest: String,
}

impl Default for LogStorageConfig {
    fn default() -> Self {
        LogStorageConfig {
            shutdown_grace_period_ms: 2_000,
            snapshot_interval_ms: 60 * 60 * 1_000,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            digest: DEFAULT_DIGEST.to_string(),
        }
    }
}

impl LogStorageConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set shutdown grace period (builder pattern).
    pub fn with_shutdown_grace_period(mut self, grace: Duration) -> Self {
        self.shutdown_grace_period_ms = grace.as_millis() as u64;
        self
    }

    /// Set snapshot interval (builder pattern).
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set maximum entry size (builder pattern).
    pub fn with_max_entry_size(mut self, size: usize) -> Self {
        self.max_entry_size = size;
        self
    }

    /// Set digest algorithm by name (builder pattern).
    pub fn with_digest(mut self, name: impl Into<String>) -> Self {
        self.digest = name.into();
        self
    }

    /// Shutdown grace period as a `Duration`
    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_period_ms)
    }

    /// Snapshot interval as a `Duration`
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entry_size < MIN_ENTRY_SIZE {
            return Err(ConfigError::EntrySizeTooSmall(self.max_entry_size));
        }
        if self.max_entry_size > MAX_ENTRY_SIZE {
            return Err(ConfigError::EntrySizeTooLarge(self.max_entry_size));
        }
        if self.shutdown_grace_period_ms == 0 {
            return Err(ConfigError::ZeroGracePeriod);
        }
        if self.snapshot_interval_ms == 0 {
            return Err(ConfigError::ZeroSnapshotInterval);
        }
        digest_by_name(&self.digest).map_err(|e| ConfigError::UnknownDigest(e.0))?;
        Ok(())
    }

    /// Stream manager settings derived from this configuration.
    pub fn stream_config(&self) -> Result<StreamConfig, ConfigError> {
        self.validate()?;
        let digest = digest_by_name(&self.digest).map_err(|e| ConfigError::UnknownDigest(e.0))?;
        Ok(StreamConfig::default()
            .with_max_entry_size(self.max_entry_size)
            .with_digest(digest))
    }

    /// Parse configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LogStorageConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Read(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Create a configuration for tests: small entries, short timers.
    pub fn for_testing() -> Self {
        LogStorageConfig {
            shutdown_grace_period_ms: 200,
            snapshot_interval_ms: 50,
            max_entry_size: MIN_ENTRY_SIZE,
            digest: DEFAULT_DIGEST.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Max entry size below 1 KiB
    #[error("Max entry size must be at least 1KB, got {0} bytes")]
    EntrySizeTooSmall(usize),

    /// Max entry size above 64 MiB
    #[error("Max entry size must be at most 64MB, got {0} bytes")]
    EntrySizeTooLarge(usize),

    /// Grace period of zero
    #[error("Shutdown grace period must be greater than zero")]
    ZeroGracePeriod,

    /// Snapshot interval of zero
    #[error("Snapshot interval must be greater than zero")]
    ZeroSnapshotInterval,

    /// Digest name not recognized
    #[error("Unknown digest algorithm '{0}'")]
    UnknownDigest(String),

    /// Config file could not be read
    #[error("{0}")]
    Read(String),

    /// Config file is not valid TOML for this struct
    #[error("Failed to parse config: {0}")]
    Parse(String),
}

impl From<ConfigError> for replog_core::Error {
    fn from(e: ConfigError) -> Self {
        replog_core::Error::Config(e.to_string())
    }
}
