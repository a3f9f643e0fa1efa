//! Service configuration
//!
//! Read from a YAML file; any missing file, section or field falls back to
//! its default.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use log::{info, warn};
use thiserror::Error;

/// Environment variable that overrides the configuration file location
pub const CONFIG_PATH_ENV: &str = "FILEVAULT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Blob storage backend types
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum StorageBackend {
    #[default]
    Local,
    Mock,
}

/// Record store backend types
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum MetadataBackend {
    #[default]
    SQLite,
    Mock,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Durable blob storage configuration
    pub storage: StorageConfig,
    /// Record store configuration
    pub metadata: MetadataConfig,
    /// Metadata cache configuration
    pub cache: CacheConfig,
    /// Upload pipeline configuration
    pub upload: UploadConfig,
    /// Orphaned object sweep configuration
    pub reconciliation: ReconciliationConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
}

/// Blob storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory that holds transferred objects
    pub base_path: String,
    /// Staging directory; objects are renamed out of it once fully written
    pub temp_path: String,
    /// Prefix used to build the locator handed back to callers; empty means `file://` locators
    pub public_base_url: String,
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub backend: MetadataBackend,
    /// Database file path
    pub db_path: String,
    /// Enable WAL mode
    pub wal_mode: bool,
    pub busy_timeout_ms: u64,
}

/// Metadata cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for per-owner file listings
    pub listing_ttl_secs: u64,
    /// TTL for resolved share links
    pub share_link_ttl_secs: u64,
    /// Upper bound on live entries held by the in-process cache
    pub max_entries: usize,
}

/// Upload pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted file, in bytes
    pub max_file_size: u64,
    /// Deadline for a single transfer to durable storage
    pub transfer_timeout_secs: u64,
}

/// Reconciliation worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    /// Sweep interval in seconds
    pub interval_secs: u64,
    /// Objects younger than this may still be waiting for their metadata row
    pub grace_period_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: 4,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            base_path: "./data/blobs".to_string(),
            temp_path: "./data/temp".to_string(),
            public_base_url: String::new(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::SQLite,
            db_path: "./data/metadata.db".to_string(),
            wal_mode: true,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            listing_ttl_secs: 300,      // 5 minutes
            share_link_ttl_secs: 86400, // 24 hours
            max_entries: 100_000,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10 MiB
            transfer_timeout_secs: 60,
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 600,
            grace_period_secs: 3600,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_secs)
    }

    pub fn share_link_ttl(&self) -> Duration {
        Duration::from_secs(self.share_link_ttl_secs)
    }
}

impl UploadConfig {
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from `$FILEVAULT_CONFIG` or `config.yaml`, use defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, use defaults if the file does not exist
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let config = if Path::new(config_path).exists() {
            let content = fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
                path: config_path.to_string(),
                source,
            })?;
            let config: AppConfig = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: config_path.to_string(),
                source,
            })?;
            info!("Loaded configuration from {}", config_path);
            config
        } else {
            warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the upload pipeline and cache cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload.max_file_size == 0 {
            return Err(ConfigError::Invalid("upload.max_file_size must be greater than zero".into()));
        }
        if self.upload.transfer_timeout_secs == 0 {
            return Err(ConfigError::Invalid("upload.transfer_timeout_secs must be greater than zero".into()));
        }
        if self.cache.listing_ttl_secs == 0 || self.cache.share_link_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache TTLs must be greater than zero".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be greater than zero".into()));
        }
        if self.reconciliation.enabled && self.reconciliation.interval_secs == 0 {
            return Err(ConfigError::Invalid("reconciliation.interval_secs must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config_matches_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.upload.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.cache.listing_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.share_link_ttl(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.metadata.backend, MetadataBackend::SQLite);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert!(config.storage.public_base_url.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let yaml = "upload:\n  max_file_size: 2048\nstorage:\n  backend: Mock\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.upload.max_file_size, 2048);
        assert_eq!(config.upload.transfer_timeout_secs, 60);
        assert_eq!(config.storage.backend, StorageBackend::Mock);
        assert_eq!(config.cache.listing_ttl_secs, 300);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let mut config = AppConfig::default();
        config.upload.max_file_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/filevault.yaml").unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_from_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "upload: [not, a, mapping").unwrap();
        let result = AppConfig::load_from(file.path().to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    #[serial]
    fn test_load_honours_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache:\n  listing_ttl_secs: 42").unwrap();

        env::set_var(CONFIG_PATH_ENV, file.path());
        let config = AppConfig::load().unwrap();
        env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(config.cache.listing_ttl_secs, 42);
    }
}
