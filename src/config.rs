//! Configuration module for Hangar.

use serde::Deserialize;
use std::path::Path;

use crate::{HangarError, Result};

/// Environment variable that overrides the direct-link signing secret.
pub const LINK_SECRET_ENV: &str = "HANGAR_LINK_SECRET";

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/hangar.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the local backend.
    #[serde(default = "default_local_path")]
    pub local_path: String,
    /// Maximum accepted upload size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Quota assigned to newly registered users, in bytes.
    #[serde(default = "default_quota")]
    pub default_quota: i64,
}

fn default_local_path() -> String {
    "data/uploads".to_string()
}

fn default_max_file_size() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}

fn default_quota() -> i64 {
    10 * 1024 * 1024 * 1024 // 10 GiB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            max_file_size: default_max_file_size(),
            default_quota: default_quota(),
        }
    }
}

/// Direct-link configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LinksConfig {
    /// HS256 secret for direct-link tokens.
    ///
    /// When empty, a random secret is generated once and kept in the
    /// `system_config` table.
    #[serde(default)]
    pub secret: String,
    /// Public base URL that download links are built on.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            base_url: default_base_url(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/hangar.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// File storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Direct-link configuration.
    #[serde(default)]
    pub links: LinksConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(HangarError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| HangarError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `HANGAR_LINK_SECRET`: Override the direct-link signing secret
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var(LINK_SECRET_ENV) {
            if !secret.is_empty() {
                self.links.secret = secret;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.max_file_size == 0 {
            return Err(HangarError::Config(
                "storage.max_file_size must be greater than zero".to_string(),
            ));
        }
        if self.storage.default_quota <= 0 {
            return Err(HangarError::Config(
                "storage.default_quota must be greater than zero".to_string(),
            ));
        }
        url::Url::parse(&self.links.base_url)
            .map_err(|e| HangarError::Config(format!("links.base_url is not a URL: {e}")))?;
        Ok(())
    }
}
