//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (EMISSIONS_*)
//! 2. TOML config file (if EMISSIONS_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Which cache store backs the query cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Sqlite,
    Memory,
    Redis,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (EMISSIONS_*)
/// 2. TOML config file (if EMISSIONS_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server listens on.
    ///
    /// Set via EMISSIONS_BIND_ADDR environment variable.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Path to the SQLite emissions record database.
    ///
    /// Set via EMISSIONS_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// CSV dataset imported into the record database at startup.
    ///
    /// Set via EMISSIONS_DATASET_PATH environment variable.
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,

    /// Cache store: `sqlite`, `memory` or `redis`.
    ///
    /// Set via EMISSIONS_CACHE_BACKEND environment variable.
    #[serde(default)]
    pub cache_backend: CacheBackendKind,

    /// Path to the SQLite cache database (sqlite backend only).
    ///
    /// Set via EMISSIONS_CACHE_DB_PATH environment variable.
    #[serde(default = "default_cache_db_path")]
    pub cache_db_path: PathBuf,

    /// Redis connection URL (redis backend only).
    ///
    /// Set via EMISSIONS_REDIS_URL environment variable.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Lifetime of a cached facility total in seconds.
    ///
    /// Set via EMISSIONS_CACHE_TTL_SECS environment variable.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Interval between expired-entry purges in seconds; 0 disables the task.
    ///
    /// Set via EMISSIONS_PURGE_INTERVAL_SECS environment variable.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Maximum accepted request body size in bytes.
    ///
    /// Set via EMISSIONS_MAX_BODY_BYTES environment variable.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:5000".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./emissions.sqlite")
}

fn default_cache_db_path() -> PathBuf {
    PathBuf::from("./emissions-cache.sqlite")
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".into()
}

fn default_cache_ttl_secs() -> u64 {
    3_600
}

fn default_purge_interval_secs() -> u64 {
    300
}

fn default_max_body_bytes() -> usize {
    65_536
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            dataset_path: None,
            cache_backend: CacheBackendKind::default(),
            cache_db_path: default_cache_db_path(),
            redis_url: default_redis_url(),
            cache_ttl_secs: default_cache_ttl_secs(),
            purge_interval_secs: default_purge_interval_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl AppConfig {
    /// Cache TTL as Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Purge interval, or `None` when periodic purging is disabled.
    pub fn purge_interval(&self) -> Option<Duration> {
        (self.purge_interval_secs > 0).then(|| Duration::from_secs(self.purge_interval_secs))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `EMISSIONS_`
    /// 2. TOML file from `EMISSIONS_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("EMISSIONS_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("EMISSIONS_")
                .ignore(&["CONFIG_FILE", "SERVER"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::extract(figment)
    }

    /// Extract and validate a configuration from an assembled figment.
    pub fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
