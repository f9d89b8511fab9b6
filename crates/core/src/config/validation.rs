//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, CacheBackendKind};
use thiserror::Error;

const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const MIN_BODY_BYTES: usize = 1024;
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_ttl_secs` is 0 or exceeds 30 days
    /// - `max_body_bytes` is below 1KiB or exceeds 10MiB
    /// - `bind_addr` is empty
    ///
    /// Returns `ConfigError::Missing` if the redis backend is selected
    /// without a `redis_url`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid { field: "cache_ttl_secs".into(), reason: "must be greater than 0".into() });
        }
        if self.cache_ttl_secs > MAX_TTL_SECS {
            return Err(ConfigError::Invalid { field: "cache_ttl_secs".into(), reason: "must not exceed 30 days".into() });
        }

        if self.max_body_bytes < MIN_BODY_BYTES {
            return Err(ConfigError::Invalid { field: "max_body_bytes".into(), reason: "must be at least 1KiB".into() });
        }
        if self.max_body_bytes > MAX_BODY_BYTES {
            return Err(ConfigError::Invalid {
                field: "max_body_bytes".into(),
                reason: "must not exceed 10MiB".into(),
            });
        }

        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "bind_addr".into(), reason: "must not be empty".into() });
        }

        if self.cache_backend == CacheBackendKind::Redis && self.redis_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "redis_url".into(),
                hint: "Set EMISSIONS_REDIS_URL environment variable".into(),
            });
        }

        if self.purge_interval_secs > 0 && self.purge_interval_secs > self.cache_ttl_secs {
            tracing::warn!(
                purge_interval_secs = self.purge_interval_secs,
                cache_ttl_secs = self.cache_ttl_secs,
                "purge interval is longer than the cache TTL; expired rows will linger between purges"
            );
        }

        Ok(())
    }
}
