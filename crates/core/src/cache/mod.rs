//! Cache stores for per-facility emissions totals.
//!
//! Every backend implements [`CacheStore`], a small key/value contract with
//! per-entry TTL. The query service only ever talks to the trait, so tests
//! substitute [`MemoryCache`] for the SQLite or Redis stores.
//!
//! - [`CacheDb`]: SQLite via tokio-rusqlite (default)
//! - [`MemoryCache`]: process-local `DashMap`
//! - `RedisCache`: networked store, behind the `redis` feature

pub mod hash;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::config::{AppConfig, CacheBackendKind};
use crate::query::DateRange;

pub use hash::{KEY_PREFIX, compute_cache_key};
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis_store::RedisCache;
pub use sqlite::CacheDb;

/// A cached facility total together with the query it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTotal {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub business_facility: String,
    pub total_emissions: f64,
    pub cached_at: DateTime<Utc>,
}

impl CachedTotal {
    pub fn new(range: DateRange, facility: impl Into<String>, total_emissions: f64) -> Self {
        Self {
            start_date: range.start,
            end_date: range.end,
            business_facility: facility.into(),
            total_emissions,
            cached_at: Utc::now(),
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange { start: self.start_date, end: self.end_date }
    }
}

/// A live cache entry as listed by [`CacheStore::entries`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    pub key: String,
    #[serde(flatten)]
    pub value: CachedTotal,
    pub expires_at: DateTime<Utc>,
}

/// Key/value store with per-entry expiry.
///
/// Reads never return expired entries. Implementations must be safe to share
/// across tasks.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name for logs and stats.
    fn backend(&self) -> &'static str;

    /// Fetch a fresh entry.
    async fn get(&self, key: &str) -> Result<Option<CachedTotal>, Error>;

    /// Insert or replace an entry, expiring `ttl` from now.
    async fn put(&self, key: &str, value: &CachedTotal, ttl: Duration) -> Result<(), Error>;

    /// Remove one entry. Returns whether it existed.
    async fn invalidate(&self, key: &str) -> Result<bool, Error>;

    /// Remove every entry for a facility regardless of range.
    async fn invalidate_facility(&self, facility: &str) -> Result<u64, Error>;

    /// Remove expired entries.
    async fn purge_expired(&self) -> Result<u64, Error>;

    /// Remove all entries.
    async fn clear(&self) -> Result<u64, Error>;

    /// All fresh entries, ordered by facility then start date.
    async fn entries(&self) -> Result<Vec<StoredEntry>, Error>;

    /// Number of fresh entries.
    async fn count(&self) -> Result<u64, Error>;

    /// Release the underlying connection. Further calls may fail.
    async fn close(&self) -> Result<(), Error>;
}

/// Open the cache backend selected by configuration.
pub async fn open_cache(config: &AppConfig) -> Result<Arc<dyn CacheStore>, Error> {
    let store: Arc<dyn CacheStore> = match config.cache_backend {
        CacheBackendKind::Sqlite => Arc::new(CacheDb::open(&config.cache_db_path).await?),
        CacheBackendKind::Memory => Arc::new(MemoryCache::new()),
        #[cfg(feature = "redis")]
        CacheBackendKind::Redis => Arc::new(RedisCache::connect(&config.redis_url).await?),
        #[cfg(not(feature = "redis"))]
        CacheBackendKind::Redis => {
            return Err(Error::Cache("redis backend requested but the `redis` feature is not enabled".into()));
        }
    };

    tracing::info!(backend = store.backend(), ttl_secs = config.cache_ttl_secs, "opened cache store");
    Ok(store)
}

pub(crate) fn sort_entries(entries: &mut [StoredEntry]) {
    entries.sort_by(|a, b| {
        a.value
            .business_facility
            .cmp(&b.value.business_facility)
            .then(a.value.start_date.cmp(&b.value.start_date))
            .then(a.value.end_date.cmp(&b.value.end_date))
    });
}

pub(crate) fn expiry_after(ttl: Duration) -> Result<DateTime<Utc>, Error> {
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| Error::Cache(format!("invalid ttl: {e}")))?;
    Ok(Utc::now() + ttl)
}
