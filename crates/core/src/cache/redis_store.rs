//! Redis-backed cache store.
//!
//! Values are JSON-encoded [`CachedTotal`]s stored with a millisecond expiry,
//! so Redis handles eviction and [`CacheStore::purge_expired`] has nothing to
//! do. Bulk operations walk the `emissions:*` keyspace.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::hash::is_cache_key;
use super::{CacheStore, CachedTotal, KEY_PREFIX, StoredEntry, sort_entries};
use crate::Error;

fn cache_err(err: redis::RedisError) -> Error {
    Error::Cache(format!("redis: {err}"))
}

fn decode(key: &str, raw: &str) -> Result<CachedTotal, Error> {
    serde_json::from_str(raw).map_err(|e| Error::Cache(format!("corrupt entry {key}: {e}")))
}

/// Cache store reachable over the network.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to the given `redis://` URL.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url).map_err(cache_err)?;
        let conn = client.get_connection_manager().await.map_err(cache_err)?;
        tracing::debug!(url, "connected to redis");
        Ok(Self { conn })
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{KEY_PREFIX}*")).await.map_err(cache_err)?;
        Ok(keys.into_iter().filter(|key| is_cache_key(key)).collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, Error> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del(keys).await.map_err(cache_err)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<CachedTotal>, Error> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(cache_err)?;
        raw.map(|raw| decode(key, &raw)).transpose()
    }

    async fn put(&self, key: &str, value: &CachedTotal, ttl: Duration) -> Result<(), Error> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            self.invalidate(key).await?;
            return Ok(());
        }

        let raw = serde_json::to_string(value).map_err(|e| Error::Cache(format!("encode entry: {e}")))?;
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key, raw, millis).await.map_err(cache_err)
    }

    async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await.map_err(cache_err)?;
        Ok(removed > 0)
    }

    async fn invalidate_facility(&self, facility: &str) -> Result<u64, Error> {
        let doomed: Vec<String> = self
            .entries()
            .await?
            .into_iter()
            .filter(|entry| entry.value.business_facility == facility)
            .map(|entry| entry.key)
            .collect();
        self.delete(&doomed).await
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        Ok(0)
    }

    async fn clear(&self) -> Result<u64, Error> {
        let keys = self.keys().await?;
        self.delete(&keys).await
    }

    async fn entries(&self) -> Result<Vec<StoredEntry>, Error> {
        let mut conn = self.conn.clone();
        let mut entries = Vec::new();
        for key in self.keys().await? {
            let raw: Option<String> = conn.get(&key).await.map_err(cache_err)?;
            let remaining_ms: i64 = conn.pttl(&key).await.map_err(cache_err)?;
            // Expired or deleted between KEYS and GET.
            let (Some(raw), true) = (raw, remaining_ms > 0) else {
                continue;
            };
            let value = decode(&key, &raw)?;
            let expires_at = Utc::now() + chrono::Duration::milliseconds(remaining_ms);
            entries.push(StoredEntry { key, value, expires_at });
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn count(&self) -> Result<u64, Error> {
        Ok(self.keys().await?.len() as u64)
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}
