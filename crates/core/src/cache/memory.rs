//! Process-local cache store.
//!
//! Used when no persistent cache is configured and as the test double for
//! the networked stores. Expired entries are dropped lazily on read.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{CacheStore, CachedTotal, StoredEntry, expiry_after, sort_entries};
use crate::Error;

#[derive(Debug, Clone)]
struct Slot {
    value: CachedTotal,
    expires_at: DateTime<Utc>,
}

impl Slot {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Thread-safe in-memory cache with per-entry TTL expiration.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Slot>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_where(&self, mut doomed: impl FnMut(&Slot) -> bool) -> u64 {
        let mut removed = 0;
        self.entries.retain(|_, slot| {
            let drop_it = doomed(slot);
            if drop_it {
                removed += 1;
            }
            !drop_it
        });
        removed
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<CachedTotal>, Error> {
        if let Some(slot) = self.entries.get(key) {
            if slot.is_fresh(Utc::now()) {
                return Ok(Some(slot.value.clone()));
            }
            drop(slot);
            self.entries.remove_if(key, |_, slot| !slot.is_fresh(Utc::now()));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: &CachedTotal, ttl: Duration) -> Result<(), Error> {
        let slot = Slot { value: value.clone(), expires_at: expiry_after(ttl)? };
        self.entries.insert(key.to_string(), slot);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn invalidate_facility(&self, facility: &str) -> Result<u64, Error> {
        Ok(self.remove_where(|slot| slot.value.business_facility == facility))
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        let now = Utc::now();
        Ok(self.remove_where(|slot| !slot.is_fresh(now)))
    }

    async fn clear(&self) -> Result<u64, Error> {
        let count = self.entries.len() as u64;
        self.entries.clear();
        Ok(count)
    }

    async fn entries(&self) -> Result<Vec<StoredEntry>, Error> {
        let now = Utc::now();
        let mut entries: Vec<StoredEntry> = self
            .entries
            .iter()
            .filter(|item| item.value().is_fresh(now))
            .map(|item| StoredEntry {
                key: item.key().clone(),
                value: item.value().value.clone(),
                expires_at: item.value().expires_at,
            })
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn count(&self) -> Result<u64, Error> {
        let now = Utc::now();
        Ok(self.entries.iter().filter(|item| item.value().is_fresh(now)).count() as u64)
    }

    async fn close(&self) -> Result<(), Error> {
        self.entries.clear();
        Ok(())
    }
}
