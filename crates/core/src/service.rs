//! Read-through query cache in front of the emissions data store.
//!
//! Each facility of a query is resolved independently under its own
//! `(start, end, facility)` key. A fresh cache entry answers the lookup;
//! otherwise the data store computes the total and the result is written
//! back with the configured TTL.
//!
//! Concurrent lookups of the same key and policy are coalesced: the first caller
//! registers a [`OnceCell`] in the in-flight table and performs the lookup,
//! later callers wait on that cell. Cache read failures count as misses and
//! cache write failures are logged; neither fails the query.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::Error;
use crate::cache::{CacheStore, CachedTotal, compute_cache_key};
use crate::query::{DateRange, EmissionsQuery, FacilityTotal};
use crate::store::EmissionsSource;

/// How a lookup treats existing cache entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Lookup {
    /// Serve fresh entries from the cache.
    #[default]
    Cached,
    /// Skip cache reads and recompute; the result still refreshes the cache.
    Refresh,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Lookups answered by another caller's in-flight computation.
    pub coalesced: u64,
    pub read_errors: u64,
    pub write_errors: u64,
}

/// Cache state as reported over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub backend: String,
    /// Live (unexpired) entries.
    pub entries: u64,
    pub ttl_secs: u64,
    #[serde(flatten)]
    pub counters: CacheStats,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    read_errors: AtomicU64,
    write_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Emissions query cache.
pub struct QueryCache {
    cache: Arc<dyn CacheStore>,
    source: Arc<dyn EmissionsSource>,
    ttl: Duration,
    /// Keyed by policy too, so a refresh never waits on a cached read.
    in_flight: DashMap<(String, Lookup), Arc<OnceCell<f64>>>,
    counters: Counters,
}

/// Drops the in-flight registration when its owner finishes or is cancelled.
struct InFlightSlot<'a> {
    table: &'a DashMap<(String, Lookup), Arc<OnceCell<f64>>>,
    id: (String, Lookup),
    cell: Arc<OnceCell<f64>>,
}

impl<'a> InFlightSlot<'a> {
    fn join(table: &'a DashMap<(String, Lookup), Arc<OnceCell<f64>>>, key: &str, lookup: Lookup) -> Self {
        let id = (key.to_string(), lookup);
        let cell = Arc::clone(table.entry(id.clone()).or_insert_with(|| Arc::new(OnceCell::new())).value());
        Self { table, id, cell }
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.table.remove_if(&self.id, |_, current| Arc::ptr_eq(current, &self.cell));
    }
}

impl QueryCache {
    pub fn new(cache: Arc<dyn CacheStore>, source: Arc<dyn EmissionsSource>, ttl: Duration) -> Self {
        Self { cache, source, ttl, in_flight: DashMap::new(), counters: Counters::default() }
    }

    /// The cache store this service writes through.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Counters together with backend name and live entry count.
    pub async fn report(&self) -> Result<StatsReport, Error> {
        Ok(StatsReport {
            backend: self.cache.backend().to_string(),
            entries: self.cache.count().await?,
            ttl_secs: self.ttl.as_secs(),
            counters: self.stats(),
        })
    }

    /// Totals for every facility of the query, in query order.
    ///
    /// # Errors
    ///
    /// Returns `Error::DataStore` if any facility's aggregation fails.
    pub async fn totals(&self, query: &EmissionsQuery) -> Result<Vec<FacilityTotal>, Error> {
        self.totals_with(query, Lookup::Cached).await
    }

    /// Like [`totals`](Self::totals) with an explicit cache policy.
    pub async fn totals_with(&self, query: &EmissionsQuery, lookup: Lookup) -> Result<Vec<FacilityTotal>, Error> {
        let range = query.range();
        let lookups = query.facilities().iter().map(|facility| async move {
            let total = self.total_for(&range, facility, lookup).await?;
            Ok::<_, Error>(FacilityTotal { business_facility: facility.clone(), total_emissions: total })
        });

        let totals = try_join_all(lookups).await?;
        tracing::debug!(%range, facilities = totals.len(), "resolved emissions query");
        Ok(totals)
    }

    /// Remove expired entries from the store.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let removed = self.cache.purge_expired().await?;
        if removed > 0 {
            tracing::info!(removed, backend = self.cache.backend(), "purged expired cache entries");
        }
        Ok(removed)
    }

    /// Purge expired entries every `period` until the returned handle is aborted.
    pub fn spawn_purge_task(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = service.purge_expired().await {
                    tracing::warn!(error = %e, "cache purge failed");
                }
            }
        })
    }

    async fn total_for(&self, range: &DateRange, facility: &str, lookup: Lookup) -> Result<f64, Error> {
        let key = compute_cache_key(range, facility);
        let slot = InFlightSlot::join(&self.in_flight, &key, lookup);

        let mut ran = false;
        let result = slot
            .cell
            .get_or_try_init(|| {
                ran = true;
                self.resolve(&key, range, facility, lookup)
            })
            .await
            .copied();

        if !ran && result.is_ok() {
            Counters::bump(&self.counters.coalesced);
        }
        result
    }

    async fn resolve(&self, key: &str, range: &DateRange, facility: &str, lookup: Lookup) -> Result<f64, Error> {
        if lookup == Lookup::Cached {
            match self.cache.get(key).await {
                Ok(Some(entry)) => {
                    Counters::bump(&self.counters.hits);
                    tracing::debug!(facility, %range, "cache hit");
                    return Ok(entry.total_emissions);
                }
                Ok(None) => {}
                Err(e) => {
                    Counters::bump(&self.counters.read_errors);
                    tracing::warn!(facility, %range, error = %e, "cache read failed; recomputing");
                }
            }
        }

        Counters::bump(&self.counters.misses);
        tracing::debug!(facility, %range, refresh = lookup == Lookup::Refresh, "cache miss");

        let total = self
            .source
            .total_emissions(facility, range)
            .await
            .map_err(|e| match e {
                Error::DataStore(_) => e,
                other => Error::DataStore(other.to_string()),
            })?;

        let entry = CachedTotal::new(*range, facility, total);
        if let Err(e) = self.cache.put(key, &entry, self.ttl).await {
            Counters::bump(&self.counters.write_errors);
            tracing::warn!(facility, %range, error = %e, "failed to cache emissions total");
        }

        Ok(total)
    }
}
