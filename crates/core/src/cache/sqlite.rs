//! SQLite-backed cache store.
//!
//! Entries live in the `cache_entries` table, one row per key, with RFC 3339
//! `expires_at` timestamps compared lexicographically against the current
//! time. Expired rows are invisible to reads and removed by
//! [`CacheStore::purge_expired`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use tokio_rusqlite::rusqlite::types::Type;
use tokio_rusqlite::{Connection, params, rusqlite};

use super::{CacheStore, CachedTotal, StoredEntry, expiry_after};
use crate::query::DATE_FORMAT;
use crate::{Error, db};

/// Cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open a cache database at the specified path, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self { conn: db::open(path).await? })
    }

    /// Open an in-memory cache database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        Ok(Self { conn: db::open_in_memory().await? })
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

fn text_column<T, E>(idx: usize, value: Result<T, E>) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    value.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn date_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    text_column(idx, NaiveDate::parse_from_str(&raw, DATE_FORMAT))
}

fn time_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    text_column(idx, DateTime::parse_from_rfc3339(&raw).map(|t| t.with_timezone(&Utc)))
}

/// Columns: start_date, end_date, business_facility, total_emissions, cached_at.
fn cached_total(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<CachedTotal> {
    Ok(CachedTotal {
        start_date: date_column(row, offset)?,
        end_date: date_column(row, offset + 1)?,
        business_facility: row.get(offset + 2)?,
        total_emissions: row.get(offset + 3)?,
        cached_at: time_column(row, offset + 4)?,
    })
}

#[async_trait]
impl CacheStore for CacheDb {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<CachedTotal>, Error> {
        let key = key.to_string();
        let now = now();
        self.conn
            .call(move |conn| -> Result<Option<CachedTotal>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT start_date, end_date, business_facility, total_emissions, cached_at
                     FROM cache_entries WHERE key_hash = ?1 AND expires_at > ?2",
                )?;

                match stmt.query_row(params![key, now], |row| cached_total(row, 0)) {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, key: &str, value: &CachedTotal, ttl: Duration) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.clone();
        let expires_at = timestamp(expiry_after(ttl)?);

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_entries (
                        key_hash, start_date, end_date, business_facility,
                        total_emissions, cached_at, expires_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(key_hash) DO UPDATE SET
                        start_date = excluded.start_date,
                        end_date = excluded.end_date,
                        business_facility = excluded.business_facility,
                        total_emissions = excluded.total_emissions,
                        cached_at = excluded.cached_at,
                        expires_at = excluded.expires_at",
                    params![
                        key,
                        value.start_date.format(DATE_FORMAT).to_string(),
                        value.end_date.format(DATE_FORMAT).to_string(),
                        value.business_facility,
                        value.total_emissions,
                        timestamp(value.cached_at),
                        expires_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE key_hash = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn invalidate_facility(&self, facility: &str) -> Result<u64, Error> {
        let facility = facility.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count =
                    conn.execute("DELETE FROM cache_entries WHERE business_facility = ?1", params![facility])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        let now = now();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE expires_at <= ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn clear(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn entries(&self) -> Result<Vec<StoredEntry>, Error> {
        let now = now();
        self.conn
            .call(move |conn| -> Result<Vec<StoredEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key_hash, start_date, end_date, business_facility, total_emissions, cached_at, expires_at
                     FROM cache_entries WHERE expires_at > ?1
                     ORDER BY business_facility, start_date, end_date",
                )?;

                let rows = stmt.query_map(params![now], |row| {
                    Ok(StoredEntry { key: row.get(0)?, value: cached_total(row, 1)?, expires_at: time_column(row, 6)? })
                })?;

                let mut entries = Vec::new();
                for row in rows {
                    entries.push(row?);
                }
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }

    async fn count(&self) -> Result<u64, Error> {
        let now = now();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE expires_at > ?1",
                    params![now],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn close(&self) -> Result<(), Error> {
        match self.conn.clone().close().await {
            Ok(()) | Err(tokio_rusqlite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(Error::Database(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::compute_cache_key;
    use crate::query::DateRange;

    fn range(start: (i32, u32, u32), end: (i32, u32, u32)) -> DateRange {
        DateRange {
            start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
        }
    }

    fn entry(facility: &str, total: f64) -> (String, CachedTotal) {
        let r = range((2023, 1, 1), (2023, 6, 30));
        (compute_cache_key(&r, facility), CachedTotal::new(r, facility, total))
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (key, value) = entry("GreenEat Changi", 12.75);

        db.put(&key, &value, HOUR).await.unwrap();

        let cached = db.get(&key).await.unwrap().unwrap();
        assert_eq!(cached.business_facility, "GreenEat Changi");
        assert_eq!(cached.total_emissions, 12.75);
        assert_eq!(cached.range(), value.range());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get("emissions:nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_invisible() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (key, value) = entry("GreenEat Changi", 1.0);

        db.put(&key, &value, Duration::ZERO).await.unwrap();

        assert!(db.get(&key).await.unwrap().is_none());
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_value() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (key, value) = entry("GreenEat Changi", 1.0);

        db.put(&key, &value, HOUR).await.unwrap();
        db.put(&key, &CachedTotal { total_emissions: 2.0, ..value }, HOUR).await.unwrap();

        assert_eq!(db.get(&key).await.unwrap().unwrap().total_emissions, 2.0);
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (expiring_key, expiring) = entry("GreenEat Changi", 1.0);
        let (fresh_key, fresh) = entry("GreenEat Orchard", 2.0);

        db.put(&expiring_key, &expiring, Duration::ZERO).await.unwrap();
        db.put(&fresh_key, &fresh, HOUR).await.unwrap();

        assert_eq!(db.purge_expired().await.unwrap(), 1);
        assert!(db.get(&fresh_key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_and_invalidate_facility() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (changi_key, changi) = entry("GreenEat Changi", 1.0);
        let (orchard_key, orchard) = entry("GreenEat Orchard", 2.0);
        let other_range = range((2022, 1, 1), (2022, 12, 31));
        let changi_2022 = CachedTotal::new(other_range, "GreenEat Changi", 3.0);

        db.put(&changi_key, &changi, HOUR).await.unwrap();
        db.put(&orchard_key, &orchard, HOUR).await.unwrap();
        db.put(&compute_cache_key(&other_range, "GreenEat Changi"), &changi_2022, HOUR).await.unwrap();

        assert!(db.invalidate(&orchard_key).await.unwrap());
        assert!(!db.invalidate(&orchard_key).await.unwrap());
        assert_eq!(db.invalidate_facility("GreenEat Changi").await.unwrap(), 2);
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entries_sorted_and_clear() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for (facility, total) in [("Fresh Kitchen Fusionopolis", 3.0), ("GreenEat Changi", 1.0)] {
            let (key, value) = entry(facility, total);
            db.put(&key, &value, HOUR).await.unwrap();
        }

        let entries = db.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value.business_facility, "Fresh Kitchen Fusionopolis");
        assert!(entries[0].expires_at > Utc::now());

        assert_eq!(db.clear().await.unwrap(), 2);
        assert!(db.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.close().await.unwrap();
        db.close().await.unwrap();
    }
}
