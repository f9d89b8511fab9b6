//! SQLite-backed emissions record store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_rusqlite::{Connection, params};

use super::{EmissionRecord, EmissionsSource, dataset};
use crate::query::{DATE_FORMAT, DateRange};
use crate::{Error, db};

/// Handle to the `emission_records` table.
#[derive(Clone, Debug)]
pub struct RecordsDb {
    conn: Connection,
}

impl RecordsDb {
    /// Open a record database at the specified path, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self { conn: db::open(path).await? })
    }

    /// Open an in-memory record database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        Ok(Self { conn: db::open_in_memory().await? })
    }

    /// Append records in a single transaction.
    ///
    /// Returns the number of inserted rows.
    pub async fn insert_records(&self, records: &[EmissionRecord]) -> Result<u64, Error> {
        self.write_records(records.to_vec(), false).await
    }

    /// Replace the table contents with the records of a CSV dataset.
    ///
    /// The file is parsed off the async runtime; the table is only touched
    /// once the whole file parsed cleanly.
    pub async fn load_dataset(&self, path: impl Into<PathBuf>) -> Result<u64, Error> {
        let path = path.into();
        let shown = path.display().to_string();
        let records = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)
                .map_err(|e| Error::Import { line: 0, reason: format!("cannot open {}: {e}", path.display()) })?;
            dataset::parse_csv(file)
        })
        .await
        .map_err(|e| Error::Import { line: 0, reason: format!("import task failed: {e}") })??;

        let count = self.write_records(records, true).await?;
        tracing::info!(path = %shown, records = count, "loaded emissions dataset");
        Ok(count)
    }

    async fn write_records(&self, records: Vec<EmissionRecord>, replace: bool) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                if replace {
                    tx.execute("DELETE FROM emission_records", [])?;
                }
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO emission_records (transaction_date, business_facility, co2_item)
                         VALUES (?1, ?2, ?3)",
                    )?;
                    for record in &records {
                        stmt.execute(params![
                            record.transaction_date.format(DATE_FORMAT).to_string(),
                            record.business_facility,
                            record.co2_item,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(records.len() as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Distinct facility names, sorted.
    pub async fn facilities(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT DISTINCT business_facility FROM emission_records ORDER BY business_facility")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut names = Vec::new();
                for row in rows {
                    names.push(row?);
                }
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Total number of stored records.
    pub async fn record_count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM emission_records", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl EmissionsSource for RecordsDb {
    async fn total_emissions(&self, facility: &str, range: &DateRange) -> Result<f64, Error> {
        let facility = facility.to_string();
        let start = range.start.format(DATE_FORMAT).to_string();
        let end = range.end.format(DATE_FORMAT).to_string();

        self.conn
            .call(move |conn| -> Result<f64, Error> {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(co2_item), 0.0) FROM emission_records
                     WHERE business_facility = ?1 AND transaction_date BETWEEN ?2 AND ?3",
                    params![facility, start, end],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(|e| match Error::from(e) {
                err @ Error::DataStore(_) => err,
                other => Error::DataStore(other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(date: NaiveDate, facility: &str, co2: f64) -> EmissionRecord {
        EmissionRecord { transaction_date: date, business_facility: facility.into(), co2_item: co2 }
    }

    async fn seeded() -> RecordsDb {
        let db = RecordsDb::open_in_memory().await.unwrap();
        db.insert_records(&[
            record(day(2022, 12, 31), "GreenEat Changi", 100.0),
            record(day(2023, 1, 1), "GreenEat Changi", 1.5),
            record(day(2023, 3, 10), "GreenEat Changi", 2.25),
            record(day(2023, 6, 30), "GreenEat Changi", 0.25),
            record(day(2023, 7, 1), "GreenEat Changi", 50.0),
            record(day(2023, 2, 14), "GreenEat Orchard", 4.0),
        ])
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_total_is_inclusive_sum() {
        let db = seeded().await;
        let range = DateRange::new(day(2023, 1, 1), day(2023, 6, 30)).unwrap();

        assert_eq!(db.total_emissions("GreenEat Changi", &range).await.unwrap(), 4.0);
        assert_eq!(db.total_emissions("GreenEat Orchard", &range).await.unwrap(), 4.0);
    }

    #[tokio::test]
    async fn test_total_for_unknown_facility_is_zero() {
        let db = seeded().await;
        let range = DateRange::new(day(2023, 1, 1), day(2023, 6, 30)).unwrap();
        assert_eq!(db.total_emissions("Nowhere", &range).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_facilities_and_count() {
        let db = seeded().await;
        assert_eq!(db.facilities().await.unwrap(), ["GreenEat Changi", "GreenEat Orchard"]);
        assert_eq!(db.record_count().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_load_dataset_replaces_contents() {
        let db = seeded().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "TRANSACTION DATE,Business Facility,CO2_ITEM").unwrap();
        writeln!(file, "08/02/20,Fresh Kitchen Fusionopolis,3.5").unwrap();
        writeln!(file, "23/08/23,Fresh Kitchen Fusionopolis,1.5").unwrap();

        assert_eq!(db.load_dataset(file.path()).await.unwrap(), 2);
        assert_eq!(db.facilities().await.unwrap(), ["Fresh Kitchen Fusionopolis"]);

        let range = DateRange::new(day(2020, 2, 8), day(2023, 8, 23)).unwrap();
        assert_eq!(db.total_emissions("Fresh Kitchen Fusionopolis", &range).await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn test_load_dataset_keeps_table_on_bad_file() {
        let db = seeded().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "TRANSACTION DATE,Business Facility,CO2_ITEM").unwrap();
        writeln!(file, "not a date,GreenEat Changi,1").unwrap();

        assert!(matches!(db.load_dataset(file.path()).await, Err(Error::Import { line: 2, .. })));
        assert_eq!(db.record_count().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_closed_connection_is_data_store_error() {
        let db = seeded().await;
        db.conn.clone().close().await.unwrap();

        let range = DateRange::new(day(2023, 1, 1), day(2023, 6, 30)).unwrap();
        let err = db.total_emissions("GreenEat Changi", &range).await.unwrap_err();
        assert!(matches!(err, Error::DataStore(_)));
    }
}
