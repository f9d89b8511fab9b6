//! Emissions data store.
//!
//! The query cache depends on exactly one capability of the store: summing a
//! facility's emissions over an inclusive date range. [`RecordsDb`] provides
//! it from a SQLite table of raw line items loaded from the CSV dataset.

pub mod dataset;
pub mod records;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::query::DateRange;

pub use dataset::parse_csv;
pub use records::RecordsDb;

/// One emissions line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionRecord {
    pub transaction_date: NaiveDate,
    pub business_facility: String,
    pub co2_item: f64,
}

/// Aggregation capability consumed by the query cache.
#[async_trait]
pub trait EmissionsSource: Send + Sync {
    /// Sum of emissions for `facility` with transaction dates inside `range`.
    ///
    /// A facility without matching records totals `0.0`.
    async fn total_emissions(&self, facility: &str, range: &DateRange) -> Result<f64, Error>;
}
