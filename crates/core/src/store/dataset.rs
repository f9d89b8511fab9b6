//! CSV dataset parsing.
//!
//! The dataset is a transaction export with at least the columns
//! `TRANSACTION DATE` (`dd/mm/yy`), `Business Facility` and `CO2_ITEM`.
//! Header matching ignores case and surrounding whitespace; other columns are
//! ignored. Rows with an empty `CO2_ITEM` carry no emissions and are skipped.

use std::io::Read;

use chrono::NaiveDate;

use super::EmissionRecord;
use crate::Error;

const DATE_COLUMN: &str = "TRANSACTION DATE";
const FACILITY_COLUMN: &str = "Business Facility";
const CO2_COLUMN: &str = "CO2_ITEM";

/// Accepted transaction date formats, tried in order.
const DATE_FORMATS: &[&str] = &["%d/%m/%y", "%d/%m/%Y", "%Y-%m-%d"];

struct Columns {
    date: usize,
    facility: usize,
    co2: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self, Error> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::Import { line: 1, reason: format!("missing column '{name}'") })
        };
        Ok(Self { date: find(DATE_COLUMN)?, facility: find(FACILITY_COLUMN)?, co2: find(CO2_COLUMN)? })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Parse every emissions record from a CSV source.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<EmissionRecord>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| Error::Import { line: 1, reason: e.to_string() })?
        .clone();
    let columns = Columns::locate(&headers)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for row in reader.records() {
        let row = row.map_err(|e| Error::Import {
            line: e.position().map(|p| p.line()).unwrap_or_default(),
            reason: e.to_string(),
        })?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        let field = |idx: usize| row.get(idx).unwrap_or_default();

        let co2_raw = field(columns.co2);
        if co2_raw.is_empty() {
            skipped += 1;
            continue;
        }
        let co2_item: f64 = co2_raw
            .parse()
            .map_err(|_| Error::Import { line, reason: format!("invalid {CO2_COLUMN} '{co2_raw}'") })?;

        let date_raw = field(columns.date);
        let transaction_date = parse_date(date_raw)
            .ok_or_else(|| Error::Import { line, reason: format!("invalid {DATE_COLUMN} '{date_raw}'") })?;

        let business_facility = field(columns.facility);
        if business_facility.is_empty() {
            return Err(Error::Import { line, reason: format!("empty {FACILITY_COLUMN}") });
        }

        records.push(EmissionRecord { transaction_date, business_facility: business_facility.to_string(), co2_item });
    }

    if skipped > 0 {
        tracing::debug!(skipped, "skipped dataset rows without {CO2_COLUMN}");
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ID,TRANSACTION DATE,Business Facility,ITEM,CO2_ITEM
1,08/02/20,GreenEat Changi,Rice,1.5
2,23/08/23,Fresh Kitchen Fusionopolis,Beef,10.25
3,15/03/23,GreenEat Orchard,Tofu,
4,2023-03-16,GreenEat Orchard,Tofu,0.75
";

    #[test]
    fn test_parse_sample() {
        let records = parse_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].transaction_date, NaiveDate::from_ymd_opt(2020, 2, 8).unwrap());
        assert_eq!(records[0].business_facility, "GreenEat Changi");
        assert_eq!(records[0].co2_item, 1.5);

        assert_eq!(records[1].transaction_date, NaiveDate::from_ymd_opt(2023, 8, 23).unwrap());
        assert_eq!(records[2].transaction_date, NaiveDate::from_ymd_opt(2023, 3, 16).unwrap());
    }

    #[test]
    fn test_header_match_is_case_insensitive() {
        let csv = "transaction date , business facility,co2_item\n01/01/23,GreenEat Changi,2\n";
        let records = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_missing_column() {
        let csv = "TRANSACTION DATE,Business Facility\n01/01/23,GreenEat Changi\n";
        let err = parse_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Import { line: 1, reason } if reason.contains("CO2_ITEM")));
    }

    #[test]
    fn test_bad_values_report_line() {
        let csv = "TRANSACTION DATE,Business Facility,CO2_ITEM\n01/01/23,GreenEat Changi,1\n31/02/23,GreenEat Changi,1\n";
        let err = parse_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Import { line: 3, .. }), "{err}");

        let csv = "TRANSACTION DATE,Business Facility,CO2_ITEM\n01/01/23,GreenEat Changi,lots\n";
        assert!(matches!(parse_csv(csv.as_bytes()), Err(Error::Import { line: 2, .. })));
    }
}
