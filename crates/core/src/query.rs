//! Emissions query types and request validation.
//!
//! A request body is first deserialized leniently into [`RawQuery`] and then
//! turned into an [`EmissionsQuery`] by a single fallible step that collects
//! every problem it finds before failing.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{FieldIssue, ValidationError};

/// Wire format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Request payload as received, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuery {
    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default)]
    pub end_date: Option<String>,

    #[serde(default)]
    pub business_facility: Option<Vec<String>>,
}

impl RawQuery {
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>, facilities: &[&str]) -> Self {
        Self {
            start_date: Some(start_date.into()),
            end_date: Some(end_date.into()),
            business_facility: Some(facilities.iter().map(|f| f.to_string()).collect()),
        }
    }

    /// Deserialize a request body.
    ///
    /// Malformed JSON is reported as a validation failure on the body itself.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::single("body", "request body is required"));
        }
        serde_json::from_slice(body).map_err(|e| ValidationError::single("body", format!("invalid JSON: {e}")))
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::single("endDate", reversed_reason(start, end)));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Whether the two ranges share at least one day.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        !(self.end < other.start || self.start > other.end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.format(DATE_FORMAT), self.end.format(DATE_FORMAT))
    }
}

/// A validated emissions query.
///
/// Invariants: the range is ordered, the facility list is non-empty, and
/// facility names are trimmed, non-blank, and unique (first occurrence wins).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionsQuery {
    range: DateRange,
    facilities: Vec<String>,
}

impl EmissionsQuery {
    /// Build a query from already-typed parts.
    pub fn new(start: NaiveDate, end: NaiveDate, facilities: Vec<String>) -> Result<Self, ValidationError> {
        let mut issues = Vec::new();
        if start > end {
            issues.push(FieldIssue::new("endDate", reversed_reason(start, end)));
        }
        let facilities = normalize_facilities(Some(facilities), &mut issues);

        if issues.is_empty() {
            Ok(Self { range: DateRange { start, end }, facilities })
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Validate a raw request, reporting every issue at once.
    pub fn parse(raw: RawQuery) -> Result<Self, ValidationError> {
        let mut issues = Vec::new();

        let start = parse_date("startDate", raw.start_date.as_deref(), &mut issues);
        let end = parse_date("endDate", raw.end_date.as_deref(), &mut issues);
        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            issues.push(FieldIssue::new("endDate", reversed_reason(start, end)));
        }

        let facilities = normalize_facilities(raw.business_facility, &mut issues);

        match (start, end) {
            (Some(start), Some(end)) if issues.is_empty() => Ok(Self { range: DateRange { start, end }, facilities }),
            _ => Err(ValidationError { issues }),
        }
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn facilities(&self) -> &[String] {
        &self.facilities
    }
}

impl TryFrom<RawQuery> for EmissionsQuery {
    type Error = ValidationError;

    fn try_from(raw: RawQuery) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

/// Aggregated emissions for one facility over the queried range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityTotal {
    pub business_facility: String,
    pub total_emissions: f64,
}

/// Selection over cached entries, used for inspection only.
///
/// An entry matches when its range overlaps the filter range (if any) and its
/// facility equals the filter facility (if any).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub range: Option<DateRange>,
    pub facility: Option<String>,
}

impl EntryFilter {
    /// Build a filter from optional wire values. Both dates or neither must be given.
    pub fn parse(start: Option<&str>, end: Option<&str>, facility: Option<&str>) -> Result<Self, ValidationError> {
        let mut issues = Vec::new();
        let range = match (start, end) {
            (None, None) => None,
            (start, end) => {
                let start = parse_date("startDate", start, &mut issues);
                let end = parse_date("endDate", end, &mut issues);
                match (start, end) {
                    (Some(start), Some(end)) if start > end => {
                        issues.push(FieldIssue::new("endDate", reversed_reason(start, end)));
                        None
                    }
                    (Some(start), Some(end)) => Some(DateRange { start, end }),
                    _ => None,
                }
            }
        };

        let facility = facility.map(str::trim).filter(|f| !f.is_empty()).map(String::from);

        if issues.is_empty() { Ok(Self { range, facility }) } else { Err(ValidationError { issues }) }
    }

    pub fn matches(&self, range: &DateRange, facility: &str) -> bool {
        self.range.is_none_or(|r| r.overlaps(range)) && self.facility.as_deref().is_none_or(|f| f == facility)
    }
}

fn parse_date(field: &str, value: Option<&str>, issues: &mut Vec<FieldIssue>) -> Option<NaiveDate> {
    let Some(value) = value else {
        issues.push(FieldIssue::new(field, "is required"));
        return None;
    };

    match NaiveDate::parse_from_str(value.trim(), DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            issues.push(FieldIssue::new(field, format!("expected YYYY-MM-DD, got '{value}'")));
            None
        }
    }
}

fn normalize_facilities(raw: Option<Vec<String>>, issues: &mut Vec<FieldIssue>) -> Vec<String> {
    let raw = raw.unwrap_or_default();
    if raw.is_empty() {
        issues.push(FieldIssue::new("businessFacility", "must contain at least one facility"));
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut facilities = Vec::with_capacity(raw.len());
    for (idx, name) in raw.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            issues.push(FieldIssue::new(format!("businessFacility[{idx}]"), "must not be blank"));
            continue;
        }
        if seen.insert(name) {
            facilities.push(name.to_string());
        }
    }
    facilities
}

fn reversed_reason(start: NaiveDate, end: NaiveDate) -> String {
    format!("must not be before startDate ({} > {})", start.format(DATE_FORMAT), end.format(DATE_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_parse_valid_query() {
        let raw = RawQuery::new("2023-01-01", "2023-06-30", &["GreenEat Changi", "GreenEat Orchard"]);
        let query = EmissionsQuery::parse(raw).unwrap();

        assert_eq!(query.range().start, date("2023-01-01"));
        assert_eq!(query.range().end, date("2023-06-30"));
        assert_eq!(query.facilities(), ["GreenEat Changi", "GreenEat Orchard"]);
    }

    #[test]
    fn test_parse_deduplicates_facilities_keeping_first_order() {
        let raw = RawQuery::new("2023-01-01", "2023-01-31", &["B", "A", " B ", "A", "C"]);
        let query = EmissionsQuery::parse(raw).unwrap();
        assert_eq!(query.facilities(), ["B", "A", "C"]);
    }

    #[test]
    fn test_parse_single_day_range() {
        let raw = RawQuery::new("2023-03-15", "2023-03-15", &["GreenEat Changi"]);
        assert!(EmissionsQuery::parse(raw).is_ok());
    }

    #[test]
    fn test_parse_rejects_reversed_range() {
        let raw = RawQuery::new("2023-06-30", "2023-01-01", &["GreenEat Changi"]);
        let err = EmissionsQuery::parse(raw).unwrap_err();
        assert!(err.has_field("endDate"));
        assert_eq!(err.issues.len(), 1);
    }

    #[test]
    fn test_parse_rejects_empty_facilities() {
        let raw = RawQuery::new("2023-01-01", "2023-06-30", &[]);
        let err = EmissionsQuery::parse(raw).unwrap_err();
        assert!(err.has_field("businessFacility"));
    }

    #[test]
    fn test_parse_rejects_missing_facilities() {
        let raw = RawQuery { business_facility: None, ..RawQuery::new("2023-01-01", "2023-06-30", &[]) };
        let err = EmissionsQuery::parse(raw).unwrap_err();
        assert!(err.has_field("businessFacility"));
    }

    #[test]
    fn test_parse_reports_all_issues_at_once() {
        let raw = RawQuery { start_date: None, end_date: Some("30/06/2023".into()), business_facility: Some(vec![]) };
        let err = EmissionsQuery::parse(raw).unwrap_err();

        assert_eq!(err.issues.len(), 3);
        assert!(err.has_field("startDate"));
        assert!(err.has_field("endDate"));
        assert!(err.has_field("businessFacility"));
    }

    #[test]
    fn test_parse_rejects_blank_facility_names() {
        let raw = RawQuery::new("2023-01-01", "2023-06-30", &["GreenEat Changi", "  "]);
        let err = EmissionsQuery::parse(raw).unwrap_err();
        assert!(err.has_field("businessFacility[1]"));
    }

    #[test]
    fn test_parse_rejects_impossible_date() {
        let raw = RawQuery::new("2023-02-30", "2023-06-30", &["GreenEat Changi"]);
        let err = EmissionsQuery::parse(raw).unwrap_err();
        assert!(err.has_field("startDate"));
    }

    #[test]
    fn test_from_json_wire_names() {
        let body = br#"{"startDate":"2020-02-08","endDate":"2023-08-23","businessFacility":["GreenEat Changi","Fresh Kitchen Fusionopolis"]}"#;
        let raw = RawQuery::from_json(body).unwrap();
        assert_eq!(raw.start_date.as_deref(), Some("2020-02-08"));
        assert_eq!(raw.business_facility.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_from_json_rejects_empty_and_malformed_bodies() {
        assert!(RawQuery::from_json(b"  ").unwrap_err().has_field("body"));
        assert!(RawQuery::from_json(b"{not json").unwrap_err().has_field("body"));
        assert!(RawQuery::from_json(br#"{"businessFacility":"GreenEat Changi"}"#).unwrap_err().has_field("body"));
    }

    #[test]
    fn test_new_validates_like_parse() {
        assert!(EmissionsQuery::new(date("2023-02-01"), date("2023-01-01"), vec!["A".into()]).is_err());
        assert!(EmissionsQuery::new(date("2023-01-01"), date("2023-02-01"), vec![]).is_err());
        let query = EmissionsQuery::new(date("2023-01-01"), date("2023-02-01"), vec!["A".into(), "A".into()]).unwrap();
        assert_eq!(query.facilities(), ["A"]);
    }

    #[test]
    fn test_range_overlap() {
        let h1 = DateRange::new(date("2023-01-01"), date("2023-06-30")).unwrap();
        let h2 = DateRange::new(date("2023-07-01"), date("2023-12-31")).unwrap();
        let mid = DateRange::new(date("2023-06-30"), date("2023-07-01")).unwrap();

        assert!(!h1.overlaps(&h2));
        assert!(h1.overlaps(&mid));
        assert!(h2.overlaps(&mid));
        assert!(h1.contains(date("2023-06-30")));
        assert!(!h1.contains(date("2023-07-01")));
    }

    #[test]
    fn test_facility_total_wire_format() {
        let total = FacilityTotal { business_facility: "GreenEat Changi".into(), total_emissions: 12.5 };
        let json = serde_json::to_value(&total).unwrap();
        assert_eq!(json, serde_json::json!({"businessFacility": "GreenEat Changi", "totalEmissions": 12.5}));
    }

    #[test]
    fn test_entry_filter() {
        let h1 = DateRange::new(date("2023-01-01"), date("2023-06-30")).unwrap();
        let h2 = DateRange::new(date("2023-07-01"), date("2023-12-31")).unwrap();

        let all = EntryFilter::parse(None, None, None).unwrap();
        assert!(all.matches(&h1, "GreenEat Changi"));

        let filter = EntryFilter::parse(Some("2023-06-01"), Some("2023-06-30"), Some(" GreenEat Changi ")).unwrap();
        assert!(filter.matches(&h1, "GreenEat Changi"));
        assert!(!filter.matches(&h2, "GreenEat Changi"));
        assert!(!filter.matches(&h1, "GreenEat Orchard"));
    }

    #[test]
    fn test_entry_filter_requires_both_dates() {
        let err = EntryFilter::parse(Some("2023-01-01"), None, None).unwrap_err();
        assert!(err.has_field("endDate"));

        let err = EntryFilter::parse(Some("2023-02-01"), Some("2023-01-01"), None).unwrap_err();
        assert!(err.has_field("endDate"));
    }
}
