//! Plain-text rendering of API responses.

use std::fmt::Write;

use emissions_core::query::DATE_FORMAT;
use emissions_core::{FacilityTotal, StatsReport, StoredEntry};

/// Facility totals as an aligned two-column table.
pub fn totals_table(totals: &[FacilityTotal]) -> String {
    let width = column_width("FACILITY", totals.iter().map(|t| t.business_facility.as_str()));
    let mut out = format!("{:<width$}  {:>14}\n", "FACILITY", "TOTAL CO2");
    for total in totals {
        let _ = writeln!(out, "{:<width$}  {:>14.4}", total.business_facility, total.total_emissions);
    }
    out
}

pub fn stats_lines(report: &StatsReport) -> String {
    let c = &report.counters;
    let lookups = c.hits + c.misses;
    let hit_rate = if lookups == 0 { 0.0 } else { c.hits as f64 * 100.0 / lookups as f64 };

    format!(
        "backend:      {}\nentries:      {}\nttl:          {}s\nhits:         {} ({hit_rate:.1}%)\nmisses:       {}\ncoalesced:    {}\nread errors:  {}\nwrite errors: {}\n",
        report.backend, report.entries, report.ttl_secs, c.hits, c.misses, c.coalesced, c.read_errors, c.write_errors,
    )
}

pub fn entries_table(entries: &[StoredEntry]) -> String {
    if entries.is_empty() {
        return "no cached entries\n".to_string();
    }

    let width = column_width("FACILITY", entries.iter().map(|e| e.value.business_facility.as_str()));
    let mut out = format!("{:<width$}  {:<10}  {:<10}  {:>14}  EXPIRES\n", "FACILITY", "START", "END", "TOTAL CO2");
    for entry in entries {
        let _ = writeln!(
            out,
            "{:<width$}  {}  {}  {:>14.4}  {}",
            entry.value.business_facility,
            entry.value.start_date.format(DATE_FORMAT),
            entry.value.end_date.format(DATE_FORMAT),
            entry.value.total_emissions,
            entry.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
    }
    out
}

fn column_width<'a>(header: &str, values: impl Iterator<Item = &'a str>) -> usize {
    values.map(|v| v.chars().count()).chain([header.len()]).max().unwrap_or_default()
}
