//! Command-line arguments.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use emissions_client::client::DEFAULT_BASE_URL;
use emissions_core::query::DATE_FORMAT;

#[derive(Debug, Parser)]
#[command(name = "emissions")]
#[command(about = "Query facility CO2 emissions and manage the query cache.")]
#[command(version)]
pub struct Cli {
    /// Emissions API base URL
    #[arg(long, global = true, env = "EMISSIONS_SERVER", default_value = DEFAULT_BASE_URL)]
    pub server: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Total emissions per facility over a date range
    Query(QueryArgs),

    /// Load a CSV dataset into the records database (offline)
    Import(ImportArgs),

    /// Inspect or invalidate the server's query cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// First day of the range (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub start: NaiveDate,

    /// Last day of the range, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub end: NaiveDate,

    /// Business facility name; repeat for several
    #[arg(long = "facility", short = 'f', required = true, num_args = 1..)]
    pub facilities: Vec<String>,

    /// Recompute instead of reading cached totals
    #[arg(long)]
    pub refresh: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// CSV file with TRANSACTION DATE, Business Facility and CO2_ITEM columns
    pub csv: PathBuf,

    /// Records database (defaults to the configured db_path)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Hit/miss counters and entry count
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List cached entries
    Entries {
        /// Only entries overlapping this range start (requires --end)
        #[arg(long, value_parser = parse_date, requires = "end")]
        start: Option<NaiveDate>,

        /// Only entries overlapping this range end (requires --start)
        #[arg(long, value_parser = parse_date, requires = "start")]
        end: Option<NaiveDate>,

        /// Only entries for this facility
        #[arg(long)]
        facility: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove entries: one facility, expired only, or everything
    Purge {
        /// Only this facility's entries
        #[arg(long, conflicts_with = "expired")]
        facility: Option<String>,

        /// Only expired entries
        #[arg(long)]
        expired: bool,
    },
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| format!("expected YYYY-MM-DD, got '{raw}'"))
}
