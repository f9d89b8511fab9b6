//! emissions command-line client.
//!
//! Talks to a running emissions API for queries and cache management; the
//! `import` command works offline against the records database.

mod cli;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use emissions_client::{ClientConfig, EmissionsClient, EntriesQuery};
use emissions_core::query::DATE_FORMAT;
use emissions_core::{AppConfig, RawQuery, RecordsDb};
use tracing_subscriber::EnvFilter;

use cli::{CacheCommand, Cli, Command, ImportArgs, QueryArgs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Import(args) => import(args).await,
        Command::Query(args) => query(&client(&cli.server)?, args).await,
        Command::Cache(command) => cache(&client(&cli.server)?, command).await,
    }
}

fn client(server: &str) -> Result<EmissionsClient> {
    let config = ClientConfig { base_url: server.to_string(), ..Default::default() };
    let client = EmissionsClient::new(config)?;
    tracing::debug!(server = client.base_url(), "using emissions API");
    Ok(client)
}

async fn query(client: &EmissionsClient, args: QueryArgs) -> Result<()> {
    let facilities: Vec<&str> = args.facilities.iter().map(String::as_str).collect();
    let raw = RawQuery::new(
        args.start.format(DATE_FORMAT).to_string(),
        args.end.format(DATE_FORMAT).to_string(),
        &facilities,
    );

    let result = if args.refresh { client.query_refresh(&raw).await } else { client.query(&raw).await };
    let totals = match result {
        Ok(totals) => totals,
        Err(e) if e.is_validation() => anyhow::bail!("query rejected: {e}"),
        Err(e) => return Err(e).context("querying emissions"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
    } else {
        print!("{}", output::totals_table(&totals));
    }
    Ok(())
}

async fn import(args: ImportArgs) -> Result<()> {
    let db_path = match args.db {
        Some(path) => path,
        None => AppConfig::load()?.db_path,
    };

    let db = RecordsDb::open(&db_path)
        .await
        .with_context(|| format!("opening records database {}", db_path.display()))?;
    let count = db
        .load_dataset(args.csv.clone())
        .await
        .with_context(|| format!("importing {}", args.csv.display()))?;
    let facilities = db.facilities().await?;

    println!("imported {count} records for {} facilities into {}", facilities.len(), db_path.display());
    Ok(())
}

async fn cache(client: &EmissionsClient, command: CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Stats { json } => {
            let report = client.cache_stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", output::stats_lines(&report));
            }
        }
        CacheCommand::Entries { start, end, facility, json } => {
            let filter = EntriesQuery {
                start_date: start.map(|d| d.format(DATE_FORMAT).to_string()),
                end_date: end.map(|d| d.format(DATE_FORMAT).to_string()),
                business_facility: facility,
            };
            let entries = client.cache_entries(&filter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print!("{}", output::entries_table(&entries));
            }
        }
        CacheCommand::Purge { facility, expired } => {
            let deleted = client.invalidate_cache(facility.as_deref(), expired).await?;
            println!("deleted {deleted} cache entries");
        }
    }
    Ok(())
}
