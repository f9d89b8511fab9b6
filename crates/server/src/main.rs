//! emissions-api server entry point.
//!
//! Loads configuration, opens the record and cache stores, and serves the
//! HTTP API until interrupted. Logs are JSON on stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use emissions_core::{AppConfig, QueryCache, RecordsDb, open_cache};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod error;
mod routes;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;

    let records = RecordsDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening records database {}", config.db_path.display()))?;
    if let Some(dataset) = &config.dataset_path {
        records.load_dataset(dataset.clone()).await?;
    }
    tracing::info!(records = records.record_count().await?, db = %config.db_path.display(), "records ready");

    let cache = open_cache(&config).await?;
    let service = Arc::new(QueryCache::new(Arc::clone(&cache), Arc::new(records), config.cache_ttl()));
    let purge = config.purge_interval().map(|period| service.spawn_purge_task(period));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        backend = cache.backend(),
        ttl_secs = config.cache_ttl_secs,
        "Starting emissions API"
    );

    let app = routes::router(routes::AppState { service, max_body_bytes: config.max_body_bytes });
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(task) = purge {
        task.abort();
    }
    cache.close().await?;
    tracing::info!("Shut down emissions API");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
