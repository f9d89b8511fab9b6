//! Core types and shared functionality for the emissions API.
//!
//! This crate provides:
//! - Validated query types and the wire payloads shared with clients
//! - The query cache service that fronts the emissions data store
//! - Cache store backends (SQLite, in-memory, optional Redis)
//! - The SQLite-backed emissions record store and CSV import
//! - Unified error types and layered configuration

pub mod cache;
pub mod config;
mod db;
pub mod error;
pub mod query;
pub mod service;
pub mod store;

pub use cache::{CacheDb, CacheStore, CachedTotal, MemoryCache, StoredEntry, open_cache};
pub use config::{AppConfig, CacheBackendKind, ConfigError};
pub use error::{Error, FieldIssue, ValidationError};
pub use query::{DateRange, EmissionsQuery, EntryFilter, FacilityTotal, RawQuery};
pub use service::{CacheStats, Lookup, QueryCache, StatsReport};
pub use store::{EmissionRecord, EmissionsSource, RecordsDb};
