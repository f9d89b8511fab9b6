//! HTTP client for the emissions API.
//!
//! Wraps the server's JSON endpoints in typed calls, reusing the wire types
//! from `emissions-core`.

pub mod client;
pub mod error;

pub use client::{ClientConfig, EmissionsClient, EntriesQuery, Health};
pub use error::ClientError;
