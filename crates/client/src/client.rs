//! Typed client for the emissions API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use emissions_core::{FacilityTotal, RawQuery, StatsReport, StoredEntry};
use reqwest::{Method, RequestBuilder, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ClientError;

/// Default server address.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = concat!("emissions-client/", env!("CARGO_PKG_VERSION"));

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL (default: http://127.0.0.1:5000).
    pub base_url: String,
    /// Request timeout (default: 30s).
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Filters for [`EmissionsClient::cache_entries`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_facility: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidateParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    business_facility: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    expired_only: bool,
}

#[derive(Debug, Deserialize)]
struct Deleted {
    deleted: u64,
}

/// `GET /health` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Emissions API client.
#[derive(Debug, Clone)]
pub struct EmissionsClient {
    http: reqwest::Client,
    base: Arc<Url>,
    config: ClientConfig,
}

impl EmissionsClient {
    /// Create a client for the configured server.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base = parse_base(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ClientError::Network(Arc::new(e)))?;

        Ok(Self { http, base: Arc::new(base), config })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Per-facility totals, served from the cache where possible.
    ///
    /// The query is sent as a JSON body on `GET`, the way the API documents it.
    pub async fn query(&self, query: &RawQuery) -> Result<Vec<FacilityTotal>, ClientError> {
        let request = self.request(Method::GET, "api/emissions")?.json(query);
        self.execute(request).await
    }

    /// Like [`query`](Self::query) but recomputes every total.
    pub async fn query_refresh(&self, query: &RawQuery) -> Result<Vec<FacilityTotal>, ClientError> {
        let request = self
            .request(Method::GET, "api/emissions")?
            .query(&[("refresh", "true")])
            .json(query);
        self.execute(request).await
    }

    pub async fn cache_stats(&self) -> Result<StatsReport, ClientError> {
        let request = self.request(Method::GET, "api/cache/stats")?;
        self.execute(request).await
    }

    pub async fn cache_entries(&self, filter: &EntriesQuery) -> Result<Vec<StoredEntry>, ClientError> {
        let request = self.request(Method::GET, "api/cache/entries")?.query(filter);
        self.execute(request).await
    }

    /// Invalidate one facility, purge expired entries, or clear the cache.
    ///
    /// Returns the number of removed entries.
    pub async fn invalidate_cache(&self, facility: Option<&str>, expired_only: bool) -> Result<u64, ClientError> {
        let params = InvalidateParams { business_facility: facility, expired_only };
        let request = self.request(Method::DELETE, "api/cache")?.query(&params);
        let Deleted { deleted } = self.execute(request).await?;
        Ok(deleted)
    }

    pub async fn health(&self) -> Result<Health, ClientError> {
        let request = self.request(Method::GET, "health")?;
        self.execute(request).await
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))?;
        Ok(self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json"))
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().path().to_string();
        let bytes = response.bytes().await?;

        tracing::debug!(
            server = %self.config.base_url,
            path = %url,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "emissions API response"
        );

        if !status.is_success() {
            return Err(ClientError::from_response(status.as_u16(), &bytes));
        }
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Parse(e.to_string()))
    }
}

/// Parse a base URL, ensuring relative joins land under its path.
fn parse_base(raw: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| ClientError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidUrl(format!("{raw}: unsupported scheme '{}'", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
