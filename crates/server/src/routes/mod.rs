//! HTTP routes.
//!
//! - `GET|POST /api/emissions` - per-facility totals for a date range
//! - `GET /api/cache/stats` - counters and live entry count
//! - `GET /api/cache/entries` - cached entries, optionally filtered
//! - `DELETE /api/cache` - invalidate, purge expired, or clear
//! - `GET /health` - liveness

mod cache;
mod emissions;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::QueryRejection;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use emissions_core::{QueryCache, ValidationError};

use crate::error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueryCache>,
    pub max_body_bytes: usize,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let limit = state.max_body_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/api/emissions", get(emissions::totals).post(emissions::totals))
        .route("/api/cache", delete(cache::invalidate))
        .route("/api/cache/stats", get(cache::stats))
        .route("/api/cache/entries", get(cache::entries))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

/// Report a malformed query string the same way as a malformed body.
fn query_error(rejection: QueryRejection) -> ApiError {
    ValidationError::single("query", rejection.body_text()).into()
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_route_uses_error_shape() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, "GET", "/api/nothing", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}
