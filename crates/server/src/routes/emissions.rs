//! Emissions totals endpoint.

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use emissions_core::{EmissionsQuery, FacilityTotal, Lookup, RawQuery, ValidationError};
use serde::Deserialize;

use super::{AppState, query_error};
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct TotalsParams {
    /// Skip cache reads for this request.
    #[serde(default)]
    refresh: bool,
}

/// `GET|POST /api/emissions`
///
/// The JSON body is read regardless of `Content-Type`, including on `GET`.
pub async fn totals(
    State(state): State<AppState>, params: Result<Query<TotalsParams>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Vec<FacilityTotal>>, ApiError> {
    let Query(params) = params.map_err(query_error)?;
    let body = body.map_err(|rejection| body_error(&rejection, state.max_body_bytes))?;

    let query = EmissionsQuery::parse(RawQuery::from_json(&body)?)?;
    let lookup = if params.refresh { Lookup::Refresh } else { Lookup::Cached };

    let totals = state.service.totals_with(&query, lookup).await?;
    tracing::info!(
        range = %query.range(),
        facilities = totals.len(),
        refresh = params.refresh,
        "served emissions totals"
    );
    Ok(Json(totals))
}

fn body_error(rejection: &BytesRejection, limit: usize) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { limit }
    } else {
        ValidationError::single("body", rejection.body_text()).into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::StatusCode;
    use emissions_core::{DateRange, EmissionsSource, Error, MemoryCache, QueryCache};
    use serde_json::json;

    use super::super::testing::*;
    use super::super::{AppState, router};

    fn body(start: &str, end: &str, facilities: &[&str]) -> serde_json::Value {
        json!({ "startDate": start, "endDate": end, "businessFacility": facilities })
    }

    #[tokio::test]
    async fn test_totals_one_entry_per_facility() {
        let (app, _) = test_app().await;
        let request = body("2023-01-01", "2023-06-30", &["GreenEat Changi", "GreenEat Orchard", "GreenEat Changi"]);
        let (status, totals) = send(&app, "GET", "/api/emissions", Some(request)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            totals,
            json!([
                { "businessFacility": "GreenEat Changi", "totalEmissions": 4.0 },
                { "businessFacility": "GreenEat Orchard", "totalEmissions": 7.25 },
            ])
        );
    }

    #[tokio::test]
    async fn test_repeated_request_is_served_from_cache() {
        let (app, state) = test_app().await;
        let request = body("2020-02-08", "2023-08-23", &["GreenEat Changi", "Fresh Kitchen Fusionopolis"]);

        let (_, first) = send(&app, "POST", "/api/emissions", Some(request.clone())).await;
        let (_, second) = send(&app, "GET", "/api/emissions", Some(request)).await;

        assert_eq!(first, second);
        assert_eq!(first[0]["totalEmissions"], 14.0);
        let stats = state.service.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn test_refresh_skips_cache_reads() {
        let (app, state) = test_app().await;
        let request = body("2023-01-01", "2023-06-30", &["GreenEat Changi"]);

        send(&app, "GET", "/api/emissions", Some(request.clone())).await;
        let (status, _) = send(&app, "GET", "/api/emissions?refresh=true", Some(request)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.service.stats().misses, 2);
        assert_eq!(state.service.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_reversed_range_is_rejected() {
        let (app, _) = test_app().await;
        let (status, err) =
            send(&app, "GET", "/api/emissions", Some(body("2023-06-30", "2023-01-01", &["GreenEat Changi"]))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(err["error"]["details"][0]["field"], "endDate");
    }

    #[tokio::test]
    async fn test_empty_facilities_and_bad_dates_reported_together() {
        let (app, _) = test_app().await;
        let (status, err) = send(&app, "GET", "/api/emissions", Some(body("2023-13-01", "soon", &[]))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<_> =
            err["error"]["details"].as_array().unwrap().iter().map(|d| d["field"].as_str().unwrap()).collect();
        assert_eq!(fields, ["startDate", "endDate", "businessFacility"]);
    }

    #[tokio::test]
    async fn test_missing_body_is_rejected() {
        let (app, _) = test_app().await;
        let (status, err) = send(&app, "GET", "/api/emissions", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["details"][0]["field"], "body");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let (app, _) = test_app().await;
        let facilities: Vec<String> = (0..500).map(|i| format!("Facility {i}")).collect();
        let request = json!({ "startDate": "2023-01-01", "endDate": "2023-06-30", "businessFacility": facilities });
        let (status, err) = send(&app, "GET", "/api/emissions", Some(request)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_bad_refresh_flag_is_rejected() {
        let (app, _) = test_app().await;
        let request = body("2023-01-01", "2023-06-30", &["GreenEat Changi"]);
        let (status, err) = send(&app, "GET", "/api/emissions?refresh=maybe", Some(request)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["details"][0]["field"], "query");
    }

    struct BrokenSource;

    #[async_trait]
    impl EmissionsSource for BrokenSource {
        async fn total_emissions(&self, _facility: &str, _range: &DateRange) -> Result<f64, Error> {
            Err(Error::DataStore("database is locked".into()))
        }
    }

    #[tokio::test]
    async fn test_data_store_failure_is_server_error() {
        let service = QueryCache::new(Arc::new(MemoryCache::new()), Arc::new(BrokenSource), TTL);
        let app = router(AppState { service: Arc::new(service), max_body_bytes: 4096 });

        let (status, err) =
            send(&app, "GET", "/api/emissions", Some(body("2023-01-01", "2023-06-30", &["GreenEat Changi"]))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err["error"]["code"], "DATA_STORE_ERROR");
    }
}
