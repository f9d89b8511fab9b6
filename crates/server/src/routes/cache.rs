//! Cache inspection and invalidation endpoints.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use emissions_core::{EntryFilter, StatsReport, StoredEntry, ValidationError};
use serde::{Deserialize, Serialize};

use super::{AppState, query_error};
use crate::error::ApiError;

/// `GET /api/cache/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsReport>, ApiError> {
    Ok(Json(state.service.report().await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesParams {
    start_date: Option<String>,
    end_date: Option<String>,
    business_facility: Option<String>,
}

/// `GET /api/cache/entries`
///
/// With a date range, lists entries whose range overlaps it. Overlap is for
/// inspection only; queries are answered from exact-range entries.
pub async fn entries(
    State(state): State<AppState>, params: Result<Query<EntriesParams>, QueryRejection>,
) -> Result<Json<Vec<StoredEntry>>, ApiError> {
    let Query(params) = params.map_err(query_error)?;
    let filter = EntryFilter::parse(
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        params.business_facility.as_deref(),
    )?;

    let mut entries = state.service.store().entries().await?;
    entries.retain(|entry| filter.matches(&entry.value.range(), &entry.value.business_facility));
    Ok(Json(entries))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateParams {
    business_facility: Option<String>,
    #[serde(default)]
    expired_only: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateResponse {
    deleted: u64,
}

/// `DELETE /api/cache`
///
/// Removes one facility's entries, only expired entries, or everything.
pub async fn invalidate(
    State(state): State<AppState>, params: Result<Query<InvalidateParams>, QueryRejection>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let Query(params) = params.map_err(query_error)?;
    let facility = params.business_facility.as_deref().map(str::trim);

    let deleted = match (facility, params.expired_only) {
        (Some(_), true) => {
            return Err(ValidationError::single("expiredOnly", "cannot be combined with businessFacility").into());
        }
        (Some(""), false) => return Err(ValidationError::single("businessFacility", "must not be blank").into()),
        (Some(name), false) => {
            let deleted = state.service.store().invalidate_facility(name).await?;
            tracing::info!(facility = name, deleted, "invalidated facility cache entries");
            deleted
        }
        (None, true) => state.service.purge_expired().await?,
        (None, false) => {
            let deleted = state.service.store().clear().await?;
            tracing::info!(deleted, "cleared cache");
            deleted
        }
    };

    Ok(Json(InvalidateResponse { deleted }))
}
