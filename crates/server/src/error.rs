//! HTTP error responses.
//!
//! Every failure is rendered as `{"error": {"code", "message", "details"}}`
//! where `code` is the stable code of the underlying [`Error`].

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use emissions_core::{Error, FieldIssue, ValidationError};
use serde::Serialize;

/// Errors returned by route handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error("NOT_FOUND: no route for {0}")]
    NotFound(String),

    #[error("PAYLOAD_TOO_LARGE: request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Core(Error::Validation(err))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    details: &'a [FieldIssue],
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(Error::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Core(err) => err.code(),
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details) = match &self {
            ApiError::Core(Error::Validation(v)) => ("invalid request".to_string(), v.issues.as_slice()),
            other => (other.to_string(), &[][..]),
        };

        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %message, "request failed");
        } else {
            tracing::debug!(code = self.code(), issues = details.len(), "rejected request");
        }

        let body = ErrorBody { error: ErrorDetail { code: self.code(), message, details } };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_error_lists_issues() {
        let err = ValidationError {
            issues: vec![FieldIssue::new("startDate", "is required"), FieldIssue::new("endDate", "is required")],
        };
        let (status, body) = render(err.into()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"].as_array().unwrap().len(), 2);
        assert_eq!(body["error"]["details"][0]["field"], "startDate");
    }

    #[tokio::test]
    async fn test_data_store_error_is_server_error() {
        let (status, body) = render(Error::DataStore("disk I/O error".into()).into()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "DATA_STORE_ERROR");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn test_client_error_codes() {
        let (status, body) = render(ApiError::NotFound("/api/nope".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, body) = render(ApiError::PayloadTooLarge { limit: 1024 }).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["message"], "PAYLOAD_TOO_LARGE: request body exceeds 1024 bytes");
    }
}
