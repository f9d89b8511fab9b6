//! Client error types.

use std::sync::Arc;

use serde::Deserialize;

/// Errors from the emissions API client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The base URL could not be parsed or joined.
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Connection or transport failure.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// The server answered with an error response.
    #[error("{code} ({status}): {message}{}", details_suffix(.details))]
    Api { status: u16, code: String, message: String, details: Vec<String> },

    /// Response body did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),
}

fn details_suffix(details: &[String]) -> String {
    if details.is_empty() { String::new() } else { format!(" [{}]", details.join("; ")) }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ClientError::Timeout } else { ClientError::Network(Arc::new(err)) }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    code: String,
    message: String,
    #[serde(default)]
    details: Vec<IssuePayload>,
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    field: String,
    reason: String,
}

impl ClientError {
    /// Build an `Api` error from a non-success response body.
    ///
    /// Bodies that are not the server's error envelope keep their raw text.
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorEnvelope>(body) {
            Ok(ErrorEnvelope { error }) => ClientError::Api {
                status,
                code: error.code,
                message: error.message,
                details: error
                    .details
                    .into_iter()
                    .map(|issue| format!("{}: {}", issue.field, issue.reason))
                    .collect(),
            },
            Err(_) => ClientError::Api {
                status,
                code: "HTTP_ERROR".into(),
                message: String::from_utf8_lossy(body).trim().to_string(),
                details: Vec::new(),
            },
        }
    }

    /// Whether the server rejected the request as invalid.
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Api { code, .. } if code == "VALIDATION_ERROR")
    }
}
