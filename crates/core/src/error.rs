//! Unified error types for the emissions API.
//!
//! Display strings are prefixed with a stable code so that callers and logs
//! can classify failures without matching on variants.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite;

/// Unified error types for the emissions API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request could not be turned into a valid query.
    #[error("VALIDATION_ERROR: {0}")]
    Validation(ValidationError),

    /// The aggregation against the emissions records failed.
    #[error("DATA_STORE_ERROR: {0}")]
    DataStore(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A non-SQLite cache backend failed.
    #[error("CACHE_ERROR: {0}")]
    Cache(String),

    /// A dataset row could not be imported.
    #[error("IMPORT_ERROR: line {line}: {reason}")]
    Import { line: u64, reason: String },
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::DataStore(_) => "DATA_STORE_ERROR",
            Error::Database(_) | Error::MigrationFailed(_) | Error::Cache(_) => "CACHE_ERROR",
            Error::Import { .. } => "IMPORT_ERROR",
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

/// A single problem found while validating a request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Wire name of the offending field (e.g. `startDate`).
    pub field: String,
    pub reason: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Every issue found in one validation pass.
///
/// Never empty when returned as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { issues: vec![FieldIssue::new(field, reason)] }
    }

    /// Whether any issue concerns the given field.
    pub fn has_field(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        f.write_str(&joined)
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DataStore("connection reset".to_string());
        assert!(err.to_string().contains("DATA_STORE_ERROR"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_validation_display_joins_issues() {
        let err = ValidationError {
            issues: vec![
                FieldIssue::new("startDate", "is required"),
                FieldIssue::new("businessFacility", "must not be empty"),
            ],
        };
        let text = Error::from(err).to_string();
        assert_eq!(text, "VALIDATION_ERROR: startDate: is required; businessFacility: must not be empty");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Cache("down".into()).code(), "CACHE_ERROR");
        assert_eq!(Error::MigrationFailed("bad".into()).code(), "CACHE_ERROR");
        assert_eq!(Error::Import { line: 3, reason: "bad date".into() }.code(), "IMPORT_ERROR");
        assert_eq!(Error::from(ValidationError::single("endDate", "x")).code(), "VALIDATION_ERROR");
    }
}
