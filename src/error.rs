use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the tracking store and its HTTP surface.
///
/// `Validation` is the client-error category; every other variant is a
/// storage failure. "Nothing matched" is never an error: deletes return a
/// zero count and lookups return `None`.
#[derive(Debug, Error)]
pub enum TrackError {
    /// Malformed caller-supplied input (filters, ids, record fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Query or connection failure in the underlying database
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A JSON column could not be encoded or decoded
    #[error("Invalid JSON in column '{column}': {source}")]
    Json {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Another store instance holds the write lock for this path
    #[error("Store at {0:?} is already open by another instance")]
    Locked(PathBuf),

    /// The store was closed
    #[error("Store is closed")]
    Closed,

    /// Filesystem failure (lock file, parent directory)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrackError>;

impl TrackError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn json(column: &'static str, source: serde_json::Error) -> Self {
        Self::Json { column, source }
    }

    /// True for errors caused by the caller's input rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for TrackError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if !self.is_client_error() {
            tracing::error!(error = %self, "Storage operation failed");
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &TrackError) -> &'static str {
    match error {
        TrackError::Validation(_) => "validation_error",
        TrackError::Database(_) => "storage_error",
        TrackError::Json { .. } => "serialization_error",
        TrackError::Locked(_) => "store_locked",
        TrackError::Closed => "store_closed",
        TrackError::Io(_) => "io_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TrackError::validation("Invalid log IDs format");
        assert_eq!(error.to_string(), "Validation error: Invalid log IDs format");
    }

    #[test]
    fn test_error_type_name() {
        assert_eq!(error_type_name(&TrackError::validation("x")), "validation_error");
        assert_eq!(error_type_name(&TrackError::Closed), "store_closed");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(TrackError::validation("bad").is_client_error());
        assert!(!TrackError::Closed.is_client_error());
        assert!(!TrackError::Database(sqlx::Error::PoolClosed).is_client_error());
    }

    #[tokio::test]
    async fn test_error_response() {
        let response = TrackError::validation("No deletion criteria provided").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = TrackError::Closed.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
