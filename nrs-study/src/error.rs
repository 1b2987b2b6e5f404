//! Error types for the administrative JSON routes
//!
//! Participant-facing pages never surface these: they redirect or
//! re-render instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 404
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// 400
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or wrong admin token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Study store error: {0}")]
    Store(#[from] nrs_common::Error),
}

impl ApiError {
    /// HTTP status and machine-readable code
    fn status_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) | ApiError::Store(nrs_common::Error::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            ApiError::BadRequest(_) | ApiError::Store(nrs_common::Error::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        }
    }

    fn message(self) -> String {
        match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Unauthorized(msg) => msg,
            ApiError::Store(nrs_common::Error::NotFound(msg) | nrs_common::Error::InvalidInput(msg)) => msg,
            ApiError::Store(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_code();
        let body = json!({
            "error": {
                "code": code,
                "message": self.message(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Result type for admin handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_status() {
        let not_found = ApiError::from(nrs_common::Error::NotFound("Article 9".into()));
        assert_eq!(not_found.status_code(), (StatusCode::NOT_FOUND, "NOT_FOUND"));
        assert_eq!(not_found.message(), "Article 9");

        let config = ApiError::from(nrs_common::Error::Config("bad".into()));
        assert_eq!(config.status_code().0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
