//! HTTP error responses: every failure is `{"error": "..."}` with a status.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use codegenesis_core::error::CodeGenesisError;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    /// No usable model provider key in headers or the vault.
    MissingApiKey,
    BadRequest(String),
    NotFound(String),
    RateLimited,
    Unavailable(String),
    Internal(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::MissingApiKey => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(self) -> String {
        match self {
            ApiError::Unauthorized => "Unauthorized".into(),
            ApiError::MissingApiKey => {
                "No valid API key provided. Please configure your API keys in Settings.".into()
            }
            ApiError::RateLimited => "Too many requests".into(),
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Unavailable(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        observe(status);
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

#[cfg(feature = "metrics")]
fn observe(status: StatusCode) {
    if status.is_server_error() {
        crate::metrics::record_error(status.as_str());
    }
}

#[cfg(not(feature = "metrics"))]
fn observe(_status: StatusCode) {}

impl From<CodeGenesisError> for ApiError {
    fn from(e: CodeGenesisError) -> Self {
        match e {
            CodeGenesisError::Auth(_) => ApiError::Unauthorized,
            CodeGenesisError::NotFound(m) => ApiError::NotFound(m),
            CodeGenesisError::InvalidInput(m) => ApiError::BadRequest(m),
            CodeGenesisError::Generation(m) => {
                error!(error = %m, "Generation failed");
                ApiError::Internal(m)
            }
            other => {
                // Provider details stay in the log.
                error!(error = %other, "Request failed");
                ApiError::Internal("Internal server error".into())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ApiError::from(CodeGenesisError::Auth("bad".into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(CodeGenesisError::InvalidInput("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        let store = ApiError::from(CodeGenesisError::store("23505", "duplicate key"));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.message(), "Internal server error");

        let missing = ApiError::MissingApiKey;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert!(missing.message().starts_with("No valid API key"));
    }
}
