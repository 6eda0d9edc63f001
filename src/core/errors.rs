use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::llm::ProviderError;

/// Request-level error for every pipeline and handler operation.
///
/// Variants map the failure taxonomy onto HTTP: validation is rejected with
/// 400 before any external call, a missing credential is 401, provider
/// statuses are propagated verbatim through `Upstream`, and store failures
/// surface the persistence layer's message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream error ({status}): {detail}")]
    Upstream { status: u16, detail: String },
    #[error("storage error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Store(err.to_string())
    }

    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status { status, detail } => ApiError::Upstream { status, detail },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Upstream { status, detail } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                detail.clone(),
            ),
            ApiError::Store(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_is_propagated_verbatim() {
        let err = ApiError::from(ProviderError::Status {
            status: 402,
            detail: "Insufficient credits".to_string(),
        });
        match err {
            ApiError::Upstream { status, detail } => {
                assert_eq!(status, 402);
                assert_eq!(detail, "Insufficient credits");
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn transport_errors_become_internal() {
        let err = ApiError::from(ProviderError::Transport("timeout".to_string()));
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
