//! HTTP error responses
//!
//! Every failure becomes `{"error": {"code", "message", "retryable"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or expired session (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// echo-common error, mapped by kind
    #[error(transparent)]
    Common(#[from] echo_common::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        use echo_common::Error as E;
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Common(err) => match err {
                E::Auth(_) => StatusCode::UNAUTHORIZED,
                E::Locked(_) => StatusCode::FORBIDDEN,
                E::NotFound(_) => StatusCode::NOT_FOUND,
                E::InvalidInput(_) => StatusCode::BAD_REQUEST,
                E::InvalidState(_) => StatusCode::CONFLICT,
                E::Permission(_) | E::Store(_) | E::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
                E::Upload(_) => StatusCode::BAD_GATEWAY,
                E::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                E::Playback(_) => StatusCode::UNPROCESSABLE_ENTITY,
                E::Config(_) | E::Io(_) | E::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Common(err) => err.code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            ApiError::Common(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "retryable": self.retryable(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use echo_common::Error;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(Error::Locked("09/04/2025".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(Error::Timeout(10_000)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(Error::InvalidState("busy".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Unauthorized("no token".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_retryable_follows_common_error() {
        assert!(ApiError::from(Error::Upload("503".into())).retryable());
        assert!(!ApiError::from(Error::Auth("bad".into())).retryable());
        assert!(!ApiError::BadRequest("x".into()).retryable());
        assert_eq!(ApiError::from(Error::Upload("503".into())).code(), "UPLOAD");
    }
}
