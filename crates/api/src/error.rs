//! Core-error to HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use slipway_core::Error;

/// Error type every handler returns.
#[derive(Debug)]
pub enum ApiError {
    /// A core error, mapped by kind.
    Core(Error),
    /// Intake throttled.
    RateLimited,
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::Core(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Core(error) => match error {
                Error::Validation { .. } | Error::InvalidCredential { .. } => {
                    StatusCode::BAD_REQUEST
                }
                Error::NotFound { .. } => StatusCode::NOT_FOUND,
                Error::Conflict { .. } | Error::CredentialInactive { .. } => StatusCode::CONFLICT,
                Error::ValidationUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Sanitized user-facing message: no stack traces, no secrets, and
    /// internal detail replaced wholesale.
    fn message(&self) -> String {
        match self {
            Self::RateLimited => "too many requests, retry later".to_owned(),
            Self::Core(error) => {
                if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
                    "internal error".to_owned()
                } else {
                    error.to_string()
                }
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Core(error) => error.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Core(error) = &self {
            if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(%error, "request failed");
            }
        }
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.message(),
        });
        (self.status(), Json(body)).into_response()
    }
}
