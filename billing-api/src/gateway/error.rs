use axum::{extract::rejection::BytesRejection, http::StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use super::auth::AuthError;
use super::router::RouteNotFound;

/// Terminal failures produced by the gateway itself.
///
/// Operation-reported failures are not here: they are passed through to the
/// caller as ordinary responses.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    RouteNotFound(#[from] RouteNotFound),

    #[error("invalid request: {0}")]
    Validation(String),

    /// The server refused to read the body, e.g. over the size limit.
    #[error("unreadable request body: {0}")]
    UnreadableBody(#[from] BytesRejection),

    #[error("operation exceeded the request deadline")]
    Timeout,

    #[error("operation failed: {0:#}")]
    Internal(anyhow::Error),
}

impl GatewayError {
    /// Terminal HTTP status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth(AuthError::Missing | AuthError::Invalid(_)) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::Auth(AuthError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
            GatewayError::Auth(AuthError::Timeout) | GatewayError::Timeout => {
                StatusCode::GATEWAY_TIMEOUT
            }
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::UnreadableBody(rejection) => rejection.status(),
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing body. Missing and invalid credentials look the same.
    pub fn body(&self) -> Value {
        let message = match self {
            GatewayError::Auth(AuthError::Missing | AuthError::Invalid(_)) => "Unauthorized",
            GatewayError::Auth(AuthError::Unavailable(_)) => "Identity provider unavailable",
            GatewayError::Auth(AuthError::Timeout) | GatewayError::Timeout => "Request timed out",
            GatewayError::RouteNotFound(_) => "Not found",
            GatewayError::Validation(message) => message.as_str(),
            GatewayError::UnreadableBody(rejection) => {
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    "Request body too large"
                } else {
                    "Request body could not be read"
                }
            }
            GatewayError::Internal(_) => "Internal server error",
        };
        json!({ "message": message })
    }

    /// Missing or invalid credential, as opposed to a provider failure.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            GatewayError::Auth(AuthError::Missing | AuthError::Invalid(_))
        )
    }

    /// Short outcome name for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::Auth(AuthError::Missing) => "auth_missing",
            GatewayError::Auth(AuthError::Invalid(_)) => "auth_invalid",
            GatewayError::Auth(AuthError::Unavailable(_)) => "auth_unavailable",
            GatewayError::Auth(AuthError::Timeout) | GatewayError::Timeout => "timeout",
            GatewayError::RouteNotFound(_) => "route_not_found",
            GatewayError::Validation(_) => "validation",
            GatewayError::UnreadableBody(_) => "body_unreadable",
            GatewayError::Internal(_) => "internal",
        }
    }
}
