//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pastebin_core::ports::PortError;
use serde_json::json;
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// A missing, malformed or expired bearer token.
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request could not be understood (e.g. a broken multipart body).
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Port(port) => match port {
                PortError::NotFound(_) => StatusCode::NOT_FOUND,
                PortError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                PortError::AliasConflict(_) | PortError::AlreadyExists(_) => StatusCode::CONFLICT,
                PortError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                PortError::Io { .. } | PortError::Backend { .. } | PortError::Encoding(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Token(_) | ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Config(_) | ApiError::Io(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message shown to clients. Internal details only go to the log.
    fn public_message(&self) -> String {
        match self {
            ApiError::Port(PortError::NotFound(msg))
            | ApiError::Port(PortError::InvalidArgument(msg))
            | ApiError::Port(PortError::AliasConflict(msg))
            | ApiError::Port(PortError::AlreadyExists(msg))
            | ApiError::Unauthorized(msg)
            | ApiError::BadRequest(msg)
            | ApiError::PayloadTooLarge(msg) => msg.clone(),
            ApiError::Port(PortError::Cancelled) => "the request timed out".to_string(),
            ApiError::Token(_) => "invalid or expired token".to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_errors_map_to_statuses() {
        let cases = [
            (PortError::NotFound("bin x".into()), StatusCode::NOT_FOUND),
            (PortError::InvalidArgument("bad".into()), StatusCode::BAD_REQUEST),
            (PortError::AliasConflict("a".into()), StatusCode::CONFLICT),
            (PortError::AlreadyExists("u".into()), StatusCode::CONFLICT),
            (PortError::Cancelled, StatusCode::SERVICE_UNAVAILABLE),
            (
                PortError::backend("reading", "boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (port, status) in cases {
            assert_eq!(ApiError::from(port).status_code(), status);
        }
    }

    #[test]
    fn oversized_bodies_are_413() {
        let err = ApiError::PayloadTooLarge("upload exceeds 1024 bytes".into());
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.public_message(), "upload exceeds 1024 bytes");
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ApiError::from(PortError::backend("reading", "secret detail".to_string()));
        assert_eq!(err.public_message(), "internal server error");

        let err = ApiError::from(PortError::AliasConflict("a already exists as an alias".into()));
        assert_eq!(err.public_message(), "a already exists as an alias");
    }
}
