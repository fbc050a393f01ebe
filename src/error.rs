//! # Error Types
//!
//! Crate-wide error taxonomy for the gateway. Each variant maps to a
//! client-visible HTTP status; stream-level failures are the exception and
//! are folded into the accumulated answer instead of failing the request.

#[cfg(feature = "server")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
#[cfg(feature = "server")]
use serde_json::json;

use crate::signing::SigningError;

#[derive(Debug)]
pub enum GatewayError {
    /// Malformed request body, missing model, empty messages. Client fault.
    Validation(String),
    /// Unknown provider/model or missing credential. Server misconfiguration.
    Configuration(String),
    /// The signing oracle failed. Fatal for this request, not the process.
    Signing(SigningError),
    /// Backend returned a non-success status before any stream data.
    BackendHttp { status: u16, message: String },
    /// An error event inside an otherwise-successful stream. Never surfaced
    /// as an HTTP error; carried here only for internal plumbing.
    BackendStream(String),
    /// Connection-level failure reaching the backend.
    Transport(String),
    Internal(String),
    Serialization(String),
}

#[cfg(feature = "server")]
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            GatewayError::Validation(msg) => (StatusCode::BAD_REQUEST, "invalid_request_error", msg),
            GatewayError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                msg,
            ),
            GatewayError::Signing(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "signing_error",
                err.to_string(),
            ),
            GatewayError::BackendHttp { status, message } => {
                // Forward the backend status when it is a sensible HTTP code.
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                (status, "upstream_error", message)
            }
            GatewayError::BackendStream(msg) => {
                // Normally folded into the answer before the response starts;
                // reaching here means the stream never opened.
                (StatusCode::BAD_GATEWAY, "upstream_error", msg)
            }
            GatewayError::Transport(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg),
            GatewayError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            GatewayError::Serialization(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_error",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": null
            }
        }));

        (status, body).into_response()
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Validation(msg) => write!(f, "Validation error: {}", msg),
            GatewayError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            GatewayError::Signing(err) => write!(f, "Signing error: {}", err),
            GatewayError::BackendHttp { status, message } => {
                write!(f, "Backend HTTP {}: {}", status, message)
            }
            GatewayError::BackendStream(msg) => write!(f, "Backend stream error: {}", msg),
            GatewayError::Transport(msg) => write!(f, "Transport error: {}", msg),
            GatewayError::Internal(msg) => write!(f, "Internal error: {}", msg),
            GatewayError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<SigningError> for GatewayError {
    fn from(err: SigningError) -> Self {
        GatewayError::Signing(err)
    }
}

impl From<reqwest::Error> for GatewayError {
    /// Convert reqwest HTTP client errors with appropriate categorization:
    /// timeouts and connection failures are transport problems, anything
    /// carrying a backend status is an upstream HTTP failure.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Transport("request timeout - backend did not respond in time".to_string())
        } else if err.is_connect() {
            GatewayError::Transport("connection failed - unable to reach backend".to_string())
        } else if let Some(status) = err.status() {
            GatewayError::BackendHttp {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_request() {
            GatewayError::Validation(format!("invalid request: {}", err))
        } else {
            GatewayError::Transport(format!("HTTP client error: {}", err))
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(format!("JSON error: {}", err))
    }
}

#[cfg(feature = "server")]
impl From<axum::http::Error> for GatewayError {
    fn from(err: axum::http::Error) -> Self {
        GatewayError::Internal(format!("HTTP protocol error: {}", err))
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(err: url::ParseError) -> Self {
        GatewayError::Configuration(format!("invalid URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_variants() {
        let err = GatewayError::Validation("missing model".to_string());
        assert_eq!(err.to_string(), "Validation error: missing model");

        let err = GatewayError::BackendHttp {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "Backend HTTP 503: overloaded");
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = GatewayError::from(parse_err);
        assert!(matches!(err, GatewayError::Serialization(_)));
    }
}
