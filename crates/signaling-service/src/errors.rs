//! Signaling service error types.
//!
//! Errors map to numeric signaling error codes for WebSocket clients and to
//! HTTP status codes for the REST surface. Internal details are logged
//! server-side but never exposed to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Signaling service error type.
///
/// Maps to signaling error codes:
/// - `InvalidMessage`: `INVALID_REQUEST` (1)
/// - `AccessDenied`: `FORBIDDEN` (3)
/// - `NotFound`: `NOT_FOUND` (4)
/// - `InvalidState`: `CONFLICT` (5)
/// - Redis, Internal: `INTERNAL_ERROR` (6)
/// - `CapacityExceeded`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Room, session, participant or stream absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller lacks the required privilege.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Screen-share slot limit reached.
    #[error("Screen share capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },

    /// Operation not valid in the current state (e.g. unpin with nothing pinned).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Inbound message failed decoding or validation.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(String),

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Returns the signaling error code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            SignalingError::InvalidMessage(_) => 1, // INVALID_REQUEST
            SignalingError::AccessDenied(_) => 3,   // FORBIDDEN
            SignalingError::NotFound(_) => 4,       // NOT_FOUND
            SignalingError::InvalidState(_) => 5,   // CONFLICT
            SignalingError::Redis(_) | SignalingError::Internal(_) => {
                6 // INTERNAL_ERROR
            }
            SignalingError::CapacityExceeded { .. } => 7, // CAPACITY_EXCEEDED
        }
    }

    /// Returns the HTTP status used by the REST surface.
    pub fn http_status(&self) -> StatusCode {
        match self {
            SignalingError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            SignalingError::AccessDenied(_) => StatusCode::FORBIDDEN,
            SignalingError::NotFound(_) => StatusCode::NOT_FOUND,
            SignalingError::InvalidState(_) | SignalingError::CapacityExceeded { .. } => {
                StatusCode::CONFLICT
            }
            SignalingError::Redis(_) | SignalingError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns a bounded label string for the error variant (for metrics).
    pub fn error_type_label(&self) -> &'static str {
        match self {
            SignalingError::NotFound(_) => "not_found",
            SignalingError::AccessDenied(_) => "access_denied",
            SignalingError::CapacityExceeded { .. } => "capacity_exceeded",
            SignalingError::InvalidState(_) => "invalid_state",
            SignalingError::InvalidMessage(_) => "invalid_message",
            SignalingError::Redis(_) => "redis",
            SignalingError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            SignalingError::Redis(_) | SignalingError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            SignalingError::CapacityExceeded { limit } => {
                format!("Maximum number of concurrent screen shares reached ({limit})")
            }
            SignalingError::NotFound(msg)
            | SignalingError::AccessDenied(msg)
            | SignalingError::InvalidState(msg)
            | SignalingError::InvalidMessage(msg) => msg.clone(),
        }
    }

    fn code_name(&self) -> &'static str {
        match self {
            SignalingError::NotFound(_) => "NOT_FOUND",
            SignalingError::AccessDenied(_) => "FORBIDDEN",
            SignalingError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            SignalingError::InvalidState(_) => "INVALID_STATE",
            SignalingError::InvalidMessage(_) => "BAD_REQUEST",
            SignalingError::Redis(_) | SignalingError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

/// Error response body for the REST surface.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for SignalingError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Log actual error server-side, return generic message to client
            tracing::error!(target: "sig.http", error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code_name().to_string(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            SignalingError::InvalidMessage("bad".to_string()).error_code(),
            1
        );
        assert_eq!(
            SignalingError::AccessDenied("not host".to_string()).error_code(),
            3
        );
        assert_eq!(
            SignalingError::NotFound("room-1".to_string()).error_code(),
            4
        );
        assert_eq!(
            SignalingError::InvalidState("nothing pinned".to_string()).error_code(),
            5
        );
        assert_eq!(SignalingError::Redis("down".to_string()).error_code(), 6);
        assert_eq!(SignalingError::Internal("oops".to_string()).error_code(), 6);
        assert_eq!(
            SignalingError::CapacityExceeded { limit: 4 }.error_code(),
            7
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let redis_err = SignalingError::Redis("connection refused at 10.0.0.7:6379".to_string());
        assert!(!redis_err.client_message().contains("10.0.0.7"));
        assert_eq!(redis_err.client_message(), "An internal error occurred");

        let internal = SignalingError::Internal("channel send failed".to_string());
        assert_eq!(internal.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_capacity_message_names_the_limit() {
        let err = SignalingError::CapacityExceeded { limit: 4 };
        assert_eq!(
            err.client_message(),
            "Maximum number of concurrent screen shares reached (4)"
        );
    }

    #[test]
    fn test_error_type_labels_are_bounded() {
        assert_eq!(
            SignalingError::NotFound("x".to_string()).error_type_label(),
            "not_found"
        );
        assert_eq!(
            SignalingError::CapacityExceeded { limit: 1 }.error_type_label(),
            "capacity_exceeded"
        );
        assert_eq!(
            SignalingError::InvalidMessage("x".to_string()).error_type_label(),
            "invalid_message"
        );
    }

    #[tokio::test]
    async fn test_into_response_uses_http_status_and_json_body() {
        let response = SignalingError::AccessDenied("Only the host can end the session".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "FORBIDDEN");
        assert_eq!(body["error"]["message"], "Only the host can end the session");
    }

    #[tokio::test]
    async fn test_internal_error_response_is_generic() {
        let response = SignalingError::Redis("auth failed for user admin".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("admin"));
    }
}
