//! Chat error types with HTTP status code mapping.
//!
//! [`ChatError`] is the central error type for the gateway. Each variant
//! maps to a numeric error code and, where a connection attempt is being
//! refused, an HTTP status for the pre-upgrade response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "message has no content and no attachment",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`ChatError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                |
/// |-----------|-----------------|----------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request            |
/// | 2000–2999 | State/Not Found | 404 Not Found              |
/// | 3000–3999 | Server          | 500 Internal Server Error  |
/// | 4000–4999 | Auth/Capacity   | 401 / 403 / 422            |
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Connection attempt carried no authenticated identity.
    #[error("unauthenticated: no identity supplied")]
    Unauthenticated,

    /// Identity has no active membership in the target room.
    #[error("not authorized for room {0}")]
    NotAuthorized(uuid::Uuid),

    /// Room with the given ID was not found.
    #[error("room not found: {0}")]
    RoomNotFound(uuid::Uuid),

    /// Message with the given ID was not found in its room.
    #[error("message not found: {0}")]
    MessageNotFound(uuid::Uuid),

    /// Message had no text content and no attachment.
    #[error("message has no content and no attachment")]
    EmptyMessage,

    /// Reply target does not exist in the same room.
    #[error("reply target {0} is not a message in this room")]
    InvalidReference(uuid::Uuid),

    /// Operation is not valid for the target entity.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Caller has no membership row for the room.
    #[error("not a member of this room")]
    NotMember,

    /// Group room cannot hold more members.
    #[error("room capacity of {limit} members exceeded")]
    CapacityExceeded {
        /// Maximum number of members the room allows.
        limit: u32,
    },

    /// Durable store unavailable or rejected the write.
    #[error("persistence error: {0}")]
    PersistenceFailure(String),

    /// Room session mailbox is closed.
    #[error("room session closed")]
    SessionClosed,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::EmptyMessage => 1001,
            Self::InvalidReference(_) => 1002,
            Self::InvalidOperation(_) => 1003,
            Self::RoomNotFound(_) => 2001,
            Self::MessageNotFound(_) => 2002,
            Self::NotMember => 2003,
            Self::PersistenceFailure(_) => 3001,
            Self::SessionClosed => 3002,
            Self::Internal(_) => 3000,
            Self::Unauthenticated => 4001,
            Self::NotAuthorized(_) => 4003,
            Self::CapacityExceeded { .. } => 4022,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyMessage | Self::InvalidReference(_) | Self::InvalidOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::RoomNotFound(_) | Self::MessageNotFound(_) | Self::NotMember => {
                StatusCode::NOT_FOUND
            }
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotAuthorized(_) => StatusCode::FORBIDDEN,
            Self::CapacityExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PersistenceFailure(_) | Self::SessionClosed | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn refusal_variants_map_to_auth_statuses() {
        assert_eq!(
            ChatError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ChatError::NotAuthorized(uuid::Uuid::new_v4()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn validation_variants_are_bad_request() {
        assert_eq!(
            ChatError::EmptyMessage.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ChatError::InvalidReference(uuid::Uuid::new_v4()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ChatError::EmptyMessage.error_code(), 1001);
    }

    #[test]
    fn persistence_failure_is_server_error() {
        let err = ChatError::PersistenceFailure("db down".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), 3001);
    }
}
