//! services/api/src/error.rs
//!
//! Defines the error types for the API service: `ApiError` for startup and
//! bootstrap failures, and `HttpError` for everything returned to a client.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sigmora_core::ports::{PortError, UniqueKey};
use tracing::error;
use utoipa::ToSchema;

/// The primary error type for bootstrapping the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//=========================================================================================
// Request-Level Errors
//=========================================================================================

/// Machine-readable error codes carried in every error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // --- 401 ---
    NoToken,
    TokenExpired,
    InvalidToken,
    InvalidSession,
    SessionExpired,
    UserNotFound,
    InvalidCredentials,
    // --- 403 ---
    InsufficientPermissions,
    NotOwner,
    NotSubscribed,
    // --- 4xx ---
    ValidationFailed,
    InvalidAcademyCode,
    DuplicateEmail,
    TradeAlreadyClosed,
    PaymentNotSuccessful,
    InvalidPaymentMetadata,
    NotFound,
    Conflict,
    // --- 5xx ---
    PaymentProviderError,
    InternalError,
}

/// One violated input rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

/// An error on its way back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    pub errors: Vec<FieldError>,
}

impl HttpError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn unauthenticated(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn forbidden(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code, message)
    }

    pub fn bad_request(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            message,
        )
    }

    /// A 400 listing every violated rule.
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: ErrorCode::ValidationFailed,
            message: "Validation failed".to_string(),
            errors,
        }
    }

    pub fn not_owner() -> Self {
        Self::forbidden(ErrorCode::NotOwner, "Not authorized")
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: self.message,
            errors: self.errors,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PortError> for HttpError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => HttpError::not_found(what),
            PortError::Duplicate(UniqueKey::Email) => HttpError::new(
                StatusCode::CONFLICT,
                ErrorCode::DuplicateEmail,
                "User already exists",
            ),
            PortError::Duplicate(key) => {
                HttpError::new(StatusCode::CONFLICT, ErrorCode::Conflict, format!("Duplicate {key}"))
            }
            PortError::MissingReference(what) => HttpError::not_found(what),
            PortError::Unexpected(detail) => {
                error!(%detail, "store operation failed");
                HttpError::internal("Internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::InsufficientPermissions).unwrap();
        assert_eq!(json, "\"INSUFFICIENT_PERMISSIONS\"");
        let json = serde_json::to_string(&ErrorCode::NoToken).unwrap();
        assert_eq!(json, "\"NO_TOKEN\"");
    }

    #[test]
    fn port_errors_map_to_the_nearest_http_kind() {
        let e = HttpError::from(PortError::NotFound("Package".into()));
        assert_eq!(e.status, StatusCode::NOT_FOUND);

        let e = HttpError::from(PortError::Duplicate(UniqueKey::Email));
        assert_eq!((e.status, e.code), (StatusCode::CONFLICT, ErrorCode::DuplicateEmail));

        let e = HttpError::from(PortError::Unexpected("connection reset".into()));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!e.message.contains("connection reset"));
    }

    #[test]
    fn field_errors_are_omitted_when_empty() {
        let body = ErrorBody {
            code: ErrorCode::NotFound,
            message: "x".into(),
            errors: vec![],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("errors").is_none());
    }
}
