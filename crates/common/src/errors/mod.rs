//! Error types for DocSift services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - Transient/permanent classification driving the retry policy
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Authorization errors (3xxx)
    PermissionDenied,

    // Resource errors (4xxx)
    NotFound,
    RecordNotFound,
    SubmissionNotFound,
    DocumentNotFound,
    ModelNotFound,

    // Conflict errors (5xxx)
    Conflict,
    StaleLease,
    InvalidTransition,

    // Integrity errors (6xxx)
    IntegrityError,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    InferenceError,
    InferenceTimeout,
    TrainerError,
    UpstreamError,

    // Content / IO (85xx)
    TransientIo,
    PermanentContent,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1002,

            // Authz (3xxx)
            ErrorCode::PermissionDenied => 3001,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::RecordNotFound => 4002,
            ErrorCode::SubmissionNotFound => 4003,
            ErrorCode::DocumentNotFound => 4004,
            ErrorCode::ModelNotFound => 4005,

            // Conflicts (5xxx)
            ErrorCode::Conflict => 5001,
            ErrorCode::StaleLease => 5002,
            ErrorCode::InvalidTransition => 5003,

            // Integrity (6xxx)
            ErrorCode::IntegrityError => 6001,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            // External (8xxx)
            ErrorCode::InferenceError => 8001,
            ErrorCode::InferenceTimeout => 8002,
            ErrorCode::TrainerError => 8003,
            ErrorCode::UpstreamError => 8004,

            // Content / IO (85xx)
            ErrorCode::TransientIo => 8501,
            ErrorCode::PermanentContent => 8502,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Authorization errors
    #[error("Role {role} may not perform {action}")]
    PermissionDenied { role: String, action: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Record not found: {id}")]
    RecordNotFound { id: String },

    #[error("Submission not found: {id}")]
    SubmissionNotFound { id: String },

    #[error("Document not found: {name}")]
    DocumentNotFound { name: String },

    #[error("Model version not found: {tag}")]
    ModelNotFound { tag: String },

    // Conflict errors
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Stale lease for document {document}: held token no longer current")]
    StaleLease { document: String },

    #[error("Invalid audit transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // Integrity errors
    #[error("Integrity violation: {message}")]
    Integrity { message: String },

    // Transient / permanent content
    #[error("Transient I/O failure: {message}")]
    TransientIo { message: String },

    #[error("Unprocessable content in {name}: {message}")]
    PermanentContent { name: String, message: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Inference service error: {message}")]
    Inference { message: String },

    #[error("Inference timeout after {timeout_ms}ms")]
    InferenceTimeout { timeout_ms: u64 },

    #[error("Trainer service error: {message}")]
    Trainer { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            AppError::SubmissionNotFound { .. } => ErrorCode::SubmissionNotFound,
            AppError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            AppError::ModelNotFound { .. } => ErrorCode::ModelNotFound,
            AppError::Conflict { .. } => ErrorCode::Conflict,
            AppError::StaleLease { .. } => ErrorCode::StaleLease,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::Integrity { .. } => ErrorCode::IntegrityError,
            AppError::TransientIo { .. } => ErrorCode::TransientIo,
            AppError::PermanentContent { .. } => ErrorCode::PermanentContent,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Inference { .. } => ErrorCode::InferenceError,
            AppError::InferenceTimeout { .. } => ErrorCode::InferenceTimeout,
            AppError::Trainer { .. } => ErrorCode::TrainerError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidFormat { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 403 Forbidden
            AppError::PermissionDenied { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::RecordNotFound { .. }
            | AppError::SubmissionNotFound { .. }
            | AppError::DocumentNotFound { .. }
            | AppError::ModelNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict { .. }
            | AppError::StaleLease { .. }
            | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            AppError::Integrity { .. } | AppError::PermanentContent { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Inference { .. }
            | AppError::InferenceTimeout { .. }
            | AppError::Trainer { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::TransientIo { .. } | AppError::ServiceUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Whether this failure is retryable with backoff.
    ///
    /// Only transient failures are retried locally; everything else is
    /// surfaced to the caller or routed to the dead-letter path.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::TransientIo { .. }
                | AppError::DatabaseConnection { .. }
                | AppError::InferenceTimeout { .. }
                | AppError::HttpClient(_)
                | AppError::ServiceUnavailable { .. }
        )
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: None,
                request_id: None, // Should be filled by middleware
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        // Storage hiccups are retryable by policy
        AppError::TransientIo {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::RecordNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::RecordNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_permission_error() {
        let err = AppError::PermissionDenied {
            role: "psa".into(),
            action: "accept".into(),
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        let err = AppError::TransientIo {
            message: "disk briefly unavailable".into(),
        };
        assert!(err.is_transient());

        let err = AppError::PermanentContent {
            name: "bad.pdf".into(),
            message: "no extractable text".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_stale_lease_is_conflict() {
        let err = AppError::StaleLease {
            document: "site-survey.pdf".into(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), ErrorCode::StaleLease);
    }
}
