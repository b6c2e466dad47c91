//! Error type system for the attendance export service
//!
//! This module provides the service error type with:
//! - HTTP status code mapping
//! - JSON error responses carrying a trace ID
//! - A non-leaking policy for infrastructure failures: database and I/O
//!   error detail is logged server-side but never sent to the caller

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Main error type for the attendance export service
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    // System-level errors
    #[error("System initialization failed: {0}")]
    InitializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Task error: {0}")]
    TaskError(String),

    // Request-level errors
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    // Serialization of the response body
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ExportError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExportError::ValidationError(_) => StatusCode::BAD_REQUEST,

            ExportError::Unauthorized(_) => StatusCode::UNAUTHORIZED,

            ExportError::InitializationError(_)
            | ExportError::ConfigError(_)
            | ExportError::DatabaseError(_)
            | ExportError::PoolError(_)
            | ExportError::TaskError(_)
            | ExportError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type name for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            ExportError::InitializationError(_) => "InitializationError",
            ExportError::ConfigError(_) => "ConfigError",
            ExportError::DatabaseError(_) | ExportError::PoolError(_) => "DatabaseError",
            ExportError::TaskError(_) => "TaskError",
            ExportError::Unauthorized(_) => "Unauthorized",
            ExportError::ValidationError(_) => "ValidationError",
            ExportError::SerializationError(_) => "SerializationError",
        }
    }

    /// The message sent to the caller.
    ///
    /// Server-side failures carry raw driver text (connection strings, SQL
    /// fragments), so everything that maps to a 5xx collapses to a generic
    /// message. The full error is still logged with the trace ID.
    pub fn public_message(&self) -> String {
        match self {
            ExportError::Unauthorized(_) | ExportError::ValidationError(_) => self.to_string(),
            ExportError::DatabaseError(_) | ExportError::PoolError(_) => {
                "database error".to_string()
            }
            _ => "internal server error".to_string(),
        }
    }
}

/// Error response structure for API endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Unique trace ID for this error
    pub trace_id: String,
}

impl ErrorResponse {
    /// Create a new error response with a generated trace ID
    pub fn new(error: String, message: String) -> Self {
        Self {
            error,
            message,
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an error response from an ExportError
    pub fn from_error(error: &ExportError) -> Self {
        Self::new(error.error_type().to_string(), error.public_message())
    }
}

/// Implement IntoResponse for ExportError to enable automatic error handling in Axum
impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = ErrorResponse::from_error(&self);

        // Log the full error with trace ID; the response body only carries
        // the public message
        tracing::error!(
            error_type = self.error_type(),
            trace_id = %error_response.trace_id,
            status_code = %status_code,
            "Request failed: {}",
            self
        );

        (status_code, Json(error_response)).into_response()
    }
}

/// Result type alias for operations that can fail with ExportError
pub type Result<T> = std::result::Result<T, ExportError>;
