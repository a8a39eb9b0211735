//! Error types for ThesisForge services
//!
//! Provides a single error enum for the whole pipeline with:
//! - Distinct variants per pipeline stage failure
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
    NoPapersSelected,
    UnsupportedChapterType,

    // Resource errors (4xxx)
    ProjectNotFound,
    ChapterNotFound,
    DocumentNotFound,

    // Conflict errors (5xxx)
    Conflict,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    RetrievalError,
    LanguageModelError,
    ThemeParseError,
    SectionError,
    RenderError,

    // Pipeline errors (85xx)
    ReconciliationError,
    Cancelled,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::NoPapersSelected => 1002,
            ErrorCode::UnsupportedChapterType => 1003,

            ErrorCode::ProjectNotFound => 4001,
            ErrorCode::ChapterNotFound => 4002,
            ErrorCode::DocumentNotFound => 4003,

            ErrorCode::Conflict => 5001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::RetrievalError => 8002,
            ErrorCode::LanguageModelError => 8003,
            ErrorCode::ThemeParseError => 8004,
            ErrorCode::SectionError => 8005,
            ErrorCode::RenderError => 8006,

            ErrorCode::ReconciliationError => 8501,
            ErrorCode::Cancelled => 8502,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
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

    #[error("No source papers selected for generation")]
    NoPapersSelected,

    #[error("No generator registered for chapter type: {chapter_type}")]
    UnsupportedChapterType { chapter_type: String },

    // Resource errors
    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("Chapter not found: {id}")]
    ChapterNotFound { id: String },

    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    // Conflict errors
    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Paper search failed: {message}")]
    Retrieval { message: String },

    #[error("Language model error: {message}")]
    LanguageModel { message: String },

    #[error("Theme clustering output could not be parsed: {message}")]
    ThemeParse { message: String },

    #[error("Section synthesis failed for theme '{theme}': {message}")]
    Section { theme: String, message: String },

    #[error("Citation reconciliation failed: {message}")]
    Reconciliation { message: String },

    #[error("Document rendering failed: {message}")]
    Render { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Pipeline control
    #[error("Operation cancelled")]
    Cancelled,

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::NoPapersSelected => ErrorCode::NoPapersSelected,
            AppError::UnsupportedChapterType { .. } => ErrorCode::UnsupportedChapterType,
            AppError::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            AppError::ChapterNotFound { .. } => ErrorCode::ChapterNotFound,
            AppError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Retrieval { .. } => ErrorCode::RetrievalError,
            AppError::LanguageModel { .. } => ErrorCode::LanguageModelError,
            AppError::ThemeParse { .. } => ErrorCode::ThemeParseError,
            AppError::Section { .. } => ErrorCode::SectionError,
            AppError::Reconciliation { .. } => ErrorCode::ReconciliationError,
            AppError::Render { .. } => ErrorCode::RenderError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Cancelled => ErrorCode::Cancelled,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::NoPapersSelected
            | AppError::UnsupportedChapterType { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::ProjectNotFound { .. }
            | AppError::ChapterNotFound { .. }
            | AppError::DocumentNotFound { .. } => StatusCode::NOT_FOUND,

            // 408 Request Timeout
            AppError::Cancelled => StatusCode::REQUEST_TIMEOUT,

            // 409 Conflict
            AppError::Duplicate { .. } => StatusCode::CONFLICT,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Reconciliation { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Retrieval { .. }
            | AppError::LanguageModel { .. }
            | AppError::ThemeParse { .. }
            | AppError::Section { .. }
            | AppError::Render { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Whether this error is a storage uniqueness violation
    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppError::Duplicate { .. })
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
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

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

        let details = match &self {
            AppError::Validation { field: Some(field), .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::ChapterNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::ChapterNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Invalid query".into(),
            field: Some("query".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_upstream_failures_map_to_bad_gateway() {
        let retrieval = AppError::Retrieval { message: "503".into() };
        let render = AppError::Render { message: "timeout".into() };
        assert_eq!(retrieval.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(render.code().as_code(), 8006);
        assert!(render.is_server_error());
    }

    #[test]
    fn test_duplicate_detection() {
        let err = AppError::Duplicate { message: "doi".into() };
        assert!(err.is_duplicate());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(!AppError::Cancelled.is_duplicate());
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::NoPapersSelected).unwrap();
        assert_eq!(json, "\"NO_PAPERS_SELECTED\"");
    }
}
