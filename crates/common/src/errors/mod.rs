//! Error types for Citator services
//!
//! Provides a single error taxonomy shared by the workers and the batch CLI:
//! - Distinct error types for different failure modes
//! - Machine-readable error codes
//! - Transient/permanent classification for retry decisions

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
    InvalidArguments,

    // Resource errors (4xxx)
    NotFound,
    OpinionNotFound,
    ClusterNotFound,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    IndexError,
    IndexTimeout,
    QueueError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    ReferenceDataError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,
            ErrorCode::InvalidArguments => 1005,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::OpinionNotFound => 4002,
            ErrorCode::ClusterNotFound => 4003,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::IndexError => 8002,
            ErrorCode::IndexTimeout => 8003,
            ErrorCode::QueueError => 8005,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::ReferenceDataError => 9004,
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

    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Opinion not found: {id}")]
    OpinionNotFound { id: i64 },

    #[error("Opinion cluster not found: {id}")]
    ClusterNotFound { id: i64 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Corpus index error: {message}")]
    IndexError { message: String },

    #[error("Corpus index timeout after {timeout_ms}ms")]
    IndexTimeout { timeout_ms: u64 },

    #[error("Queue error: {message}")]
    QueueError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Reference data error: {message}")]
    ReferenceData { message: String },

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
            AppError::InvalidArguments { .. } => ErrorCode::InvalidArguments,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::OpinionNotFound { .. } => ErrorCode::OpinionNotFound,
            AppError::ClusterNotFound { .. } => ErrorCode::ClusterNotFound,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::IndexError { .. } => ErrorCode::IndexError,
            AppError::IndexTimeout { .. } => ErrorCode::IndexTimeout,
            AppError::QueueError { .. } => ErrorCode::QueueError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ReferenceData { .. } => ErrorCode::ReferenceDataError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether a retry of the same operation may succeed.
    ///
    /// Transport, index, queue and connection failures are transient. Parse,
    /// validation and data errors are permanent and must only be recorded.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::DatabaseConnection { .. }
            | AppError::IndexError { .. }
            | AppError::IndexTimeout { .. }
            | AppError::QueueError { .. } => true,
            AppError::HttpClient(e) => {
                e.is_timeout() || e.is_connect() || e.status().map_or(true, |s| s.is_server_error())
            }
            AppError::Database(e) => matches!(
                e,
                sea_orm::DbErr::Conn(_) | sea_orm::DbErr::ConnectionAcquire(_)
            ),
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
