// src/error.rs

//! Unified error handling for the stats aggregator.

use std::fmt;

use thiserror::Error;

/// Result type alias for aggregator operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed document or collection path
    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// Document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The climb owning a log no longer exists
    #[error("Climb not found: {climb_id}")]
    ClimbNotFound { climb_id: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::InvalidPath {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an S3 error from any displayable SDK error.
    pub fn s3(err: impl fmt::Display) -> Self {
        Self::S3(err.to_string())
    }

    /// Whether a retry of the same operation could succeed.
    ///
    /// Backend failures are transient; bad input and missing documents are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::S3(_) | Self::Io(_) | Self::Json(_))
    }

    /// Whether a failed event should be redelivered.
    ///
    /// A missing climb is retried too: the write that recreates it may land
    /// between attempts.
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || matches!(self, Self::ClimbNotFound { .. })
    }
}
