// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),

    /// Relational sink error
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single upstream question could not be mapped
    #[error("Parse error at question {index}: {message}")]
    Parse { index: usize, message: String },

    /// Image or shard persistence failed
    #[error("Storage error for {context}: {message}")]
    Storage { context: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a question parse error.
    pub fn parse(index: usize, message: impl fmt::Display) -> Self {
        Self::Parse {
            index,
            message: message.to_string(),
        }
    }

    /// Create a storage error with context.
    pub fn storage(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Storage {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error should abort the run before crawling.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Toml(_))
    }
}
