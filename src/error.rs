// src/error.rs

//! Unified error handling for the intake service.

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::RecordKind;

/// Result type alias for intake operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Submission validation error (empty/missing required text)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A record with the same content fingerprint already exists in
    /// today's partition
    #[error("Duplicate record (fingerprint {fingerprint})")]
    Duplicate { fingerprint: String },

    /// The origin has exhausted its quota for this action
    #[error("Rate limit exceeded for {origin} on {action}")]
    RateLimited { origin: String, action: String },

    /// A partition file exists but cannot be parsed. Fatal for that
    /// date only; other partitions remain usable.
    #[error("Corrupt {kind} partition for {date}: {message}")]
    CorruptPartition {
        kind: RecordKind,
        date: NaiveDate,
        message: String,
    },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a corrupt-partition error wrapping the parse failure.
    pub fn corrupt_partition(
        kind: RecordKind,
        date: NaiveDate,
        source: impl std::fmt::Display,
    ) -> Self {
        Self::CorruptPartition {
            kind,
            date,
            message: source.to_string(),
        }
    }
}
