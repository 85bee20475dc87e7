//! Error types for the qrcode-scan-records library.
//!
//! Record store, configuration and form handling share [`ScanRecordError`].
//! The capture loop has its own, narrower error types in [`crate::capture`]
//! because none of them are fatal and all of them are shown to the user.

use thiserror::Error;

/// Errors that can occur while storing or querying scan records.
#[derive(Error, Debug)]
pub enum ScanRecordError {
    /// Input rejected before it reached the database
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Could not check a connection out of the pool
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

impl ScanRecordError {
    /// True for errors caused by the caller's input rather than the system.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Convenience type alias for Result with ScanRecordError
pub type Result<T> = std::result::Result<T, ScanRecordError>;

impl From<anyhow::Error> for ScanRecordError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<config::ConfigError> for ScanRecordError {
    fn from(err: config::ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
