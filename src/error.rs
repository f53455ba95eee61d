// src/error.rs

use thiserror::Error;

/// Core error types for debrec
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Broken internal invariant, e.g. a persisted row without an ID
    #[error("Internal error: {0}")]
    Internal(String),

    /// Manifest or control-file download failures
    #[error("Download error: {0}")]
    Download(String),

    /// Malformed manifests or control files
    #[error("Parse error: {0}")]
    Parse(String),

    /// Irrecoverable configuration errors (e.g. unreadable distributions manifest)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-fatal failure while recording a single package paragraph
    #[error("Could not record package '{package}': {reason}")]
    Record { package: String, reason: String },
}

/// Result type alias using debrec's Error type
pub type Result<T> = std::result::Result<T, Error>;
