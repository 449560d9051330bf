//! Error types for sitepulse-core

use thiserror::Error;

/// Main error type for the sitepulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Collector delivery error
    #[error("collector error: {0}")]
    Collector(String),

    /// Collector was destroyed while a request was outstanding
    #[error("collector is not running")]
    CollectorStopped,

    /// Storage layer error that is not a rusqlite failure
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type alias for sitepulse-core
pub type Result<T> = std::result::Result<T, Error>;
