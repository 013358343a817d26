//! Error types for the offline layer

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for offline-layer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the library and CLI
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown cache type: {0}")]
    UnknownCacheType(String),

    #[error("Unknown sync queue: {0}")]
    UnknownQueue(String),

    #[error("Install failed: {0}")]
    Install(String),

    #[error("Operation failed: {0}")]
    Other(String),
}

/// Network failures, distinct from a non-2xx status (which is a response)
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Request timed out")]
    Timeout,

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else if err.is_connect() {
            NetworkError::Connect(err.to_string())
        } else if err.is_builder() {
            NetworkError::InvalidRequest(err.to_string())
        } else {
            NetworkError::Other(err.to_string())
        }
    }
}

/// Why a routing strategy could not produce a response
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("No cached response for {0}")]
    NotCached(String),
}

/// Persistent store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Record '{key}' in '{partition}' is {size} bytes, limit is {limit}")]
    RecordTooLarge {
        partition: String,
        key: String,
        size: usize,
        limit: usize,
    },

    #[error("Storage quota exceeded ({used} of {quota} bytes)")]
    QuotaExceeded { used: usize, quota: usize },

    #[error("Failed to (de)serialize stored record: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Cannot determine a data directory")]
    NoDataDir,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
