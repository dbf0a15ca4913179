//! Error types for fastkv

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Storage Errors ===
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Corrupted record: {0}")]
    Corrupted(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    // === Membership Errors ===
    #[error("Bloom filter error: {0}")]
    BloomFilter(String),

    #[error("Key is locked by another writer: {0}")]
    KeyContention(String),

    // === Volume Errors ===
    #[error("Volume {volume} unavailable: {reason}")]
    VolumeUnavailable { volume: String, reason: String },

    #[error("No healthy volumes available")]
    NoHealthyVolumes,

    #[error("HTTP error: {0}")]
    Http(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Is this a retryable error?
    ///
    /// Nothing in the crate retries on its own; callers use this to decide.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::VolumeUnavailable { .. } | Error::KeyContention(_) | Error::NoHealthyVolumes
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::KeyContention(_) => StatusCode::CONFLICT,
            Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::VolumeUnavailable { .. } | Error::NoHealthyVolumes => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}
