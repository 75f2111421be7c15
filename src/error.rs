//! Error types for the form cache
//!
//! Provides unified error handling using thiserror. Most of these never reach
//! a caller: the store recovers from them and logs instead.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the form cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key absent or expired
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Malformed durable blob or import payload
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Payload could not be captured as JSON
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Durable store refused the write
    #[error("Storage quota exceeded: needed {needed} bytes, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },

    /// Snapshot parsed but its contents are unusable
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Any other backing-store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CacheError {
    /// Returns true for the error the store answers with an emergency prune.
    pub fn is_quota(&self) -> bool {
        matches!(self, CacheError::QuotaExceeded { .. })
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the form cache.
pub type Result<T> = std::result::Result<T, CacheError>;
