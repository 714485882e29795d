//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The settings file could not be parsed.
    #[error("settings file corrupted: {0}")]
    Corrupted(String),

    /// The key is empty or contains characters the store does not accept.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// A non-finite float was written.
    #[error("non-finite value for key {key}: {value}")]
    NonFinite {
        /// The key being written.
        key: String,
        /// The rejected value.
        value: f32,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupted(err.to_string())
    }
}
