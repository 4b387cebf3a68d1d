//! Error types for nsmirror core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in nsmirror core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Coordination store error.
    #[error("store error: {0}")]
    Store(#[from] nsmirror_store::StoreError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] nsmirror_codec::CodecError),

    /// I/O error on the local mirror or cache.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON payload error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid glob pattern.
    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// The pattern.
        pattern: String,
        /// Why it was rejected.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this is the store's not-found race.
    #[must_use]
    pub fn is_no_node(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_no_node())
    }

    /// Returns true if this is the store's already-exists race.
    #[must_use]
    pub fn is_node_exists(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_node_exists())
    }
}
