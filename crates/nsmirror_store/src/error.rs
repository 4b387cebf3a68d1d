//! Error types for coordination store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a [`crate::CoordinationStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The node does not exist.
    #[error("no node: {path}")]
    NoNode {
        /// Path that was not found.
        path: String,
    },

    /// The node already exists.
    #[error("node exists: {path}")]
    NodeExists {
        /// Path that already exists.
        path: String,
    },

    /// The node has children and cannot be deleted.
    #[error("node not empty: {path}")]
    NotEmpty {
        /// Path that still has children.
        path: String,
    },

    /// Compare-and-set version mismatch.
    #[error("bad version on {path}: expected {expected}, actual {actual}")]
    BadVersion {
        /// Path of the node.
        path: String,
        /// Version the caller expected.
        expected: i32,
        /// Version the store holds.
        actual: i32,
    },

    /// Ephemeral nodes cannot have children.
    #[error("ephemeral node cannot have children: {path}")]
    NoChildrenForEphemerals {
        /// Path of the ephemeral parent.
        path: String,
    },

    /// The path is malformed.
    #[error("invalid path: {path}")]
    InvalidPath {
        /// The offending path.
        path: String,
    },

    /// The connection to the store was lost.
    #[error("connection lost")]
    ConnectionLoss,

    /// The session owning this handle has expired.
    #[error("session expired")]
    SessionExpired,
}

impl StoreError {
    /// Creates a no-node error.
    pub fn no_node(path: impl Into<String>) -> Self {
        Self::NoNode { path: path.into() }
    }

    /// Creates a node-exists error.
    pub fn node_exists(path: impl Into<String>) -> Self {
        Self::NodeExists { path: path.into() }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Returns true for the not-found race (node removed by a concurrent actor).
    #[must_use]
    pub fn is_no_node(&self) -> bool {
        matches!(self, Self::NoNode { .. })
    }

    /// Returns true for the already-exists race (retried create).
    #[must_use]
    pub fn is_node_exists(&self) -> bool {
        matches!(self, Self::NodeExists { .. })
    }

    /// Returns true when the store itself is unreachable.
    ///
    /// Callers treat these as fatal and leave recovery to the supervisor.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionLoss | Self::SessionExpired)
    }
}
