//! Error types for the codec crate.

use std::io;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding namespace data.
#[derive(Error, Debug)]
pub enum CodecError {
    /// An event node name could not be parsed.
    #[error("malformed event name {name:?}: {message}")]
    MalformedName {
        /// The offending node name.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// The event type is not one this build knows about.
    #[error("unknown event type: {event_type}")]
    UnknownEventType {
        /// The unrecognized type.
        event_type: String,
    },

    /// The event data does not match its type.
    #[error("malformed {event_type} event data: {event_data:?}")]
    MalformedEventData {
        /// The event type.
        event_type: String,
        /// The raw data.
        event_data: String,
    },

    /// A snapshot blob could not be decompressed or opened.
    #[error("corrupt snapshot: {message}")]
    CorruptSnapshot {
        /// Description of the corruption.
        message: String,
    },

    /// The embedded relational store failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error while staging a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Creates a malformed name error.
    pub fn malformed_name(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedName {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed event data error.
    pub fn malformed_event_data(event_type: impl Into<String>, event_data: impl Into<String>) -> Self {
        Self::MalformedEventData {
            event_type: event_type.into(),
            event_data: event_data.into(),
        }
    }

    /// Creates a corrupt snapshot error.
    pub fn corrupt_snapshot(message: impl Into<String>) -> Self {
        Self::CorruptSnapshot {
            message: message.into(),
        }
    }
}
