//! # nsmirror Codec
//!
//! Wire formats shared by the mirror, trace and history components.
//!
//! This crate provides:
//! - [`EventRecord`]: the comma-delimited event node name
//! - [`TraceEvent`]: typed lifecycle events with fail-closed decoding
//! - [`LocalCacheName`] / [`RemoteCacheName`]: content-addressed cache names
//! - [`SnapshotCodec`]: compressed relational snapshot blobs
//!
//! ## Usage
//!
//! ```
//! use nsmirror_codec::{EventRecord, TraceEvent};
//!
//! let record = EventRecord::parse("proid.app#0000000001,1000,host1,finished,0.0").unwrap();
//! let event = TraceEvent::from_record(&record).unwrap();
//! assert!(event.is_terminal());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache_name;
mod error;
mod event;
mod snapshot;
mod trace_event;

pub use cache_name::{LocalCacheName, RemoteCacheName, CACHE_SEPARATOR};
pub use error::{CodecError, CodecResult};
pub use event::{entity_glob, entity_of, parse_sorted, EventRecord, FIELD_DELIMITER};
pub use snapshot::{SnapshotCodec, SnapshotDb, SnapshotRow, DEFAULT_COMPRESSION_LEVEL, TABLE_NAME};
pub use trace_event::{TraceEvent, TERMINAL_EVENT_TYPES};
