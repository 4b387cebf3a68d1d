//! # nsmirror Core
//!
//! Namespace mirroring and event-log compaction engine.
//!
//! This crate provides:
//! - [`TreeMirror`]: watch-driven local filesystem copy of namespace subtrees
//! - [`TracePublisher`] / [`TraceLoop`]: idempotent publish and ordered
//!   replay of per-entity lifecycle events
//! - [`HistoryCompactor`]: batches aged entries of inactive entities into
//!   compressed snapshots and bounds how many snapshots are kept
//! - [`HistoryReader`]: queries spanning live nodes and snapshots
//! - [`ContentCache`]: content-addressed push/pull of named blobs
//!
//! Every in-memory structure here is a cache over the coordination store.
//! After a crash, state is rebuilt from the store.
//!
//! ## Example
//!
//! ```rust
//! use nsmirror_codec::TraceEvent;
//! use nsmirror_core::{HistoryReader, Layout, TraceConfig, TraceKind, TracePublisher};
//! use nsmirror_store::InMemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let publisher = TracePublisher::new(store.clone(), Layout::default(), TraceConfig::new("host1"));
//! let event = TraceEvent::Pending { why: String::new() };
//! publisher.publish(TraceKind::Instance, 1000.0, "app#0001", &event, b"").unwrap();
//!
//! let reader = HistoryReader::new(store, Layout::default());
//! let events = reader.entity_events(TraceKind::Instance, "app#0001").unwrap();
//! assert_eq!(events.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod fatal;
mod history;
mod layout;
pub mod mirror;
mod trace;

pub use cache::{checksum, ContentCache};
pub use config::{CompactionConfig, MirrorConfig, TraceConfig, DEFAULT_DONE_MARKER, DEFAULT_MODIFIED_MARKER};
pub use error::{CoreError, CoreResult};
pub use fatal::{AbortOnFatal, FatalHandler, RecordingFatal};
pub use history::{CompactionReport, CompactionTarget, EntityState, EntityStatus, HistoryCompactor, HistoryReader};
pub use layout::{shard_of, Layout, TraceKind};
pub use mirror::{MirrorStats, SyncOptions, TreeMirror, WatchState};
pub use trace::{FinishedSummary, Published, TraceHandler, TraceLoop, TracePublisher, TraceState};
