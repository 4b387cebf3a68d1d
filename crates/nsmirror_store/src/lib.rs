//! # nsmirror Store
//!
//! Coordination store interface and implementations for nsmirror.
//!
//! This crate is the lowest layer: it describes the ZooKeeper-like service
//! every other component talks to. Stores are **opaque payload holders** -
//! they do not interpret node names or data.
//!
//! ## Design Principles
//!
//! - Hierarchical nodes with byte payloads and a store-maintained [`Stat`]
//! - One-shot data and children watches that must be re-armed
//! - Ephemeral and sequential nodes
//! - Must be `Send + Sync`; watch callbacks arrive on store threads
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - shared in-process tree with sessions
//! - [`AclStore`] - wrapper that injects default ACLs
//!
//! ## Example
//!
//! ```rust
//! use nsmirror_store::{CoordinationStore, CreateMode, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.ensure_path("/scheduled", &[]).unwrap();
//! store.create("/scheduled/app#0001", b"", CreateMode::Persistent, &[]).unwrap();
//! assert_eq!(store.children("/scheduled").unwrap(), vec!["app#0001".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod acl;
mod error;
mod memory;
pub mod path;
mod store;

pub use acl::AclStore;
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, WatchDelivery};
pub use store::{
    Acl, CoordinationStore, CreateMode, Perms, Stat, StoreExt, WatchEvent, WatchEventKind, Watcher,
};
