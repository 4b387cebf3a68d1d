//! # nsmirror Testkit
//!
//! Test utilities for nsmirror.
//!
//! This crate provides:
//! - [`TestNamespace`]: an in-memory store plus a scratch mirror directory
//! - Property-based generators for child sets and event batches
//! - Seeding helpers for trace and compaction scenarios
//! - [`HookedStore`]: runs code between two store calls of a reader
//!
//! ## Usage
//!
//! ```rust
//! use nsmirror_core::SyncOptions;
//! use nsmirror_testkit::prelude::*;
//!
//! let ns = TestNamespace::new();
//! ns.add_node("/apps/a", b"1");
//! ns.mirror().sync_children("/apps", SyncOptions::new()).unwrap();
//! assert_eq!(ns.local_children("/apps"), vec!["a"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod hooks;
pub mod scenarios;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::hooks::HookedStore;
    pub use crate::scenarios::*;
}

pub use fixtures::*;
pub use generators::*;
pub use hooks::HookedStore;
pub use scenarios::*;
