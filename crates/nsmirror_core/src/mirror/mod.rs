//! Local filesystem mirror of namespace subtrees.
//!
//! [`TreeMirror::sync_children`] projects a directory's children into local
//! entries, optionally keeping a data watch on each one. Data watches follow
//! the [`WatchState`] machine; [`TreeMirror::reconcile`] is the single step
//! function that store callbacks and [`TreeMirror::tick`] both drive.
//!
//! Local layout:
//!
//! ```text
//! <root>/.modified           touched after every applied change
//! <root>/<ns path>           one file per data node, one directory per parent
//! <root>/<ns path>/.done     subtree is closed, never synced again
//! ```

mod diff;
mod local;
mod tree;
mod watch;

pub use diff::{diff_sorted, ChildDiff};
pub use tree::{ChildCallback, MirrorStats, SyncOptions, TreeMirror, WatchPredicate};
pub use watch::WatchState;

pub(crate) use local::write_atomic;
