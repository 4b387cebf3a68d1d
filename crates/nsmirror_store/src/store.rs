//! Coordination store trait definition.

use crate::error::StoreResult;
use std::fmt;

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Regular node, lives until deleted.
    Persistent,
    /// Deleted automatically when the creating session ends.
    Ephemeral,
    /// Persistent node with a store-assigned sequence suffix.
    PersistentSequential,
    /// Ephemeral node with a store-assigned sequence suffix.
    EphemeralSequential,
}

impl CreateMode {
    /// Returns true if the node is tied to its session.
    #[must_use]
    pub const fn is_ephemeral(self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }

    /// Returns true if the store appends a sequence suffix.
    #[must_use]
    pub const fn is_sequential(self) -> bool {
        matches!(self, Self::PersistentSequential | Self::EphemeralSequential)
    }
}

/// Node metadata maintained by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Data version, incremented on every `set`.
    pub version: i32,
    /// Children version, incremented on every child create/delete.
    pub cversion: i32,
    /// Creation time, milliseconds since the Unix epoch.
    pub ctime: i64,
    /// Last modification time, milliseconds since the Unix epoch.
    pub mtime: i64,
    /// Owning session for ephemeral nodes.
    pub ephemeral_owner: Option<u64>,
    /// Number of children.
    pub num_children: usize,
}

/// Permission bits of an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Perms(u8);

impl Perms {
    /// Read data and list children.
    pub const READ: Perms = Perms(0b00001);
    /// Set data.
    pub const WRITE: Perms = Perms(0b00010);
    /// Create children.
    pub const CREATE: Perms = Perms(0b00100);
    /// Delete children.
    pub const DELETE: Perms = Perms(0b01000);
    /// Change ACLs.
    pub const ADMIN: Perms = Perms(0b10000);
    /// All permissions.
    pub const ALL: Perms = Perms(0b11111);

    /// Returns the union of two permission sets.
    #[must_use]
    pub const fn union(self, other: Perms) -> Perms {
        Perms(self.0 | other.0)
    }

    /// Returns true if all bits of `other` are present.
    #[must_use]
    pub const fn contains(self, other: Perms) -> bool {
        self.0 & other.0 == other.0
    }
}

/// One access-control entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Acl {
    /// Authentication scheme (`world`, `sasl`, `digest`, ...).
    pub scheme: String,
    /// Identity within the scheme.
    pub id: String,
    /// Granted permissions.
    pub perms: Perms,
}

impl Acl {
    /// Creates an ACL entry.
    pub fn new(scheme: impl Into<String>, id: impl Into<String>, perms: Perms) -> Self {
        Self {
            scheme: scheme.into(),
            id: id.into(),
            perms,
        }
    }

    /// World-readable entry.
    #[must_use]
    pub fn world_readable() -> Self {
        Self::new("world", "anyone", Perms::READ)
    }

    /// Full access for everyone.
    #[must_use]
    pub fn open_unsafe() -> Self {
        Self::new("world", "anyone", Perms::ALL)
    }
}

/// Kind of change reported to a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// The watched node was created.
    Created,
    /// The watched node was deleted.
    Deleted,
    /// The watched node's data changed.
    DataChanged,
    /// The watched node's child set changed.
    ChildrenChanged,
    /// The session was lost; no further events will arrive.
    SessionExpired,
}

/// A notification delivered to a one-shot watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Path the watch was armed on.
    pub path: String,
    /// What happened.
    pub kind: WatchEventKind,
}

impl WatchEvent {
    /// Creates a watch event.
    pub fn new(path: impl Into<String>, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// A one-shot watch callback.
///
/// The store invokes it at most once, from its own dispatch thread, and never
/// while holding internal locks. It must be re-armed explicitly.
pub struct Watcher(Box<dyn FnOnce(WatchEvent) + Send>);

impl Watcher {
    /// Wraps a closure as a watcher.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(WatchEvent) + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Consumes the watcher, delivering `event`.
    pub fn fire(self, event: WatchEvent) {
        (self.0)(event);
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Watcher")
    }
}

/// A hierarchical, strongly-consistent coordination store.
///
/// Nodes are addressed by absolute slash-separated paths and carry an opaque
/// byte payload plus a [`Stat`]. Watches are one-shot: each fires at most
/// once and must be re-armed by the callback's owner.
///
/// # Invariants
///
/// - `create` in a sequential mode returns the actual path with a 10-digit,
///   monotonically increasing suffix, so lexical order is creation order
/// - `children` returns names in no particular order
/// - Watchers are never invoked while the store holds a lock
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - for tests and single-process deployments
/// - [`super::AclStore`] - decorator injecting default ACLs
pub trait CoordinationStore: Send + Sync {
    /// Creates a node and returns its actual path.
    ///
    /// # Errors
    ///
    /// Returns `NodeExists` if the node exists, `NoNode` if the parent is missing.
    fn create(&self, path: &str, data: &[u8], mode: CreateMode, acl: &[Acl]) -> StoreResult<String>;

    /// Creates every missing node along `path`. Existing nodes are left alone.
    fn ensure_path(&self, path: &str, acl: &[Acl]) -> StoreResult<()>;

    /// Reads a node's payload and stat.
    fn get(&self, path: &str) -> StoreResult<(Vec<u8>, Stat)>;

    /// Reads a node and arms a one-shot data watch on it.
    fn get_watch(&self, path: &str, watcher: Watcher) -> StoreResult<(Vec<u8>, Stat)>;

    /// Returns the node's stat, or `None` if it does not exist.
    fn exists(&self, path: &str) -> StoreResult<Option<Stat>>;

    /// Like [`CoordinationStore::exists`], arming a data watch even when the
    /// node is absent (it fires on creation).
    fn exists_watch(&self, path: &str, watcher: Watcher) -> StoreResult<Option<Stat>>;

    /// Replaces a node's payload. With `expected_version`, acts as compare-and-set.
    fn set(&self, path: &str, data: &[u8], expected_version: Option<i32>) -> StoreResult<Stat>;

    /// Deletes a childless node. With `expected_version`, acts as compare-and-delete.
    fn delete(&self, path: &str, expected_version: Option<i32>) -> StoreResult<()>;

    /// Lists child names.
    fn children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Lists child names and arms a one-shot children watch.
    fn children_watch(&self, path: &str, watcher: Watcher) -> StoreResult<Vec<String>>;

    /// Replaces a node's ACL list.
    fn set_acls(&self, path: &str, acl: &[Acl]) -> StoreResult<()>;

    /// Returns a node's ACL list.
    fn get_acls(&self, path: &str) -> StoreResult<Vec<Acl>>;
}

impl<S: CoordinationStore + ?Sized> CoordinationStore for std::sync::Arc<S> {
    fn create(&self, path: &str, data: &[u8], mode: CreateMode, acl: &[Acl]) -> StoreResult<String> {
        (**self).create(path, data, mode, acl)
    }

    fn ensure_path(&self, path: &str, acl: &[Acl]) -> StoreResult<()> {
        (**self).ensure_path(path, acl)
    }

    fn get(&self, path: &str) -> StoreResult<(Vec<u8>, Stat)> {
        (**self).get(path)
    }

    fn get_watch(&self, path: &str, watcher: Watcher) -> StoreResult<(Vec<u8>, Stat)> {
        (**self).get_watch(path, watcher)
    }

    fn exists(&self, path: &str) -> StoreResult<Option<Stat>> {
        (**self).exists(path)
    }

    fn exists_watch(&self, path: &str, watcher: Watcher) -> StoreResult<Option<Stat>> {
        (**self).exists_watch(path, watcher)
    }

    fn set(&self, path: &str, data: &[u8], expected_version: Option<i32>) -> StoreResult<Stat> {
        (**self).set(path, data, expected_version)
    }

    fn delete(&self, path: &str, expected_version: Option<i32>) -> StoreResult<()> {
        (**self).delete(path, expected_version)
    }

    fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        (**self).children(path)
    }

    fn children_watch(&self, path: &str, watcher: Watcher) -> StoreResult<Vec<String>> {
        (**self).children_watch(path, watcher)
    }

    fn set_acls(&self, path: &str, acl: &[Acl]) -> StoreResult<()> {
        (**self).set_acls(path, acl)
    }

    fn get_acls(&self, path: &str) -> StoreResult<Vec<Acl>> {
        (**self).get_acls(path)
    }
}

/// Convenience operations layered on any store.
pub trait StoreExt: CoordinationStore {
    /// Deletes a node, treating "already gone" as success.
    fn ensure_deleted(&self, path: &str) -> StoreResult<bool> {
        match self.delete(path, None) {
            Ok(()) => Ok(true),
            Err(e) if e.is_no_node() => {
                tracing::debug!(path, "node already deleted");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Creates or overwrites a persistent node, creating parents as needed.
    fn put(&self, path: &str, data: &[u8], acl: &[Acl]) -> StoreResult<()> {
        match self.set(path, data, None) {
            Ok(_) => Ok(()),
            Err(e) if e.is_no_node() => {
                if let Some(parent) = crate::path::parent(path) {
                    if parent != "/" {
                        self.ensure_path(parent, acl)?;
                    }
                }
                match self.create(path, data, CreateMode::Persistent, acl) {
                    Ok(_) => Ok(()),
                    // Lost a race with another writer; last write wins.
                    Err(e) if e.is_node_exists() => self.set(path, data, None).map(|_| ()),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Lists children, returning an empty list if the parent does not exist.
    fn children_or_empty(&self, path: &str) -> StoreResult<Vec<String>> {
        match self.children(path) {
            Ok(children) => Ok(children),
            Err(e) if e.is_no_node() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

impl<S: CoordinationStore + ?Sized> StoreExt for S {}
