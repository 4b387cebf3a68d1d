//! Default-ACL store wrapper.
//!
//! Every node written by a component should carry the deployment's default
//! ACL list (typically "world readable" plus an admin role). Rather than
//! threading the list through every call site, [`AclStore`] wraps any other
//! store and fills it in whenever the caller passes an empty list.
//!
//! ## Behavior
//!
//! - `create`, `ensure_path` and `set_acls` with an empty ACL list get the
//!   default list
//! - An explicit non-empty list is passed through unchanged
//! - Reads and watches are delegated untouched

use crate::error::StoreResult;
use crate::store::{Acl, CoordinationStore, CreateMode, Perms, Stat, Watcher};

/// A store that injects default ACLs before delegating to the inner store.
///
/// # Example
///
/// ```rust
/// use nsmirror_store::{Acl, AclStore, CoordinationStore, CreateMode, InMemoryStore};
///
/// let store = AclStore::new(InMemoryStore::new(), vec![Acl::world_readable()]);
/// store.create("/a", b"", CreateMode::Persistent, &[]).unwrap();
/// assert_eq!(store.get_acls("/a").unwrap(), vec![Acl::world_readable()]);
/// ```
#[derive(Debug)]
pub struct AclStore<S> {
    inner: S,
    default_acl: Vec<Acl>,
}

impl<S: CoordinationStore> AclStore<S> {
    /// Wraps `inner`, using `default_acl` when callers pass none.
    pub fn new(inner: S, default_acl: Vec<Acl>) -> Self {
        Self { inner, default_acl }
    }

    /// Wraps `inner` with a world-readable entry plus full access for `admin`.
    pub fn with_admin(inner: S, scheme: &str, admin: &str) -> Self {
        Self::new(
            inner,
            vec![Acl::world_readable(), Acl::new(scheme, admin, Perms::ALL)],
        )
    }

    /// Returns the default ACL list.
    #[must_use]
    pub fn default_acl(&self) -> &[Acl] {
        &self.default_acl
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn acl_or_default<'a>(&'a self, acl: &'a [Acl]) -> &'a [Acl] {
        if acl.is_empty() {
            &self.default_acl
        } else {
            acl
        }
    }
}

impl<S: CoordinationStore> CoordinationStore for AclStore<S> {
    fn create(&self, path: &str, data: &[u8], mode: CreateMode, acl: &[Acl]) -> StoreResult<String> {
        self.inner.create(path, data, mode, self.acl_or_default(acl))
    }

    fn ensure_path(&self, path: &str, acl: &[Acl]) -> StoreResult<()> {
        self.inner.ensure_path(path, self.acl_or_default(acl))
    }

    fn get(&self, path: &str) -> StoreResult<(Vec<u8>, Stat)> {
        self.inner.get(path)
    }

    fn get_watch(&self, path: &str, watcher: Watcher) -> StoreResult<(Vec<u8>, Stat)> {
        self.inner.get_watch(path, watcher)
    }

    fn exists(&self, path: &str) -> StoreResult<Option<Stat>> {
        self.inner.exists(path)
    }

    fn exists_watch(&self, path: &str, watcher: Watcher) -> StoreResult<Option<Stat>> {
        self.inner.exists_watch(path, watcher)
    }

    fn set(&self, path: &str, data: &[u8], expected_version: Option<i32>) -> StoreResult<Stat> {
        self.inner.set(path, data, expected_version)
    }

    fn delete(&self, path: &str, expected_version: Option<i32>) -> StoreResult<()> {
        self.inner.delete(path, expected_version)
    }

    fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        self.inner.children(path)
    }

    fn children_watch(&self, path: &str, watcher: Watcher) -> StoreResult<Vec<String>> {
        self.inner.children_watch(path, watcher)
    }

    fn set_acls(&self, path: &str, acl: &[Acl]) -> StoreResult<()> {
        self.inner.set_acls(path, self.acl_or_default(acl))
    }

    fn get_acls(&self, path: &str) -> StoreResult<Vec<Acl>> {
        self.inner.get_acls(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    #[test]
    fn acl_injected_on_create() {
        let store = AclStore::with_admin(InMemoryStore::new(), "sasl", "admins");
        store.create("/a", b"", CreateMode::Persistent, &[]).unwrap();
        let acls = store.get_acls("/a").unwrap();
        assert_eq!(acls.len(), 2);
        assert!(acls[1].perms.contains(Perms::DELETE));
    }

    #[test]
    fn acl_explicit_list_is_kept() {
        let store = AclStore::new(InMemoryStore::new(), vec![Acl::world_readable()]);
        let explicit = vec![Acl::open_unsafe()];
        store.create("/a", b"", CreateMode::Persistent, &explicit).unwrap();
        assert_eq!(store.get_acls("/a").unwrap(), explicit);
    }

    #[test]
    fn acl_injected_on_every_ensured_node() {
        let store = AclStore::new(InMemoryStore::new(), vec![Acl::world_readable()]);
        store.ensure_path("/a/b/c", &[]).unwrap();
        for path in ["/a", "/a/b", "/a/b/c"] {
            assert_eq!(store.get_acls(path).unwrap(), vec![Acl::world_readable()]);
        }
    }

    #[test]
    fn acl_set_acls_with_empty_resets_to_default() {
        let store = AclStore::new(InMemoryStore::new(), vec![Acl::world_readable()]);
        store.create("/a", b"", CreateMode::Persistent, &[Acl::open_unsafe()]).unwrap();
        store.set_acls("/a", &[]).unwrap();
        assert_eq!(store.get_acls("/a").unwrap(), vec![Acl::world_readable()]);
    }
}
