//! A store wrapper that runs code in the middle of another component's reads.
//!
//! Used to interleave a compaction or a publish with a reader that is
//! between two store calls.

use nsmirror_store::{Acl, CoordinationStore, CreateMode, InMemoryStore, Stat, StoreResult, Watcher};
use parking_lot::Mutex;
use std::sync::Arc;

type Hook = Box<dyn FnOnce() + Send>;

/// Delegates to an [`InMemoryStore`], running registered hooks right after
/// the first listing of their path returns.
pub struct HookedStore {
    inner: Arc<InMemoryStore>,
    hooks: Mutex<Vec<(String, Hook)>>,
}

impl HookedStore {
    /// Wraps `inner`.
    pub fn new(inner: Arc<InMemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            hooks: Mutex::new(Vec::new()),
        })
    }

    /// Runs `hook` once, after the next `children` call on `path` has read
    /// the listing and before it is returned.
    pub fn after_listing<F>(&self, path: impl Into<String>, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.lock().push((path.into(), Box::new(hook)));
    }

    /// Number of hooks that have not run yet.
    pub fn pending(&self) -> usize {
        self.hooks.lock().len()
    }

    fn run_hook(&self, path: &str) {
        let hook = {
            let mut hooks = self.hooks.lock();
            hooks
                .iter()
                .position(|(p, _)| p == path)
                .map(|i| hooks.remove(i).1)
        };
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl CoordinationStore for HookedStore {
    fn create(&self, path: &str, data: &[u8], mode: CreateMode, acl: &[Acl]) -> StoreResult<String> {
        self.inner.create(path, data, mode, acl)
    }

    fn ensure_path(&self, path: &str, acl: &[Acl]) -> StoreResult<()> {
        self.inner.ensure_path(path, acl)
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
        let listing = self.inner.children(path);
        self.run_hook(path);
        listing
    }

    fn children_watch(&self, path: &str, watcher: Watcher) -> StoreResult<Vec<String>> {
        self.inner.children_watch(path, watcher)
    }

    fn set_acls(&self, path: &str, acl: &[Acl]) -> StoreResult<()> {
        self.inner.set_acls(path, acl)
    }

    fn get_acls(&self, path: &str) -> StoreResult<Vec<Acl>> {
        self.inner.get_acls(path)
    }
}
