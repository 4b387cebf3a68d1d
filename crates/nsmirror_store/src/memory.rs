//! In-memory coordination store.

use crate::error::{StoreError, StoreResult};
use crate::path;
use crate::store::{Acl, CoordinationStore, CreateMode, Stat, WatchEvent, WatchEventKind, Watcher};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// When watch notifications are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchDelivery {
    /// Watchers run on the mutating thread right after the mutation.
    #[default]
    Inline,
    /// Watchers are queued until [`InMemoryStore::deliver_watches`] is called.
    ///
    /// Several mutations between deliveries coalesce into one fire per watch,
    /// which is what a real store does under load.
    Deferred,
}

#[derive(Debug)]
struct Node {
    data: Vec<u8>,
    stat: Stat,
    acl: Vec<Acl>,
    children: BTreeSet<String>,
    next_sequence: u64,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<String, Node>,
    data_watches: HashMap<String, Vec<Watcher>>,
    child_watches: HashMap<String, Vec<Watcher>>,
    pending: Vec<(Watcher, WatchEvent)>,
    next_session: u64,
    fixed_time_ms: Option<i64>,
}

impl Tree {
    fn now_ms(&self) -> i64 {
        self.fixed_time_ms.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or_default()
        })
    }

    fn take_data_watches(&mut self, path: &str, kind: WatchEventKind, out: &mut Vec<(Watcher, WatchEvent)>) {
        if let Some(watchers) = self.data_watches.remove(path) {
            out.extend(watchers.into_iter().map(|w| (w, WatchEvent::new(path, kind))));
        }
    }

    fn take_child_watches(&mut self, path: &str, kind: WatchEventKind, out: &mut Vec<(Watcher, WatchEvent)>) {
        if let Some(watchers) = self.child_watches.remove(path) {
            out.extend(watchers.into_iter().map(|w| (w, WatchEvent::new(path, kind))));
        }
    }

    fn node(&self, path: &str) -> StoreResult<&Node> {
        self.nodes.get(path).ok_or_else(|| StoreError::no_node(path))
    }

    fn remove_node(&mut self, node_path: &str, fired: &mut Vec<(Watcher, WatchEvent)>) {
        self.nodes.remove(node_path);
        if let Some(parent_path) = path::parent(node_path) {
            let now = self.now_ms();
            if let Some(parent) = self.nodes.get_mut(parent_path) {
                parent.children.remove(path::basename(node_path));
                parent.stat.cversion += 1;
                parent.stat.num_children = parent.children.len();
                parent.stat.mtime = parent.stat.mtime.max(now);
            }
            self.take_child_watches(parent_path, WatchEventKind::ChildrenChanged, fired);
        }
        self.take_data_watches(node_path, WatchEventKind::Deleted, fired);
        self.take_child_watches(node_path, WatchEventKind::Deleted, fired);
    }
}

struct Shared {
    tree: Mutex<Tree>,
    delivery: WatchDelivery,
}

/// An in-memory, ZooKeeper-like coordination store.
///
/// Every handle returned by [`InMemoryStore::connect`] shares the same tree but
/// owns its own session, so ephemeral nodes can be expired per handle.
///
/// # Thread Safety
///
/// The tree is guarded by one mutex. Watchers are collected while the lock is
/// held and invoked after it is released, so callbacks may re-enter the store.
///
/// # Example
///
/// ```rust
/// use nsmirror_store::{CoordinationStore, CreateMode, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.create("/a", b"hello", CreateMode::Persistent, &[]).unwrap();
/// let (data, stat) = store.get("/a").unwrap();
/// assert_eq!(data, b"hello");
/// assert_eq!(stat.version, 0);
/// ```
pub struct InMemoryStore {
    shared: Arc<Shared>,
    session: u64,
    connected: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new store with inline watch delivery.
    #[must_use]
    pub fn new() -> Self {
        Self::with_delivery(WatchDelivery::Inline)
    }

    /// Creates a new store with the given watch delivery mode.
    #[must_use]
    pub fn with_delivery(delivery: WatchDelivery) -> Self {
        let mut tree = Tree {
            next_session: 2,
            ..Tree::default()
        };
        tree.nodes.insert(
            "/".to_string(),
            Node {
                data: Vec::new(),
                stat: Stat::default(),
                acl: Vec::new(),
                children: BTreeSet::new(),
                next_sequence: 0,
            },
        );
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(tree),
                delivery,
            }),
            session: 1,
            connected: AtomicBool::new(true),
        }
    }

    /// Opens another handle on the same tree with a fresh session.
    #[must_use]
    pub fn connect(&self) -> Self {
        let session = {
            let mut tree = self.shared.tree.lock();
            let id = tree.next_session;
            tree.next_session += 1;
            id
        };
        Self {
            shared: Arc::clone(&self.shared),
            session,
            connected: AtomicBool::new(true),
        }
    }

    /// Returns this handle's session id.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.session
    }

    /// Ends this handle's session, deleting its ephemeral nodes.
    pub fn close_session(&self) {
        let fired = {
            let mut tree = self.shared.tree.lock();
            let mut owned: Vec<String> = tree
                .nodes
                .iter()
                .filter(|(_, node)| node.stat.ephemeral_owner == Some(self.session))
                .map(|(p, _)| p.clone())
                .collect();
            owned.sort();
            let mut fired = Vec::new();
            for node_path in owned {
                tree.remove_node(&node_path, &mut fired);
            }
            fired
        };
        self.dispatch(fired);
    }

    /// Simulates a lost connection: every later call on this handle fails.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Pins the store clock (milliseconds since the epoch) used for `ctime`/`mtime`.
    pub fn set_time_ms(&self, ms: i64) {
        self.shared.tree.lock().fixed_time_ms = Some(ms);
    }

    /// Delivers queued watch notifications (deferred mode). Returns how many fired.
    pub fn deliver_watches(&self) -> usize {
        let pending = std::mem::take(&mut self.shared.tree.lock().pending);
        let count = pending.len();
        for (watcher, event) in pending {
            watcher.fire(event);
        }
        count
    }

    /// Number of armed watches (data and children) across all paths.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        let tree = self.shared.tree.lock();
        tree.data_watches.values().map(Vec::len).sum::<usize>()
            + tree.child_watches.values().map(Vec::len).sum::<usize>()
    }

    /// Number of nodes, including the root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.shared.tree.lock().nodes.len()
    }

    fn check_connected(&self) -> StoreResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::ConnectionLoss)
        }
    }

    fn dispatch(&self, fired: Vec<(Watcher, WatchEvent)>) {
        if fired.is_empty() {
            return;
        }
        match self.shared.delivery {
            WatchDelivery::Inline => {
                for (watcher, event) in fired {
                    watcher.fire(event);
                }
            }
            WatchDelivery::Deferred => {
                self.shared.tree.lock().pending.extend(fired);
            }
        }
    }

    fn create_locked(
        &self,
        tree: &mut Tree,
        node_path: &str,
        data: &[u8],
        mode: CreateMode,
        acl: &[Acl],
        fired: &mut Vec<(Watcher, WatchEvent)>,
    ) -> StoreResult<String> {
        if node_path == "/" {
            return Err(StoreError::node_exists("/"));
        }
        let parent_path = path::parent(node_path).ok_or_else(|| StoreError::invalid_path(node_path))?;
        let now = tree.now_ms();

        let parent = tree
            .nodes
            .get_mut(parent_path)
            .ok_or_else(|| StoreError::no_node(parent_path))?;
        if parent.stat.ephemeral_owner.is_some() {
            return Err(StoreError::NoChildrenForEphemerals {
                path: parent_path.to_string(),
            });
        }

        let actual = if mode.is_sequential() {
            let seq = parent.next_sequence;
            parent.next_sequence += 1;
            format!("{node_path}{seq:010}")
        } else {
            node_path.to_string()
        };
        let name = path::basename(&actual).to_string();
        if parent.children.contains(&name) {
            return Err(StoreError::node_exists(actual));
        }
        parent.children.insert(name);
        parent.stat.cversion += 1;
        parent.stat.num_children = parent.children.len();

        tree.nodes.insert(
            actual.clone(),
            Node {
                data: data.to_vec(),
                stat: Stat {
                    version: 0,
                    cversion: 0,
                    ctime: now,
                    mtime: now,
                    ephemeral_owner: mode.is_ephemeral().then_some(self.session),
                    num_children: 0,
                },
                acl: acl.to_vec(),
                children: BTreeSet::new(),
                next_sequence: 0,
            },
        );

        tree.take_data_watches(&actual, WatchEventKind::Created, fired);
        tree.take_child_watches(parent_path, WatchEventKind::ChildrenChanged, fired);
        Ok(actual)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("session", &self.session)
            .field("delivery", &self.shared.delivery)
            .finish()
    }
}

impl CoordinationStore for InMemoryStore {
    fn create(&self, node_path: &str, data: &[u8], mode: CreateMode, acl: &[Acl]) -> StoreResult<String> {
        self.check_connected()?;
        path::validate(node_path)?;
        let mut fired = Vec::new();
        let actual = {
            let mut tree = self.shared.tree.lock();
            self.create_locked(&mut tree, node_path, data, mode, acl, &mut fired)?
        };
        self.dispatch(fired);
        Ok(actual)
    }

    fn ensure_path(&self, node_path: &str, acl: &[Acl]) -> StoreResult<()> {
        self.check_connected()?;
        path::validate(node_path)?;
        if node_path == "/" {
            return Ok(());
        }
        let mut fired = Vec::new();
        {
            let mut tree = self.shared.tree.lock();
            let mut targets = path::ancestors(node_path);
            targets.push(node_path);
            for target in targets {
                if tree.nodes.contains_key(target) {
                    continue;
                }
                self.create_locked(&mut tree, target, b"", CreateMode::Persistent, acl, &mut fired)?;
            }
        }
        self.dispatch(fired);
        Ok(())
    }

    fn get(&self, node_path: &str) -> StoreResult<(Vec<u8>, Stat)> {
        self.check_connected()?;
        let tree = self.shared.tree.lock();
        let node = tree.node(node_path)?;
        Ok((node.data.clone(), node.stat))
    }

    fn get_watch(&self, node_path: &str, watcher: Watcher) -> StoreResult<(Vec<u8>, Stat)> {
        self.check_connected()?;
        let mut tree = self.shared.tree.lock();
        let (data, stat) = {
            let node = tree.node(node_path)?;
            (node.data.clone(), node.stat)
        };
        tree.data_watches
            .entry(node_path.to_string())
            .or_default()
            .push(watcher);
        Ok((data, stat))
    }

    fn exists(&self, node_path: &str) -> StoreResult<Option<Stat>> {
        self.check_connected()?;
        let tree = self.shared.tree.lock();
        Ok(tree.nodes.get(node_path).map(|n| n.stat))
    }

    fn exists_watch(&self, node_path: &str, watcher: Watcher) -> StoreResult<Option<Stat>> {
        self.check_connected()?;
        path::validate(node_path)?;
        let mut tree = self.shared.tree.lock();
        let stat = tree.nodes.get(node_path).map(|n| n.stat);
        tree.data_watches
            .entry(node_path.to_string())
            .or_default()
            .push(watcher);
        Ok(stat)
    }

    fn set(&self, node_path: &str, data: &[u8], expected_version: Option<i32>) -> StoreResult<Stat> {
        self.check_connected()?;
        let mut fired = Vec::new();
        let stat = {
            let mut tree = self.shared.tree.lock();
            let now = tree.now_ms();
            let node = tree
                .nodes
                .get_mut(node_path)
                .ok_or_else(|| StoreError::no_node(node_path))?;
            if let Some(expected) = expected_version {
                if expected != node.stat.version {
                    return Err(StoreError::BadVersion {
                        path: node_path.to_string(),
                        expected,
                        actual: node.stat.version,
                    });
                }
            }
            node.data = data.to_vec();
            node.stat.version += 1;
            node.stat.mtime = now;
            let stat = node.stat;
            tree.take_data_watches(node_path, WatchEventKind::DataChanged, &mut fired);
            stat
        };
        self.dispatch(fired);
        Ok(stat)
    }

    fn delete(&self, node_path: &str, expected_version: Option<i32>) -> StoreResult<()> {
        self.check_connected()?;
        if node_path == "/" {
            return Err(StoreError::invalid_path("/"));
        }
        let mut fired = Vec::new();
        {
            let mut tree = self.shared.tree.lock();
            let node = tree.node(node_path)?;
            if let Some(expected) = expected_version {
                if expected != node.stat.version {
                    return Err(StoreError::BadVersion {
                        path: node_path.to_string(),
                        expected,
                        actual: node.stat.version,
                    });
                }
            }
            if !node.children.is_empty() {
                return Err(StoreError::NotEmpty {
                    path: node_path.to_string(),
                });
            }
            tree.remove_node(node_path, &mut fired);
        }
        self.dispatch(fired);
        Ok(())
    }

    fn children(&self, node_path: &str) -> StoreResult<Vec<String>> {
        self.check_connected()?;
        let tree = self.shared.tree.lock();
        Ok(tree.node(node_path)?.children.iter().cloned().collect())
    }

    fn children_watch(&self, node_path: &str, watcher: Watcher) -> StoreResult<Vec<String>> {
        self.check_connected()?;
        let mut tree = self.shared.tree.lock();
        let children: Vec<String> = tree.node(node_path)?.children.iter().cloned().collect();
        tree.child_watches
            .entry(node_path.to_string())
            .or_default()
            .push(watcher);
        Ok(children)
    }

    fn set_acls(&self, node_path: &str, acl: &[Acl]) -> StoreResult<()> {
        self.check_connected()?;
        let mut tree = self.shared.tree.lock();
        let node = tree
            .nodes
            .get_mut(node_path)
            .ok_or_else(|| StoreError::no_node(node_path))?;
        node.acl = acl.to_vec();
        Ok(())
    }

    fn get_acls(&self, node_path: &str) -> StoreResult<Vec<Acl>> {
        self.check_connected()?;
        let tree = self.shared.tree.lock();
        Ok(tree.node(node_path)?.acl.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_watcher(counter: &Arc<AtomicUsize>, kinds: &Arc<Mutex<Vec<WatchEventKind>>>) -> Watcher {
        let counter = Arc::clone(counter);
        let kinds = Arc::clone(kinds);
        Watcher::new(move |event| {
            counter.fetch_add(1, Ordering::SeqCst);
            kinds.lock().push(event.kind);
        })
    }

    #[test]
    fn memory_create_and_get() {
        let store = InMemoryStore::new();
        store.create("/a", b"data", CreateMode::Persistent, &[]).unwrap();
        let (data, stat) = store.get("/a").unwrap();
        assert_eq!(data, b"data");
        assert_eq!(stat.version, 0);
        assert_eq!(stat.ephemeral_owner, None);
    }

    #[test]
    fn memory_create_missing_parent_fails() {
        let store = InMemoryStore::new();
        let err = store.create("/a/b", b"", CreateMode::Persistent, &[]).unwrap_err();
        assert!(err.is_no_node());
    }

    #[test]
    fn memory_create_duplicate_fails() {
        let store = InMemoryStore::new();
        store.create("/a", b"", CreateMode::Persistent, &[]).unwrap();
        let err = store.create("/a", b"", CreateMode::Persistent, &[]).unwrap_err();
        assert!(err.is_node_exists());
    }

    #[test]
    fn memory_sequential_names_sort_chronologically() {
        let store = InMemoryStore::new();
        store.ensure_path("/h", &[]).unwrap();
        let first = store.create("/h/snap-", b"", CreateMode::PersistentSequential, &[]).unwrap();
        let second = store.create("/h/snap-", b"", CreateMode::PersistentSequential, &[]).unwrap();
        assert_eq!(first, "/h/snap-0000000000");
        assert_eq!(second, "/h/snap-0000000001");
        assert!(first < second);
    }

    #[test]
    fn memory_ensure_path_is_idempotent() {
        let store = InMemoryStore::new();
        store.ensure_path("/a/b/c", &[]).unwrap();
        store.ensure_path("/a/b/c", &[]).unwrap();
        assert!(store.exists("/a/b").unwrap().is_some());
        assert_eq!(store.children("/a/b").unwrap(), vec!["c".to_string()]);
    }

    #[test]
    fn memory_set_with_version() {
        let store = InMemoryStore::new();
        store.create("/a", b"v0", CreateMode::Persistent, &[]).unwrap();
        let stat = store.set("/a", b"v1", Some(0)).unwrap();
        assert_eq!(stat.version, 1);
        let err = store.set("/a", b"v2", Some(0)).unwrap_err();
        assert!(matches!(err, StoreError::BadVersion { actual: 1, .. }));
    }

    #[test]
    fn memory_delete_non_empty_fails() {
        let store = InMemoryStore::new();
        store.ensure_path("/a/b", &[]).unwrap();
        assert!(matches!(store.delete("/a", None), Err(StoreError::NotEmpty { .. })));
    }

    #[test]
    fn memory_data_watch_fires_once() {
        let store = InMemoryStore::new();
        store.create("/a", b"", CreateMode::Persistent, &[]).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let kinds = Arc::new(Mutex::new(Vec::new()));
        store.get_watch("/a", counter_watcher(&count, &kinds)).unwrap();

        store.set("/a", b"1", None).unwrap();
        store.set("/a", b"2", None).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*kinds.lock(), vec![WatchEventKind::DataChanged]);
    }

    #[test]
    fn memory_children_watch_fires_on_create_and_delete() {
        let store = InMemoryStore::new();
        store.ensure_path("/dir", &[]).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let kinds = Arc::new(Mutex::new(Vec::new()));

        store.children_watch("/dir", counter_watcher(&count, &kinds)).unwrap();
        store.create("/dir/x", b"", CreateMode::Persistent, &[]).unwrap();
        store.children_watch("/dir", counter_watcher(&count, &kinds)).unwrap();
        store.delete("/dir/x", None).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(
            *kinds.lock(),
            vec![WatchEventKind::ChildrenChanged, WatchEventKind::ChildrenChanged]
        );
    }

    #[test]
    fn memory_exists_watch_fires_on_creation() {
        let store = InMemoryStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let kinds = Arc::new(Mutex::new(Vec::new()));
        assert!(store.exists_watch("/later", counter_watcher(&count, &kinds)).unwrap().is_none());
        store.create("/later", b"", CreateMode::Persistent, &[]).unwrap();
        assert_eq!(*kinds.lock(), vec![WatchEventKind::Created]);
    }

    #[test]
    fn memory_watcher_may_reenter_store() {
        let store = Arc::new(InMemoryStore::new());
        store.create("/a", b"", CreateMode::Persistent, &[]).unwrap();
        let inner = Arc::clone(&store);
        let seen = Arc::new(Mutex::new(None));
        let seen_cb = Arc::clone(&seen);
        store
            .get_watch(
                "/a",
                Watcher::new(move |_| {
                    *seen_cb.lock() = Some(inner.get("/a").unwrap().0);
                }),
            )
            .unwrap();
        store.set("/a", b"new", None).unwrap();
        assert_eq!(seen.lock().as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn memory_deferred_delivery_coalesces() {
        let store = InMemoryStore::with_delivery(WatchDelivery::Deferred);
        store.ensure_path("/dir", &[]).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let kinds = Arc::new(Mutex::new(Vec::new()));
        store.children_watch("/dir", counter_watcher(&count, &kinds)).unwrap();

        store.create("/dir/a", b"", CreateMode::Persistent, &[]).unwrap();
        store.create("/dir/b", b"", CreateMode::Persistent, &[]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(store.deliver_watches(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memory_close_session_removes_ephemerals() {
        let store = InMemoryStore::new();
        let other = store.connect();
        store.ensure_path("/servers", &[]).unwrap();
        other.create("/servers/h1", b"", CreateMode::Ephemeral, &[]).unwrap();
        store.create("/servers/h2", b"", CreateMode::Persistent, &[]).unwrap();

        other.close_session();
        assert_eq!(store.children("/servers").unwrap(), vec!["h2".to_string()]);
    }

    #[test]
    fn memory_ephemeral_cannot_have_children() {
        let store = InMemoryStore::new();
        store.create("/e", b"", CreateMode::Ephemeral, &[]).unwrap();
        let err = store.create("/e/c", b"", CreateMode::Persistent, &[]).unwrap_err();
        assert!(matches!(err, StoreError::NoChildrenForEphemerals { .. }));
    }

    #[test]
    fn memory_disconnect_fails_every_call() {
        let store = InMemoryStore::new();
        store.disconnect();
        assert_eq!(store.get("/").unwrap_err(), StoreError::ConnectionLoss);
        assert!(store.children("/").unwrap_err().is_connection_error());
    }

    #[test]
    fn memory_fixed_clock_sets_mtime() {
        let store = InMemoryStore::new();
        store.set_time_ms(1_000_000);
        store.create("/a", b"", CreateMode::Persistent, &[]).unwrap();
        assert_eq!(store.get("/a").unwrap().1.mtime, 1_000_000);
        store.set_time_ms(2_000_000);
        store.set("/a", b"x", None).unwrap();
        assert_eq!(store.get("/a").unwrap().1.mtime, 2_000_000);
    }
}
