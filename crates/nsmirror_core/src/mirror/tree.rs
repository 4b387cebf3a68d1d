//! Watch-driven mirror of a namespace subtree.

use super::diff::diff_sorted;
use super::local::LocalTree;
use super::watch::{WatchState, WatchTable};
use crate::config::MirrorConfig;
use crate::error::{CoreError, CoreResult};
use crate::fatal::{AbortOnFatal, FatalHandler};
use nsmirror_store::{path, CoordinationStore, StoreError, WatchEvent, WatchEventKind, Watcher};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Weak};

/// Called with the mirror and the full path of an added or removed child.
pub type ChildCallback = Arc<dyn Fn(&TreeMirror, &str) -> CoreResult<()> + Send + Sync>;

/// Decides from a directory's current children whether to keep watching it.
pub type WatchPredicate = Arc<dyn Fn(&str, &[String]) -> bool + Send + Sync>;

/// How [`TreeMirror::sync_children`] treats one directory.
#[derive(Clone, Default)]
pub struct SyncOptions {
    watch_data: bool,
    on_add: Option<ChildCallback>,
    on_del: Option<ChildCallback>,
    need_watch: Option<WatchPredicate>,
    cont_watch: Option<WatchPredicate>,
}

impl SyncOptions {
    /// Default options: one-shot data copies, local removal on delete, always watch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps a data watch on every child.
    #[must_use]
    pub fn watch_data(mut self, watch: bool) -> Self {
        self.watch_data = watch;
        self
    }

    /// Replaces the add action. The default copies the child's data.
    #[must_use]
    pub fn on_add<F>(mut self, f: F) -> Self
    where
        F: Fn(&TreeMirror, &str) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.on_add = Some(Arc::new(f));
        self
    }

    /// Replaces the delete action. The default removes the local entry.
    #[must_use]
    pub fn on_del<F>(mut self, f: F) -> Self
    where
        F: Fn(&TreeMirror, &str) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.on_del = Some(Arc::new(f));
        self
    }

    /// Evaluated on the first sync. Returning false syncs once, writes the
    /// done sentinel and never watches the directory again.
    #[must_use]
    pub fn need_watch<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[String]) -> bool + Send + Sync + 'static,
    {
        self.need_watch = Some(Arc::new(f));
        self
    }

    /// Evaluated on every watch fire. Returning false syncs once more and
    /// stops re-arming.
    #[must_use]
    pub fn cont_watch<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[String]) -> bool + Send + Sync + 'static,
    {
        self.cont_watch = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOptions")
            .field("watch_data", &self.watch_data)
            .field("on_add", &self.on_add.is_some())
            .field("on_del", &self.on_del.is_some())
            .field("need_watch", &self.need_watch.is_some())
            .field("cont_watch", &self.cont_watch.is_some())
            .finish()
    }
}

/// Mirror activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    /// Local files written.
    pub files_written: u64,
    /// Local entries removed.
    pub files_removed: u64,
    /// Data and children watches armed.
    pub watches_armed: u64,
}

#[derive(Default)]
struct MirrorState {
    processed: HashSet<String>,
    children_watched: HashSet<String>,
    watches: WatchTable,
}

struct MirrorInner {
    store: Arc<dyn CoordinationStore>,
    local: LocalTree,
    config: MirrorConfig,
    fatal: Arc<dyn FatalHandler>,
    state: Mutex<MirrorState>,
    stats: RwLock<MirrorStats>,
}

/// Keeps a local directory tree in step with a namespace subtree.
///
/// State (the processed set, the watch-set, armed children watches) lives in
/// this value and is rebuilt from the store after a restart. Cloning is cheap
/// and clones share state.
///
/// Store callbacks hold only a weak reference; once every `TreeMirror` handle
/// is dropped, pending fires become no-ops.
///
/// # Errors in callbacks
///
/// A node disappearing between listing and reading is treated as a delete.
/// Any other error raised while handling a watch fire goes to the
/// [`FatalHandler`], which aborts the process by default.
#[derive(Clone)]
pub struct TreeMirror {
    inner: Arc<MirrorInner>,
}

impl TreeMirror {
    /// Creates a mirror writing under `config.root`.
    pub fn new(store: Arc<dyn CoordinationStore>, config: MirrorConfig) -> Self {
        Self::with_fatal_handler(store, config, Arc::new(AbortOnFatal))
    }

    /// Creates a mirror with a custom fatal handler.
    pub fn with_fatal_handler(
        store: Arc<dyn CoordinationStore>,
        config: MirrorConfig,
        fatal: Arc<dyn FatalHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(MirrorInner {
                store,
                local: LocalTree::new(config.root.clone()),
                config,
                fatal,
                state: Mutex::new(MirrorState::default()),
                stats: RwLock::new(MirrorStats::default()),
            }),
        }
    }

    /// Local mirror root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.inner.local.root()
    }

    /// Local path of a namespace path.
    #[must_use]
    pub fn local_path(&self, ns_path: &str) -> std::path::PathBuf {
        self.inner.local.path_for(ns_path)
    }

    /// The store this mirror reads from.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.inner.store
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> MirrorStats {
        *self.inner.stats.read()
    }

    /// Watch state of a data path, `None` if it is not in the watch-set.
    #[must_use]
    pub fn watch_state(&self, ns_path: &str) -> Option<WatchState> {
        self.inner.state.lock().watches.state(ns_path)
    }

    /// Mirrors the children of `ns_path` and keeps watching them.
    ///
    /// The local entry set equals the remote child set when this returns.
    /// Calling it again without a remote change writes nothing.
    pub fn sync_children(&self, ns_path: &str, options: SyncOptions) -> CoreResult<()> {
        self.sync_children_pass(ns_path, &options, true)
    }

    /// Mirrors the data of `ns_path`.
    ///
    /// Paths in the watch-set get a data watch; others are copied once.
    pub fn sync_data(&self, ns_path: &str) -> CoreResult<()> {
        let live = self.inner.state.lock().watches.is_live(ns_path);
        if live {
            return self.reconcile(ns_path);
        }
        match self.inner.store.get(ns_path) {
            Ok((data, stat)) => self.write_local(ns_path, &data, stat.mtime),
            Err(StoreError::NoNode { .. }) => {
                tracing::debug!(path = ns_path, "node vanished before read");
                self.remove_local(ns_path)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drives the data watch state machine for `ns_path` one step.
    ///
    /// Arms a watch if none is armed and applies the node's current data.
    /// A missing node closes the path and removes the local file.
    pub fn reconcile(&self, ns_path: &str) -> CoreResult<()> {
        if !self.inner.state.lock().watches.begin_arm(ns_path) {
            return Ok(());
        }

        let watcher = self.data_watcher(ns_path);
        match self.inner.store.get_watch(ns_path, watcher) {
            Ok((data, stat)) => {
                self.inner.stats.write().watches_armed += 1;
                self.write_local(ns_path, &data, stat.mtime)
            }
            Err(StoreError::NoNode { .. }) => {
                tracing::debug!(path = ns_path, "watched node is gone");
                self.inner.state.lock().watches.close(ns_path);
                self.remove_local(ns_path)
            }
            Err(e) => {
                self.inner.state.lock().watches.arm_failed(ns_path);
                Err(e.into())
            }
        }
    }

    /// Reconciles every path whose watch fired without being re-armed and
    /// drops closed paths. Returns how many paths were reconciled.
    pub fn tick(&self) -> CoreResult<usize> {
        let fired = {
            let mut state = self.inner.state.lock();
            let pruned = state.watches.prune_closed();
            if pruned > 0 {
                tracing::debug!(pruned, "dropped closed watch entries");
            }
            state.watches.fired()
        };
        for ns_path in &fired {
            self.reconcile(ns_path)?;
        }
        Ok(fired.len())
    }

    /// Mirrors a directory of directories of data nodes, with a children
    /// watch on every directory and a data watch on every leaf.
    pub fn mirror_tree(&self, ns_path: &str) -> CoreResult<()> {
        let leaves = SyncOptions::new().watch_data(true);
        let dirs = SyncOptions::new().on_add(move |mirror, child| mirror.sync_children(child, leaves.clone()));
        self.sync_children(ns_path, dirs)
    }

    /// Writes the done sentinel for `ns_path`; later syncs of it are no-ops.
    pub fn mark_done(&self, ns_path: &str) -> CoreResult<()> {
        self.inner.local.create_marker(ns_path, &self.inner.config.done_marker)?;
        tracing::debug!(path = ns_path, "subtree marked done");
        Ok(())
    }

    /// Returns true if `ns_path` carries the done sentinel.
    #[must_use]
    pub fn is_done(&self, ns_path: &str) -> bool {
        self.inner.local.has_marker(ns_path, &self.inner.config.done_marker)
    }

    /// Removes the local entry for `ns_path` and drops it from the watch-set.
    pub fn remove_local(&self, ns_path: &str) -> CoreResult<()> {
        {
            let mut state = self.inner.state.lock();
            state.watches.close(ns_path);
            state.processed.retain(|p| !is_same_or_under(p, ns_path));
        }
        if self.inner.local.remove(ns_path)? {
            self.inner.stats.write().files_removed += 1;
            self.touch_modified()?;
        }
        Ok(())
    }

    fn write_local(&self, ns_path: &str, data: &[u8], mtime_ms: i64) -> CoreResult<()> {
        if self.inner.local.write(ns_path, data, mtime_ms)? {
            self.inner.stats.write().files_written += 1;
            self.touch_modified()?;
        }
        Ok(())
    }

    fn touch_modified(&self) -> CoreResult<()> {
        self.inner.local.touch(&self.inner.config.modified_marker)?;
        Ok(())
    }

    fn sync_children_pass(&self, ns_path: &str, options: &SyncOptions, first: bool) -> CoreResult<()> {
        if self.is_done(ns_path) {
            tracing::trace!(path = ns_path, "subtree is done, skipping");
            return Ok(());
        }
        self.inner.local.ensure_dir(ns_path)?;

        let predicate = if first { &options.need_watch } else { &options.cont_watch };
        let (remote, keep_watching) = match self.list_remote(ns_path, options, predicate.as_ref()) {
            Ok(listing) => listing,
            Err(StoreError::NoNode { .. }) => {
                tracing::debug!(path = ns_path, "directory node is gone");
                (Vec::new(), true)
            }
            Err(e) => return Err(e.into()),
        };

        let local = self.inner.local.list(ns_path)?;
        let diff = diff_sorted(local, remote);
        let first_pass = !self.inner.state.lock().processed.contains(ns_path);

        for name in &diff.remove {
            let child = path::join(ns_path, name);
            match &options.on_del {
                Some(on_del) => on_del(self, &child)?,
                None => self.remove_local(&child)?,
            }
        }

        let commons = if first_pass { diff.common.as_slice() } else { &[] };
        for name in diff.add.iter().chain(commons) {
            let child = path::join(ns_path, name);
            if options.watch_data {
                self.inner.state.lock().watches.register(&child);
            }
            match &options.on_add {
                Some(on_add) => on_add(self, &child)?,
                None => self.sync_data(&child)?,
            }
        }

        self.inner.state.lock().processed.insert(ns_path.to_string());
        tracing::debug!(
            path = ns_path,
            added = diff.add.len(),
            removed = diff.remove.len(),
            first_pass,
            "children synced"
        );

        if !keep_watching && first {
            self.mark_done(ns_path)?;
        }
        Ok(())
    }

    /// Lists the remote children, arming a children watch unless one is
    /// already armed or the predicate says the directory is settled.
    fn list_remote(
        &self,
        ns_path: &str,
        options: &SyncOptions,
        predicate: Option<&WatchPredicate>,
    ) -> Result<(Vec<String>, bool), StoreError> {
        if let Some(predicate) = predicate {
            let children = self.inner.store.children(ns_path)?;
            if !predicate(ns_path, &children) {
                tracing::debug!(path = ns_path, "watch not needed");
                return Ok((children, false));
            }
        }

        let newly_armed = self.inner.state.lock().children_watched.insert(ns_path.to_string());
        if !newly_armed {
            return Ok((self.inner.store.children(ns_path)?, true));
        }

        let watcher = self.children_watcher(ns_path, options.clone());
        match self.inner.store.children_watch(ns_path, watcher) {
            Ok(children) => {
                self.inner.stats.write().watches_armed += 1;
                Ok((children, true))
            }
            Err(e) => {
                self.inner.state.lock().children_watched.remove(ns_path);
                Err(e)
            }
        }
    }

    fn data_watcher(&self, ns_path: &str) -> Watcher {
        let weak = Arc::downgrade(&self.inner);
        let ns_path = ns_path.to_string();
        Watcher::new(move |event| {
            if let Some(mirror) = upgrade(&weak) {
                mirror.on_data_event(&ns_path, &event);
            }
        })
    }

    fn children_watcher(&self, ns_path: &str, options: SyncOptions) -> Watcher {
        let weak = Arc::downgrade(&self.inner);
        let ns_path = ns_path.to_string();
        Watcher::new(move |event| {
            if let Some(mirror) = upgrade(&weak) {
                mirror.on_children_event(&ns_path, &options, &event);
            }
        })
    }

    fn on_data_event(&self, ns_path: &str, event: &WatchEvent) {
        if event.kind == WatchEventKind::SessionExpired {
            self.escalate(ns_path, CoreError::Store(StoreError::SessionExpired));
            return;
        }
        if !self.inner.state.lock().watches.fire(ns_path) {
            tracing::trace!(path = ns_path, "stale data watch");
            return;
        }
        let result = if event.kind == WatchEventKind::Deleted {
            self.remove_local(ns_path)
        } else {
            self.reconcile(ns_path)
        };
        if let Err(e) = result {
            self.escalate(ns_path, e);
        }
    }

    fn on_children_event(&self, ns_path: &str, options: &SyncOptions, event: &WatchEvent) {
        self.inner.state.lock().children_watched.remove(ns_path);
        match event.kind {
            WatchEventKind::SessionExpired => {
                self.escalate(ns_path, CoreError::Store(StoreError::SessionExpired));
            }
            WatchEventKind::Deleted => {
                tracing::debug!(path = ns_path, "watched directory deleted");
            }
            _ => {
                if let Err(e) = self.sync_children_pass(ns_path, options, false) {
                    self.escalate(ns_path, e);
                }
            }
        }
    }

    fn escalate(&self, ns_path: &str, error: CoreError) {
        if error.is_no_node() {
            tracing::debug!(path = ns_path, "node vanished during watch handling");
            return;
        }
        self.inner.fatal.fatal(&format!("mirror {ns_path}"), &error);
    }
}

impl std::fmt::Debug for TreeMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeMirror")
            .field("root", &self.inner.local.root())
            .field("stats", &self.stats())
            .finish()
    }
}

fn upgrade(weak: &Weak<MirrorInner>) -> Option<TreeMirror> {
    weak.upgrade().map(|inner| TreeMirror { inner })
}

fn is_same_or_under(candidate: &str, ns_path: &str) -> bool {
    candidate == ns_path
        || candidate
            .strip_prefix(ns_path)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fatal::RecordingFatal;
    use nsmirror_store::{CreateMode, InMemoryStore, WatchDelivery};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        store: Arc<InMemoryStore>,
        mirror: TreeMirror,
        fatal: Arc<RecordingFatal>,
        _dir: TempDir,
    }

    fn fixture(delivery: WatchDelivery) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::with_delivery(delivery));
        let fatal = Arc::new(RecordingFatal::new());
        let mirror = TreeMirror::with_fatal_handler(
            store.clone(),
            MirrorConfig::new(dir.path().join("mirror")),
            fatal.clone(),
        );
        Fixture {
            store,
            mirror,
            fatal,
            _dir: dir,
        }
    }

    fn local_names(mirror: &TreeMirror, ns_path: &str) -> Vec<String> {
        LocalTree::new(mirror.root()).list(ns_path).unwrap()
    }

    #[test]
    fn watched_data_follows_updates_and_delete() {
        let f = fixture(WatchDelivery::Inline);
        f.store.ensure_path("/apps", &[]).unwrap();
        f.store.create("/apps/a", b"v1", CreateMode::Persistent, &[]).unwrap();

        f.mirror.sync_children("/apps", SyncOptions::new().watch_data(true)).unwrap();
        let file = f.mirror.local_path("/apps/a");
        assert_eq!(fs::read(&file).unwrap(), b"v1");
        assert_eq!(f.mirror.watch_state("/apps/a"), Some(WatchState::Watching));

        f.store.set("/apps/a", b"v2", None).unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"v2");

        f.store.delete("/apps/a", None).unwrap();
        assert!(!file.exists());
        assert_eq!(f.mirror.watch_state("/apps/a"), Some(WatchState::Closed));
        assert_eq!(f.fatal.count(), 0);
    }

    #[test]
    fn file_mtime_follows_node_mtime() {
        let f = fixture(WatchDelivery::Inline);
        f.store.set_time_ms(1_700_000_000_000);
        f.store.ensure_path("/d", &[]).unwrap();
        f.store.create("/d/x", b"1", CreateMode::Persistent, &[]).unwrap();

        f.mirror.sync_children("/d", SyncOptions::new()).unwrap();
        let modified = fs::metadata(f.mirror.local_path("/d/x")).unwrap().modified().unwrap();
        assert_eq!(modified, super::super::local::system_time(1_700_000_000_000));
    }

    #[test]
    fn need_watch_false_marks_done() {
        let f = fixture(WatchDelivery::Inline);
        f.store.ensure_path("/shard/a", &[]).unwrap();

        let options = SyncOptions::new().need_watch(|_, children| !children.iter().any(|c| c == "a"));
        f.mirror.sync_children("/shard", options.clone()).unwrap();
        assert!(f.mirror.is_done("/shard"));
        assert_eq!(local_names(&f.mirror, "/shard"), vec!["a"]);

        f.store.create("/shard/b", b"", CreateMode::Persistent, &[]).unwrap();
        f.mirror.sync_children("/shard", options).unwrap();
        assert_eq!(local_names(&f.mirror, "/shard"), vec!["a"]);
        assert_eq!(f.store.watch_count(), 0);
    }

    #[test]
    fn cont_watch_false_stops_rearming() {
        let f = fixture(WatchDelivery::Inline);
        f.store.ensure_path("/d", &[]).unwrap();
        let options = SyncOptions::new().cont_watch(|_, children| children.len() < 2);
        f.mirror.sync_children("/d", options).unwrap();

        f.store.create("/d/a", b"", CreateMode::Persistent, &[]).unwrap();
        assert_eq!(local_names(&f.mirror, "/d"), vec!["a"]);
        f.store.create("/d/b", b"", CreateMode::Persistent, &[]).unwrap();
        assert_eq!(local_names(&f.mirror, "/d"), vec!["a", "b"]);

        f.store.create("/d/c", b"", CreateMode::Persistent, &[]).unwrap();
        assert_eq!(local_names(&f.mirror, "/d"), vec!["a", "b"]);
    }

    #[test]
    fn failing_callback_is_fatal() {
        let f = fixture(WatchDelivery::Inline);
        f.store.ensure_path("/d", &[]).unwrap();
        let options = SyncOptions::new().on_add(|_, child| Err(CoreError::invalid_operation(format!("reject {child}"))));
        f.mirror.sync_children("/d", options).unwrap();

        f.store.create("/d/a", b"", CreateMode::Persistent, &[]).unwrap();
        assert_eq!(f.fatal.count(), 1);
        assert!(f.fatal.messages()[0].contains("reject /d/a"));
    }

    #[test]
    fn repeated_sync_arms_one_children_watch() {
        let f = fixture(WatchDelivery::Inline);
        f.store.ensure_path("/d", &[]).unwrap();
        f.mirror.sync_children("/d", SyncOptions::new()).unwrap();
        f.mirror.sync_children("/d", SyncOptions::new()).unwrap();
        assert_eq!(f.store.watch_count(), 1);
    }

    #[test]
    fn failed_rearm_leaves_path_fired() {
        let f = fixture(WatchDelivery::Deferred);
        f.store.ensure_path("/d", &[]).unwrap();
        f.store.create("/d/a", b"1", CreateMode::Persistent, &[]).unwrap();
        f.mirror.sync_children("/d", SyncOptions::new().watch_data(true)).unwrap();

        f.store.set("/d/a", b"2", None).unwrap();
        f.store.disconnect();
        f.store.deliver_watches();
        assert_eq!(f.fatal.count(), 1);
        assert_eq!(f.mirror.watch_state("/d/a"), Some(WatchState::Fired));
    }

    #[test]
    fn tick_prunes_closed_paths() {
        let f = fixture(WatchDelivery::Inline);
        f.store.ensure_path("/d", &[]).unwrap();
        f.store.create("/d/a", b"1", CreateMode::Persistent, &[]).unwrap();
        f.mirror.sync_children("/d", SyncOptions::new().watch_data(true)).unwrap();
        f.store.delete("/d/a", None).unwrap();

        assert_eq!(f.mirror.watch_state("/d/a"), Some(WatchState::Closed));
        assert_eq!(f.mirror.tick().unwrap(), 0);
        assert_eq!(f.mirror.watch_state("/d/a"), None);
    }

    #[test]
    fn mirror_tree_follows_two_levels() {
        let f = fixture(WatchDelivery::Inline);
        f.store.ensure_path("/placement/h1", &[]).unwrap();
        f.store.create("/placement/h1/app#1", b"x", CreateMode::Persistent, &[]).unwrap();

        f.mirror.mirror_tree("/placement").unwrap();
        assert_eq!(fs::read(f.mirror.local_path("/placement/h1/app#1")).unwrap(), b"x");

        f.store.ensure_path("/placement/h2", &[]).unwrap();
        f.store.create("/placement/h2/app#2", b"y", CreateMode::Persistent, &[]).unwrap();
        assert_eq!(fs::read(f.mirror.local_path("/placement/h2/app#2")).unwrap(), b"y");

        f.store.delete("/placement/h1/app#1", None).unwrap();
        f.store.delete("/placement/h1", None).unwrap();
        assert!(!f.mirror.local_path("/placement/h1").exists());
        assert_eq!(f.fatal.count(), 0);
    }

    #[test]
    fn modified_marker_tracks_changes() {
        let f = fixture(WatchDelivery::Inline);
        f.store.ensure_path("/d", &[]).unwrap();
        f.mirror.sync_children("/d", SyncOptions::new()).unwrap();
        let marker = f.mirror.root().join(".modified");
        assert!(!marker.exists());

        f.store.create("/d/a", b"", CreateMode::Persistent, &[]).unwrap();
        assert!(marker.exists());
    }
}
