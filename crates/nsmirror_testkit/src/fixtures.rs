//! Test fixtures.
//!
//! A [`TestNamespace`] bundles an in-memory store, a temporary mirror
//! directory and a recording fatal handler.

use nsmirror_core::{
    CompactionConfig, ContentCache, HistoryCompactor, HistoryReader, Layout, MirrorConfig, RecordingFatal,
    TraceConfig, TracePublisher, TreeMirror,
};
use nsmirror_store::{CoordinationStore, CreateMode, InMemoryStore, WatchDelivery};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A namespace and a scratch directory with automatic cleanup.
pub struct TestNamespace {
    /// The store.
    pub store: Arc<InMemoryStore>,
    /// Namespace layout used by every component built here.
    pub layout: Layout,
    /// Fatal errors raised by mirrors built here.
    pub fatal: Arc<RecordingFatal>,
    _temp_dir: TempDir,
}

impl TestNamespace {
    /// Creates a namespace with inline watch delivery.
    pub fn new() -> Self {
        Self::with_delivery(WatchDelivery::Inline)
    }

    /// Creates a namespace whose watches fire only on
    /// [`InMemoryStore::deliver_watches`].
    pub fn deferred() -> Self {
        Self::with_delivery(WatchDelivery::Deferred)
    }

    fn with_delivery(delivery: WatchDelivery) -> Self {
        Self {
            store: Arc::new(InMemoryStore::with_delivery(delivery)),
            layout: Layout::default(),
            fatal: Arc::new(RecordingFatal::new()),
            _temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Scratch directory for this namespace.
    pub fn scratch(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }

    /// Root of mirrors built by [`mirror`](Self::mirror).
    pub fn mirror_root(&self) -> PathBuf {
        self._temp_dir.path().join("mirror")
    }

    /// A mirror into [`mirror_root`](Self::mirror_root) reporting to [`fatal`](Self::fatal).
    pub fn mirror(&self) -> TreeMirror {
        TreeMirror::with_fatal_handler(
            self.store.clone(),
            MirrorConfig::new(self.mirror_root()),
            self.fatal.clone(),
        )
    }

    /// A publisher with `source` as its host.
    pub fn publisher(&self, source: &str) -> TracePublisher {
        TracePublisher::new(self.store.clone(), self.layout.clone(), TraceConfig::new(source))
    }

    /// A compactor.
    pub fn compactor(&self, config: CompactionConfig) -> HistoryCompactor {
        HistoryCompactor::new(self.store.clone(), self.layout.clone(), config)
    }

    /// A history reader.
    pub fn reader(&self) -> HistoryReader {
        HistoryReader::new(self.store.clone(), self.layout.clone())
    }

    /// A content cache between `remote_dir` and a scratch subdirectory.
    pub fn cache(&self, remote_dir: &str) -> ContentCache {
        ContentCache::new(self.store.clone(), remote_dir, self._temp_dir.path().join("cache"))
    }

    /// Creates a persistent node and its parents.
    pub fn add_node(&self, path: &str, data: &[u8]) {
        if let Some(parent) = nsmirror_store::path::parent(path) {
            if parent != "/" {
                self.store.ensure_path(parent, &[]).expect("Failed to create parent");
            }
        }
        self.store
            .create(path, data, CreateMode::Persistent, &[])
            .expect("Failed to create node");
    }

    /// Sorted local entry names under a mirrored namespace path, dotfiles excluded.
    pub fn local_children(&self, ns_path: &str) -> Vec<String> {
        let dir = local_path(&self.mirror_root(), ns_path);
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.expect("Failed to read entry").file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names
    }

    /// Contents of a mirrored file, `None` if it does not exist.
    pub fn local_data(&self, ns_path: &str) -> Option<Vec<u8>> {
        fs::read(local_path(&self.mirror_root(), ns_path)).ok()
    }
}

impl Default for TestNamespace {
    fn default() -> Self {
        Self::new()
    }
}

fn local_path(root: &std::path::Path, ns_path: &str) -> PathBuf {
    root.join(ns_path.trim_start_matches('/'))
}

/// Runs a test with a fresh namespace.
///
/// # Example
///
/// ```rust
/// use nsmirror_store::CoordinationStore;
/// use nsmirror_testkit::with_namespace;
///
/// with_namespace(|ns| {
///     ns.add_node("/a/b", b"x");
///     assert_eq!(ns.store.children("/a").unwrap(), vec!["b".to_string()]);
/// });
/// ```
pub fn with_namespace<F, R>(f: F) -> R
where
    F: FnOnce(&TestNamespace) -> R,
{
    let ns = TestNamespace::new();
    f(&ns)
}
