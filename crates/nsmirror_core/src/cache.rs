//! Content-addressed push/pull cache.
//!
//! Versions of a named blob live remotely as sequential nodes
//! `{name}#{checksum}#{sequence}` and locally as files `{name}#{checksum}`.
//! Only the newest version on each side is authoritative; older versions are
//! removed whenever a newer one is pushed or pulled.

use crate::error::CoreResult;
use crate::mirror::write_atomic;
use nsmirror_codec::{LocalCacheName, RemoteCacheName};
use nsmirror_store::{path, CoordinationStore, CreateMode, StoreError, StoreExt};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Hex SHA-256 of `data`.
#[must_use]
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A cache of named blobs shared through the namespace.
pub struct ContentCache {
    store: Arc<dyn CoordinationStore>,
    remote_dir: String,
    local_dir: PathBuf,
}

impl ContentCache {
    /// Creates a cache syncing `remote_dir` with `local_dir`.
    pub fn new(store: Arc<dyn CoordinationStore>, remote_dir: impl Into<String>, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            remote_dir: remote_dir.into(),
            local_dir: local_dir.into(),
        }
    }

    /// Publishes `data` as the newest version of `name`.
    ///
    /// Returns false if the newest remote version already has this content.
    pub fn push(&self, name: &str, data: &[u8]) -> CoreResult<bool> {
        let sum = checksum(data);
        let versions = self.remote_versions(name)?;
        if versions.first().is_some_and(|newest| newest.checksum == sum) {
            tracing::debug!(name, checksum = %sum, "content unchanged, not pushing");
            return Ok(false);
        }

        self.store.ensure_path(&self.remote_dir, &[])?;
        let prefix = path::join(&self.remote_dir, &RemoteCacheName::create_prefix(name, &sum));
        let created = self.store.create(&prefix, data, CreateMode::PersistentSequential, &[])?;
        tracing::info!(node = %created, "pushed cache entry");

        for old in &versions {
            let node = path::join(&self.remote_dir, &remote_node_name(old));
            self.store.ensure_deleted(&node)?;
        }
        Ok(true)
    }

    /// Materializes the newest remote version of `name` locally.
    ///
    /// Returns the local file, or `None` if nothing is published under `name`.
    pub fn pull(&self, name: &str) -> CoreResult<Option<PathBuf>> {
        let Some(newest) = self.remote_versions(name)?.into_iter().next() else {
            return Ok(None);
        };
        let local = newest.local();
        let target = self.local_dir.join(local.file_name());

        if !target.exists() {
            let node = path::join(&self.remote_dir, &remote_node_name(&newest));
            let data = match self.store.get(&node) {
                Ok((data, _)) => data,
                Err(StoreError::NoNode { .. }) => {
                    tracing::debug!(node = %node, "cache entry replaced before pull");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };
            let actual = checksum(&data);
            if actual != newest.checksum {
                tracing::warn!(node = %node, actual = %actual, "cache entry checksum mismatch, skipping");
                return Ok(None);
            }
            write_atomic(&target, &data, None)?;
            tracing::debug!(file = %target.display(), "pulled cache entry");
        }

        for old in self.local_versions(name)? {
            if old.0 != local {
                remove_file(&self.local_dir.join(old.0.file_name()))?;
            }
        }
        Ok(Some(target))
    }

    /// Newest local version of `name`.
    pub fn get(&self, name: &str) -> CoreResult<Option<PathBuf>> {
        Ok(self
            .local_versions(name)?
            .into_iter()
            .next()
            .map(|(local, _)| self.local_dir.join(local.file_name())))
    }

    /// Remote versions of `name`, newest first.
    fn remote_versions(&self, name: &str) -> CoreResult<Vec<RemoteCacheName>> {
        let mut versions: Vec<RemoteCacheName> = self
            .store
            .children_or_empty(&self.remote_dir)?
            .iter()
            .filter_map(|node| match RemoteCacheName::parse(node) {
                Ok(remote) => Some(remote),
                Err(e) => {
                    tracing::warn!(node = %node, error = %e, "skipping malformed cache node");
                    None
                }
            })
            .filter(|remote| remote.name == name)
            .collect();
        versions.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(versions)
    }

    /// Local versions of `name`, newest first by creation time.
    fn local_versions(&self, name: &str) -> CoreResult<Vec<(LocalCacheName, SystemTime)>> {
        let entries = match fs::read_dir(&self.local_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }
            let Ok(local) = LocalCacheName::parse(&file_name) else {
                continue;
            };
            if local.name != name {
                continue;
            }
            let meta = entry.metadata()?;
            let created = meta.created().or_else(|_| meta.modified())?;
            versions.push((local, created));
        }
        versions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.checksum.cmp(&a.0.checksum)));
        Ok(versions)
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("remote_dir", &self.remote_dir)
            .field("local_dir", &self.local_dir)
            .finish()
    }
}

fn remote_node_name(remote: &RemoteCacheName) -> String {
    format!(
        "{}{:010}",
        RemoteCacheName::create_prefix(&remote.name, &remote.checksum),
        remote.sequence
    )
}

fn remove_file(target: &Path) -> io::Result<()> {
    match fs::remove_file(target) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsmirror_store::InMemoryStore;
    use tempfile::TempDir;

    fn cache(store: &Arc<InMemoryStore>, dir: &TempDir) -> ContentCache {
        ContentCache::new(store.clone(), "/cache", dir.path().join("cache"))
    }

    #[test]
    fn push_is_idempotent_per_content() {
        let store = Arc::new(InMemoryStore::new());
        let dir = TempDir::new().unwrap();
        let cache = cache(&store, &dir);

        assert!(cache.push("cfg", b"v1").unwrap());
        assert!(!cache.push("cfg", b"v1").unwrap());
        assert!(cache.push("cfg", b"v2").unwrap());

        let children = store.children("/cache").unwrap();
        assert_eq!(children, vec![format!("cfg#{}#0000000001", checksum(b"v2"))]);
    }

    #[test]
    fn pull_replaces_older_local_version() {
        let store = Arc::new(InMemoryStore::new());
        let dir = TempDir::new().unwrap();
        let cache = cache(&store, &dir);
        assert!(cache.pull("cfg").unwrap().is_none());

        cache.push("cfg", b"v1").unwrap();
        let first = cache.pull("cfg").unwrap().unwrap();
        assert_eq!(fs::read(&first).unwrap(), b"v1");

        cache.push("cfg", b"v2").unwrap();
        let second = cache.pull("cfg").unwrap().unwrap();
        assert_eq!(fs::read(&second).unwrap(), b"v2");
        assert!(!first.exists());
        assert_eq!(cache.get("cfg").unwrap(), Some(second));
    }

    #[test]
    fn names_with_separator_are_kept_apart() {
        let store = Arc::new(InMemoryStore::new());
        let dir = TempDir::new().unwrap();
        let cache = cache(&store, &dir);
        cache.push("app#1", b"a").unwrap();
        cache.push("app", b"b").unwrap();

        let pulled = cache.pull("app#1").unwrap().unwrap();
        assert_eq!(fs::read(pulled).unwrap(), b"a");
        assert!(cache.get("app").unwrap().is_none());
    }
}
