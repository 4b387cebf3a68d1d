//! Local side of the mirror: files under the mirror root.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Filesystem operations on the mirror directory.
#[derive(Debug, Clone)]
pub(crate) struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of a namespace path.
    pub fn path_for(&self, ns_path: &str) -> PathBuf {
        let relative = ns_path.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    pub fn ensure_dir(&self, ns_path: &str) -> io::Result<PathBuf> {
        let dir = self.path_for(ns_path);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Entry names in `ns_path`, excluding dotfiles. A missing directory is empty.
    pub fn list(&self, ns_path: &str) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(self.path_for(ns_path)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut names = Vec::new();
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Writes `data` with mtime `mtime_ms`. Returns false if the file already
    /// had that content and mtime.
    pub fn write(&self, ns_path: &str, data: &[u8], mtime_ms: i64) -> io::Result<bool> {
        let target = self.path_for(ns_path);
        let mtime = system_time(mtime_ms);
        if is_current(&target, data, mtime) {
            return Ok(false);
        }
        write_atomic(&target, data, Some(mtime))?;
        Ok(true)
    }

    /// Removes the entry for `ns_path`. Returns false if it did not exist.
    pub fn remove(&self, ns_path: &str) -> io::Result<bool> {
        remove_entry(&self.path_for(ns_path))
    }

    pub fn has_marker(&self, ns_path: &str, marker: &str) -> bool {
        self.path_for(ns_path).join(marker).exists()
    }

    pub fn create_marker(&self, ns_path: &str, marker: &str) -> io::Result<()> {
        let dir = self.ensure_dir(ns_path)?;
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(marker))?;
        Ok(())
    }

    /// Creates `marker` at the root if missing and bumps its mtime.
    pub fn touch(&self, marker: &str) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root.join(marker))?;
        file.set_modified(SystemTime::now())
    }
}

/// Writes `data` to a temporary file next to `target` and renames it over
/// `target`, optionally stamping `mtime` first.
pub(crate) fn write_atomic(target: &Path, data: &[u8], mtime: Option<SystemTime>) -> io::Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory"))?;
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new().prefix(".tmp").tempfile_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    if let Some(mtime) = mtime {
        temp.as_file().set_modified(mtime)?;
    }
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Removes a file or directory tree. Returns false if it did not exist.
pub(crate) fn remove_entry(target: &Path) -> io::Result<bool> {
    let result = match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target),
        Ok(_) => fs::remove_file(target),
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

pub(crate) fn system_time(ms: i64) -> SystemTime {
    let ms = u64::try_from(ms).unwrap_or(0);
    UNIX_EPOCH + Duration::from_millis(ms)
}

fn is_current(target: &Path, data: &[u8], mtime: SystemTime) -> bool {
    let Ok(meta) = fs::metadata(target) else {
        return false;
    };
    if !meta.is_file() || meta.len() != data.len() as u64 {
        return false;
    }
    if meta.modified().ok() != Some(mtime) {
        return false;
    }
    fs::read(target).map(|existing| existing == data).unwrap_or(false)
}
