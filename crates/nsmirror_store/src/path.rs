//! Helpers for slash-separated node paths.

use crate::error::{StoreError, StoreResult};

/// Joins a parent path and a child name.
///
/// ```rust
/// use nsmirror_store::path;
///
/// assert_eq!(path::join("/", "a"), "/a");
/// assert_eq!(path::join("/a/b", "c"), "/a/b/c");
/// ```
#[must_use]
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Returns the parent of `path`, or `None` for the root.
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Returns the last segment of `path`.
#[must_use]
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Validates that `path` is absolute, has no empty segments and no trailing slash.
///
/// # Errors
///
/// Returns [`StoreError::InvalidPath`] if the path is malformed.
pub fn validate(path: &str) -> StoreResult<()> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') {
        return Err(StoreError::invalid_path(path));
    }
    if path[1..].split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return Err(StoreError::invalid_path(path));
    }
    Ok(())
}

/// Returns every ancestor of `path` from the top down, excluding the root and `path` itself.
#[must_use]
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = path;
    while let Some(p) = parent(current) {
        if p == "/" {
            break;
        }
        out.push(p);
        current = p;
    }
    out.reverse();
    out
}
