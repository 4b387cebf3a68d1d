//! Component configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Name of the marker file touched after every applied mirror change.
pub const DEFAULT_MODIFIED_MARKER: &str = ".modified";

/// Name of the sentinel that closes a mirrored subtree.
pub const DEFAULT_DONE_MARKER: &str = ".done";

/// Configuration for a [`crate::TreeMirror`].
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Local directory the namespace is projected into.
    pub root: PathBuf,

    /// Marker file at `root`, touched after each applied change.
    pub modified_marker: String,

    /// Sentinel file that short-circuits syncing of a closed subtree.
    pub done_marker: String,
}

impl MirrorConfig {
    /// Creates a configuration mirroring into `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            modified_marker: DEFAULT_MODIFIED_MARKER.to_string(),
            done_marker: DEFAULT_DONE_MARKER.to_string(),
        }
    }

    /// Sets the modification marker name.
    #[must_use]
    pub fn modified_marker(mut self, name: impl Into<String>) -> Self {
        self.modified_marker = name.into();
        self
    }

    /// Sets the done sentinel name.
    #[must_use]
    pub fn done_marker(mut self, name: impl Into<String>) -> Self {
        self.done_marker = name.into();
        self
    }
}

/// Configuration for publishing trace events.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Source recorded in every published event (usually the hostname).
    pub source: String,

    /// Event types that end an entity's lifecycle.
    pub terminal_types: Vec<String>,
}

impl TraceConfig {
    /// Creates a configuration publishing as `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            terminal_types: nsmirror_codec::TERMINAL_EVENT_TYPES
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }

    /// Replaces the terminal event types.
    #[must_use]
    pub fn terminal_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminal_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if `event_type` is terminal.
    #[must_use]
    pub fn is_terminal(&self, event_type: &str) -> bool {
        self.terminal_types.iter().any(|t| t == event_type)
    }
}

/// Configuration for history compaction.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Entries younger than this stay live.
    pub expiry: Duration,

    /// Number of entries per snapshot. Partial batches are not compacted.
    pub batch_size: usize,

    /// Maximum number of snapshots retained per history directory.
    pub max_snapshots: usize,

    /// zstd level for snapshot blobs.
    pub compression_level: i32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(60 * 60),
            batch_size: 5000,
            max_snapshots: 10,
            compression_level: nsmirror_codec::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl CompactionConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expiry age.
    #[must_use]
    pub const fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the retained snapshot count.
    #[must_use]
    pub const fn max_snapshots(mut self, count: usize) -> Self {
        self.max_snapshots = count;
        self
    }

    /// Sets the compression level.
    #[must_use]
    pub const fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_compaction_config() {
        let config = CompactionConfig::default();
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.max_snapshots, 10);
        assert_eq!(config.expiry, Duration::from_secs(3600));
    }

    #[test]
    fn builder_pattern() {
        let config = CompactionConfig::new()
            .expiry(Duration::from_secs(3))
            .batch_size(10)
            .max_snapshots(2);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_snapshots, 2);
        assert_eq!(config.expiry, Duration::from_secs(3));
    }

    #[test]
    fn trace_config_terminal_types() {
        let config = TraceConfig::new("host1");
        assert!(config.is_terminal("finished"));
        assert!(!config.is_terminal("pending"));

        let config = config.terminal_types(["done"]);
        assert!(config.is_terminal("done"));
        assert!(!config.is_terminal("finished"));
    }

    #[test]
    fn mirror_config_markers() {
        let config = MirrorConfig::new("/tmp/m").modified_marker(".changed");
        assert_eq!(config.modified_marker, ".changed");
        assert_eq!(config.done_marker, DEFAULT_DONE_MARKER);
    }
}
