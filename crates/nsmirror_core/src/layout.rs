//! Namespace layout.
//!
//! ```text
//! /scheduled/<entity>                       active instances
//! /placement/<host>/<entity>                current placement
//! /finished/<entity>                        terminal summary (JSON)
//! /trace/<shard>/<entity>,<ts>,...          instance events
//! /server.presence/<server>                 active servers
//! /server-trace/<shard>/<server>,<ts>,...   server events
//! /trace.history/trace.db.zst-<seq>         snapshots
//! /finished.history/finished.db.zst-<seq>
//! /server-trace.history/server.trace.db.zst-<seq>
//! ```

use nsmirror_codec::EventRecord;
use nsmirror_store::path;
use sha2::{Digest, Sha256};

/// Which event stream a trace operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceKind {
    /// Workload instance events.
    Instance,
    /// Server events.
    Server,
}

/// Paths of every namespace directory the core reads or writes.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Active instance markers.
    pub scheduled: String,
    /// Placement directory, one child per host.
    pub placement: String,
    /// Terminal summaries.
    pub finished: String,
    /// Finished-node snapshots.
    pub finished_history: String,
    /// Instance trace shards.
    pub trace: String,
    /// Instance trace snapshots.
    pub trace_history: String,
    /// Active server markers.
    pub server_presence: String,
    /// Server trace shards.
    pub server_trace: String,
    /// Server trace snapshots.
    pub server_trace_history: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            scheduled: "/scheduled".to_string(),
            placement: "/placement".to_string(),
            finished: "/finished".to_string(),
            finished_history: "/finished.history".to_string(),
            trace: "/trace".to_string(),
            trace_history: "/trace.history".to_string(),
            server_presence: "/server.presence".to_string(),
            server_trace: "/server-trace".to_string(),
            server_trace_history: "/server-trace.history".to_string(),
        }
    }
}

impl Layout {
    /// Creates the default layout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of an entity's scheduled marker.
    #[must_use]
    pub fn scheduled_path(&self, entity: &str) -> String {
        path::join(&self.scheduled, entity)
    }

    /// Path of an entity's placement under `host`.
    #[must_use]
    pub fn placement_path(&self, host: &str, entity: &str) -> String {
        path::join(&path::join(&self.placement, host), entity)
    }

    /// Path of an entity's finished summary.
    #[must_use]
    pub fn finished_path(&self, entity: &str) -> String {
        path::join(&self.finished, entity)
    }

    /// Root of the live event shards for `kind`.
    #[must_use]
    pub fn trace_root(&self, kind: TraceKind) -> &str {
        match kind {
            TraceKind::Instance => &self.trace,
            TraceKind::Server => &self.server_trace,
        }
    }

    /// Snapshot directory for `kind`.
    #[must_use]
    pub fn trace_history(&self, kind: TraceKind) -> &str {
        match kind {
            TraceKind::Instance => &self.trace_history,
            TraceKind::Server => &self.server_trace_history,
        }
    }

    /// Directory whose children form the active set for `kind`.
    #[must_use]
    pub fn active_root(&self, kind: TraceKind) -> &str {
        match kind {
            TraceKind::Instance => &self.scheduled,
            TraceKind::Server => &self.server_presence,
        }
    }

    /// Snapshot node name prefix for `kind`.
    #[must_use]
    pub fn trace_snapshot_prefix(kind: TraceKind) -> &'static str {
        match kind {
            TraceKind::Instance => "trace.db.zst-",
            TraceKind::Server => "server.trace.db.zst-",
        }
    }

    /// Snapshot node name prefix for finished nodes.
    #[must_use]
    pub fn finished_snapshot_prefix() -> &'static str {
        "finished.db.zst-"
    }

    /// Shard directory holding `entity`'s events.
    #[must_use]
    pub fn trace_shard_path(&self, kind: TraceKind, entity: &str) -> String {
        path::join(self.trace_root(kind), &shard_of(entity))
    }

    /// Full path of an event node.
    #[must_use]
    pub fn event_path(&self, kind: TraceKind, record: &EventRecord) -> String {
        path::join(&self.trace_shard_path(kind, &record.entity), &record.node_name())
    }
}

/// Returns the shard an entity's events live in.
///
/// Instances (`name#NNNNNNNNNN`) shard by the last four characters of the
/// instance number; anything else by the first two bytes of its SHA-256.
///
/// ```rust
/// use nsmirror_core::shard_of;
///
/// assert_eq!(shard_of("proid.app#0000000123"), "0123");
/// assert_eq!(shard_of("app#7"), "0007");
/// ```
#[must_use]
pub fn shard_of(entity: &str) -> String {
    match entity.rsplit_once('#') {
        Some((_, instance)) if !instance.is_empty() => {
            let start = instance.len().saturating_sub(4);
            let tail = instance.get(start..).unwrap_or(instance);
            format!("{tail:0>4}")
        }
        _ => {
            let digest = Sha256::digest(entity.as_bytes());
            hex::encode_upper(&digest[..2])
        }
    }
}
