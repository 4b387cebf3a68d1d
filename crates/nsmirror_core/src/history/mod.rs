//! Compaction of aged namespace entries into snapshots, and queries over
//! live entries plus snapshots.

mod compactor;
mod reader;

pub use compactor::{CompactionReport, CompactionTarget, HistoryCompactor};
pub use reader::{EntityState, EntityStatus, HistoryReader};

use crate::error::CoreResult;
use nsmirror_codec::{CodecError, SnapshotCodec, SnapshotDb};
use nsmirror_store::{path, CoordinationStore, StoreError, StoreExt};

/// Snapshot node names under `dir` with `prefix`, oldest first.
pub(crate) fn snapshot_names(store: &dyn CoordinationStore, dir: &str, prefix: &str) -> CoreResult<Vec<String>> {
    let mut names: Vec<String> = store
        .children_or_empty(dir)?
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .collect();
    names.sort();
    Ok(names)
}

/// Fetches and opens one snapshot.
///
/// Returns `None` for a snapshot pruned since it was listed and for a corrupt
/// blob, which is logged.
pub(crate) fn open_snapshot(
    store: &dyn CoordinationStore,
    codec: &SnapshotCodec,
    dir: &str,
    name: &str,
) -> CoreResult<Option<SnapshotDb>> {
    let node = path::join(dir, name);
    let blob = match store.get(&node) {
        Ok((blob, _)) => blob,
        Err(StoreError::NoNode { .. }) => {
            tracing::debug!(snapshot = %node, "snapshot pruned before read");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    match codec.open(&blob) {
        Ok(db) => Ok(Some(db)),
        Err(e @ (CodecError::CorruptSnapshot { .. } | CodecError::Sqlite(_))) => {
            tracing::warn!(snapshot = %node, error = %e, "skipping unreadable snapshot");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
