use super::snapshot_names;
use crate::config::CompactionConfig;
use crate::error::CoreResult;
use crate::layout::{Layout, TraceKind};
use nsmirror_codec::{EventRecord, SnapshotCodec, SnapshotRow};
use nsmirror_store::{path, CoordinationStore, CreateMode, StoreError, StoreExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// What a compaction pass retires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionTarget {
    /// Instance or server event nodes.
    Trace(TraceKind),
    /// `/finished/<entity>` summaries.
    Finished,
}

/// Outcome of one compaction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Nodes eligible for compaction.
    pub candidates: usize,
    /// Snapshots created.
    pub batches_uploaded: usize,
    /// Batches abandoned because their snapshot could not be written.
    pub batches_failed: usize,
    /// Source nodes deleted after their snapshot was written.
    pub nodes_deleted: usize,
    /// Eligible nodes left live because they did not fill a batch.
    pub remainder: usize,
    /// Old snapshots removed by retention.
    pub snapshots_pruned: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    directory: String,
    name: String,
    timestamp: f64,
}

impl Candidate {
    fn path(&self) -> String {
        path::join(&self.directory, &self.name)
    }
}

/// Moves aged entries of inactive entities into snapshot nodes.
///
/// One pass:
///
/// 1. reads the active set once,
/// 2. selects entries of inactive entities older than `now - expiry`,
/// 3. sorts them oldest first,
/// 4. writes each full batch as one sequential snapshot node, then deletes
///    the batch's source nodes,
/// 5. prunes snapshots beyond the retention count, oldest first.
///
/// A partial final batch stays live until later entries fill it. A batch
/// whose snapshot cannot be written is abandoned with its sources untouched.
/// A crash between writing a snapshot and deleting its sources leaves those
/// entries to be compacted again; readers de-duplicate by the full tuple.
///
/// Only one compactor may run against a namespace at a time.
pub struct HistoryCompactor {
    store: Arc<dyn CoordinationStore>,
    layout: Layout,
    config: CompactionConfig,
    codec: SnapshotCodec,
}

impl HistoryCompactor {
    /// Creates a compactor.
    pub fn new(store: Arc<dyn CoordinationStore>, layout: Layout, config: CompactionConfig) -> Self {
        let codec = SnapshotCodec::new(config.compression_level);
        Self {
            store,
            layout,
            config,
            codec,
        }
    }

    /// Compacts every target using the current time.
    pub fn run(&self) -> CoreResult<Vec<(CompactionTarget, CompactionReport)>> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        [
            CompactionTarget::Trace(TraceKind::Instance),
            CompactionTarget::Trace(TraceKind::Server),
            CompactionTarget::Finished,
        ]
        .into_iter()
        .map(|target| Ok((target, self.compact(target, now)?)))
        .collect()
    }

    /// Runs one pass over `target` as of `now` (seconds since the epoch).
    pub fn compact(&self, target: CompactionTarget, now: f64) -> CoreResult<CompactionReport> {
        match target {
            CompactionTarget::Trace(kind) => self.compact_trace(kind, now),
            CompactionTarget::Finished => self.compact_finished(now),
        }
    }

    /// Compacts event nodes of `kind`.
    pub fn compact_trace(&self, kind: TraceKind, now: f64) -> CoreResult<CompactionReport> {
        let active = self.active_set(self.layout.active_root(kind))?;
        let cutoff = now - self.config.expiry.as_secs_f64();
        let root = self.layout.trace_root(kind);

        let mut candidates = Vec::new();
        for shard in self.store.children_or_empty(root)? {
            let directory = path::join(root, &shard);
            for name in self.store.children_or_empty(&directory)? {
                let record = match EventRecord::parse(&name) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(node = %name, error = %e, "skipping malformed event node");
                        continue;
                    }
                };
                if active.contains(&record.entity) || record.timestamp >= cutoff {
                    continue;
                }
                candidates.push(Candidate {
                    directory: directory.clone(),
                    name,
                    timestamp: record.timestamp,
                });
            }
        }

        self.compact_candidates(
            candidates,
            self.layout.trace_history(kind),
            Layout::trace_snapshot_prefix(kind),
        )
    }

    /// Compacts finished summaries; their age is the node's modification time.
    pub fn compact_finished(&self, now: f64) -> CoreResult<CompactionReport> {
        let active = self.active_set(&self.layout.scheduled)?;
        let cutoff = now - self.config.expiry.as_secs_f64();
        let root = &self.layout.finished;

        let mut candidates = Vec::new();
        for name in self.store.children_or_empty(root)? {
            if active.contains(&name) {
                continue;
            }
            let node = path::join(root, &name);
            let Some(stat) = self.store.exists(&node)? else {
                continue;
            };
            let timestamp = stat.mtime as f64 / 1000.0;
            if timestamp < cutoff {
                candidates.push(Candidate {
                    directory: root.clone(),
                    name,
                    timestamp,
                });
            }
        }

        self.compact_candidates(
            candidates,
            &self.layout.finished_history,
            Layout::finished_snapshot_prefix(),
        )
    }

    /// Deletes the oldest snapshots under `dir` beyond the retention count.
    pub fn prune_snapshots(&self, dir: &str, prefix: &str) -> CoreResult<usize> {
        let names = snapshot_names(self.store.as_ref(), dir, prefix)?;
        let excess = names.len().saturating_sub(self.config.max_snapshots);
        let mut pruned = 0;
        for name in names.iter().take(excess) {
            if self.store.ensure_deleted(&path::join(dir, name))? {
                pruned += 1;
            }
        }
        if pruned > 0 {
            tracing::info!(dir, pruned, "pruned old snapshots");
        }
        Ok(pruned)
    }

    fn active_set(&self, root: &str) -> CoreResult<HashSet<String>> {
        Ok(self.store.children_or_empty(root)?.into_iter().collect())
    }

    fn compact_candidates(
        &self,
        mut candidates: Vec<Candidate>,
        history_dir: &str,
        prefix: &str,
    ) -> CoreResult<CompactionReport> {
        candidates.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp).then_with(|| a.name.cmp(&b.name)));

        let batch_size = self.config.batch_size.max(1);
        let mut report = CompactionReport {
            candidates: candidates.len(),
            remainder: candidates.len() % batch_size,
            ..CompactionReport::default()
        };

        for batch in candidates.chunks_exact(batch_size) {
            match self.upload_batch(batch, history_dir, prefix) {
                Ok(snapshot) => {
                    report.batches_uploaded += 1;
                    tracing::info!(snapshot = %snapshot, entries = batch.len(), "uploaded snapshot");
                }
                Err(e) => {
                    report.batches_failed += 1;
                    tracing::warn!(history = history_dir, error = %e, "snapshot upload failed, batch left live");
                    continue;
                }
            }
            for candidate in batch {
                if self.store.ensure_deleted(&candidate.path())? {
                    report.nodes_deleted += 1;
                }
            }
        }

        report.snapshots_pruned = self.prune_snapshots(history_dir, prefix)?;
        tracing::debug!(history = history_dir, ?report, "compaction pass complete");
        Ok(report)
    }

    fn upload_batch(&self, batch: &[Candidate], history_dir: &str, prefix: &str) -> CoreResult<String> {
        let mut rows = Vec::with_capacity(batch.len());
        for candidate in batch {
            let node = candidate.path();
            let data = match self.store.get(&node) {
                Ok((data, _)) => data,
                Err(StoreError::NoNode { .. }) => {
                    tracing::debug!(node = %node, "node deleted before compaction");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let data = row_data(&node, data);
            rows.push(SnapshotRow {
                path: node,
                timestamp: candidate.timestamp,
                data,
                directory: candidate.directory.clone(),
                name: candidate.name.clone(),
            });
        }

        let blob = self.codec.encode(&rows)?;
        self.store.ensure_path(history_dir, &[])?;
        let created = self.store.create(
            &path::join(history_dir, prefix),
            &blob,
            CreateMode::PersistentSequential,
            &[],
        )?;
        Ok(created)
    }
}

/// Snapshot text for a node's data. Non-UTF-8 bytes are replaced, with a warning.
fn row_data(node: &str, data: Vec<u8>) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    match String::from_utf8(data) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(
                node,
                valid_up_to = e.utf8_error().valid_up_to(),
                "node data is not UTF-8, snapshot keeps a lossy copy"
            );
            Some(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
    }
}

impl std::fmt::Debug for HistoryCompactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryCompactor")
            .field("config", &self.config)
            .finish()
    }
}
