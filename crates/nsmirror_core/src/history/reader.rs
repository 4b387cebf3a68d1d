use super::{open_snapshot, snapshot_names};
use crate::error::{CoreError, CoreResult};
use crate::layout::{Layout, TraceKind};
use crate::trace::FinishedSummary;
use nsmirror_codec::{entity_glob, entity_of, parse_sorted, EventRecord, SnapshotCodec};
use nsmirror_store::{path, CoordinationStore, StoreError, StoreExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Where an entity was found.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityState {
    /// A live scheduled marker exists.
    Scheduled,
    /// A live finished summary exists.
    Finished(FinishedSummary),
    /// Only snapshots mention the entity.
    Historical,
}

impl EntityState {
    fn rank(&self) -> u8 {
        match self {
            Self::Scheduled => 2,
            Self::Finished(_) => 1,
            Self::Historical => 0,
        }
    }
}

/// One result of [`HistoryReader::find`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStatus {
    /// Entity name.
    pub entity: String,
    /// Most live state found.
    pub state: EntityState,
}

/// Queries over live nodes and retained snapshots.
pub struct HistoryReader {
    store: Arc<dyn CoordinationStore>,
    layout: Layout,
    codec: SnapshotCodec,
}

impl HistoryReader {
    /// Creates a reader.
    pub fn new(store: Arc<dyn CoordinationStore>, layout: Layout) -> Self {
        Self {
            store,
            layout,
            codec: SnapshotCodec::default(),
        }
    }

    /// Every known event of `entity`, from snapshots and the live shard,
    /// de-duplicated and in replay order.
    pub fn entity_events(&self, kind: TraceKind, entity: &str) -> CoreResult<Vec<EventRecord>> {
        let mut events = BTreeSet::new();

        // Live shard before snapshots: an entry compacted in between is seen twice, never missed.
        let shard = self.layout.trace_shard_path(kind, entity);
        let live = self.store.children_or_empty(&shard)?;
        events.extend(parse_sorted(live.iter().map(String::as_str)));

        let dir = self.layout.trace_history(kind);
        let glob = entity_glob(entity);
        for name in snapshot_names(self.store.as_ref(), dir, Layout::trace_snapshot_prefix(kind))? {
            if let Some(db) = open_snapshot(self.store.as_ref(), &self.codec, dir, &name)? {
                let rows = db.rows_matching(&glob)?;
                events.extend(parse_sorted(rows.iter().map(|row| row.name.as_str())));
            }
        }

        Ok(events.into_iter().filter(|record| record.belongs_to(entity)).collect())
    }

    /// Entities whose name matches the shell glob `pattern`, from live
    /// scheduled and finished nodes and from every retained snapshot.
    ///
    /// Each entity appears once, with its most live state.
    pub fn find(&self, pattern: &str) -> CoreResult<Vec<EntityStatus>> {
        let matcher = glob::Pattern::new(pattern).map_err(|e| CoreError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let mut found: BTreeMap<String, EntityState> = BTreeMap::new();
        let mut record = |entity: &str, state: EntityState| match found.get(entity) {
            Some(existing) if existing.rank() >= state.rank() => {}
            _ => {
                found.insert(entity.to_string(), state);
            }
        };

        for entity in self.store.children_or_empty(&self.layout.scheduled)? {
            if matcher.matches(&entity) {
                record(&entity, EntityState::Scheduled);
            }
        }

        for entity in self.store.children_or_empty(&self.layout.finished)? {
            if !matcher.matches(&entity) {
                continue;
            }
            match self.finished_summary(&entity)? {
                Some(summary) => record(&entity, EntityState::Finished(summary)),
                None => record(&entity, EntityState::Historical),
            }
        }

        let finished_dir = &self.layout.finished_history;
        for name in snapshot_names(self.store.as_ref(), finished_dir, Layout::finished_snapshot_prefix())? {
            if let Some(db) = open_snapshot(self.store.as_ref(), &self.codec, finished_dir, &name)? {
                for entity in db.names_matching(pattern)? {
                    record(&entity, EntityState::Historical);
                }
            }
        }

        let trace_dir = self.layout.trace_history(TraceKind::Instance);
        let event_glob = format!("{pattern},*");
        for name in snapshot_names(
            self.store.as_ref(),
            trace_dir,
            Layout::trace_snapshot_prefix(TraceKind::Instance),
        )? {
            if let Some(db) = open_snapshot(self.store.as_ref(), &self.codec, trace_dir, &name)? {
                for event in db.names_matching(&event_glob)? {
                    if let Some(entity) = entity_of(&event).filter(|e| matcher.matches(e)) {
                        record(entity, EntityState::Historical);
                    }
                }
            }
        }

        Ok(found
            .into_iter()
            .map(|(entity, state)| EntityStatus { entity, state })
            .collect())
    }

    fn finished_summary(&self, entity: &str) -> CoreResult<Option<FinishedSummary>> {
        let node = path::join(&self.layout.finished, entity);
        let data = match self.store.get(&node) {
            Ok((data, _)) => data,
            Err(StoreError::NoNode { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match FinishedSummary::from_slice(&data) {
            Ok(summary) => Ok(Some(summary)),
            Err(e) => {
                tracing::warn!(node = %node, error = %e, "skipping malformed finished summary");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for HistoryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryReader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsmirror_store::{CreateMode, InMemoryStore};

    #[test]
    fn find_prefers_live_state() {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_path("/scheduled/app#0002", &[]).unwrap();
        store.ensure_path("/finished", &[]).unwrap();
        let summary = FinishedSummary {
            state: "finished".into(),
            when: 10.0,
            host: "h".into(),
            data: "0.0".into(),
        };
        store
            .create("/finished/app#0001", &summary.to_vec().unwrap(), CreateMode::Persistent, &[])
            .unwrap();
        store.create("/finished/app#0002", b"{}", CreateMode::Persistent, &[]).unwrap();
        store.create("/finished/other#0001", b"", CreateMode::Persistent, &[]).unwrap();

        let reader = HistoryReader::new(store.clone(), Layout::default());
        let found = reader.find("app#*").unwrap();
        assert_eq!(
            found,
            vec![
                EntityStatus {
                    entity: "app#0001".into(),
                    state: EntityState::Finished(summary),
                },
                EntityStatus {
                    entity: "app#0002".into(),
                    state: EntityState::Scheduled,
                },
            ]
        );
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let reader = HistoryReader::new(store, Layout::default());
        assert!(matches!(reader.find("[").unwrap_err(), CoreError::InvalidPattern { .. }));
    }

    #[test]
    fn corrupt_snapshot_is_skipped() {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_path("/trace.history", &[]).unwrap();
        store
            .create("/trace.history/trace.db.zst-", b"junk", CreateMode::PersistentSequential, &[])
            .unwrap();
        store.ensure_path("/trace/0001/a#0001,1,h,pending,", &[]).unwrap();

        let reader = HistoryReader::new(store, Layout::default());
        let events = reader.entity_events(TraceKind::Instance, "a#0001").unwrap();
        assert_eq!(events.len(), 1);
        assert!(reader.find("a#*").unwrap().is_empty());
    }
}
