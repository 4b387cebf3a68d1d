use super::summary::FinishedSummary;
use crate::config::TraceConfig;
use crate::error::CoreResult;
use crate::layout::{Layout, TraceKind};
use nsmirror_codec::{EventRecord, TraceEvent};
use nsmirror_store::{CoordinationStore, CreateMode, StoreError, StoreExt};
use std::sync::Arc;

/// Outcome of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// The event node was created.
    Created,
    /// An identical event node already existed.
    Duplicate,
}

/// Writes lifecycle events into the namespace.
///
/// Publishing is idempotent: the node name is the full event tuple, so a
/// retried publish finds the node already there and succeeds.
///
/// A terminal instance event also records `/finished/<entity>` and removes
/// `/scheduled/<entity>`, but only while `/placement/<source>/<entity>`
/// still exists. A late retry from a host that lost the placement changes
/// nothing beyond the event node.
pub struct TracePublisher {
    store: Arc<dyn CoordinationStore>,
    layout: Layout,
    config: TraceConfig,
}

impl TracePublisher {
    /// Creates a publisher.
    pub fn new(store: Arc<dyn CoordinationStore>, layout: Layout, config: TraceConfig) -> Self {
        Self { store, layout, config }
    }

    /// Publishes `event` for `entity` at `when` (seconds since the epoch).
    pub fn publish(
        &self,
        kind: TraceKind,
        when: f64,
        entity: &str,
        event: &TraceEvent,
        payload: &[u8],
    ) -> CoreResult<Published> {
        let record = event.to_record(entity, when, self.config.source.as_str());
        self.publish_record(kind, &record, payload)
    }

    /// Publishes a pre-built record.
    pub fn publish_record(&self, kind: TraceKind, record: &EventRecord, payload: &[u8]) -> CoreResult<Published> {
        let shard = self.layout.trace_shard_path(kind, &record.entity);
        self.store.ensure_path(&shard, &[])?;

        let node = self.layout.event_path(kind, record);
        let outcome = match self.store.create(&node, payload, CreateMode::Persistent, &[]) {
            Ok(_) => Published::Created,
            Err(StoreError::NodeExists { .. }) => {
                tracing::debug!(node = %node, "event already published");
                Published::Duplicate
            }
            Err(e) => return Err(e.into()),
        };

        if kind == TraceKind::Instance && self.config.is_terminal(&record.event_type) {
            self.finish(record)?;
        }
        Ok(outcome)
    }

    fn finish(&self, record: &EventRecord) -> CoreResult<()> {
        let placement = self.layout.placement_path(&record.source, &record.entity);
        if self.store.exists(&placement)?.is_none() {
            tracing::debug!(
                entity = %record.entity,
                host = %record.source,
                "placement moved, not finishing"
            );
            return Ok(());
        }

        let summary = FinishedSummary::from_record(record);
        self.store
            .put(&self.layout.finished_path(&record.entity), &summary.to_vec()?, &[])?;
        self.store.ensure_deleted(&self.layout.scheduled_path(&record.entity))?;
        tracing::info!(entity = %record.entity, state = %record.event_type, "instance finished");
        Ok(())
    }
}

impl std::fmt::Debug for TracePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracePublisher")
            .field("source", &self.config.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsmirror_store::InMemoryStore;

    fn publisher(store: &Arc<InMemoryStore>) -> TracePublisher {
        TracePublisher::new(store.clone(), Layout::default(), TraceConfig::new("host1"))
    }

    #[test]
    fn duplicate_publish_creates_one_node() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = publisher(&store);
        let event = TraceEvent::Configured { uniqueid: "u1".into() };

        let first = publisher.publish(TraceKind::Instance, 1000.0, "app#0001", &event, b"").unwrap();
        let second = publisher.publish(TraceKind::Instance, 1000.0, "app#0001", &event, b"").unwrap();

        assert_eq!(first, Published::Created);
        assert_eq!(second, Published::Duplicate);
        assert_eq!(store.children("/trace/0001").unwrap(), vec!["app#0001,1000,host1,configured,u1"]);
    }

    #[test]
    fn terminal_event_finishes_owned_instance() {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_path("/scheduled/app#0001", &[]).unwrap();
        store.ensure_path("/placement/host1/app#0001", &[]).unwrap();
        let publisher = publisher(&store);

        let event = TraceEvent::Finished { exitcode: 0, signal: 0 };
        publisher.publish(TraceKind::Instance, 1005.0, "app#0001", &event, b"").unwrap();

        assert!(store.exists("/scheduled/app#0001").unwrap().is_none());
        let (data, _) = store.get("/finished/app#0001").unwrap();
        let summary = FinishedSummary::from_slice(&data).unwrap();
        assert_eq!(summary.state, "finished");
        assert_eq!(summary.host, "host1");
        assert_eq!(summary.data, "0.0");
    }

    #[test]
    fn stale_terminal_event_leaves_schedule_alone() {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_path("/scheduled/app#0001", &[]).unwrap();
        store.ensure_path("/placement/host2/app#0001", &[]).unwrap();
        let publisher = publisher(&store);

        let event = TraceEvent::Killed { is_oom: true };
        publisher.publish(TraceKind::Instance, 1005.0, "app#0001", &event, b"").unwrap();

        assert!(store.exists("/scheduled/app#0001").unwrap().is_some());
        assert!(store.exists("/finished/app#0001").unwrap().is_none());
        assert_eq!(store.children("/trace/0001").unwrap().len(), 1);
    }

    #[test]
    fn server_events_never_finish() {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_path("/placement/host1/srv1", &[]).unwrap();
        let publisher = publisher(&store);

        let record = EventRecord::new("srv1", 10.0, "host1", "finished", "0.0");
        publisher.publish_record(TraceKind::Server, &record, b"").unwrap();
        assert!(store.exists("/finished/srv1").unwrap().is_none());
    }
}
