//! Namespace seeding for trace and compaction scenarios.

use nsmirror_codec::EventRecord;
use nsmirror_core::{Layout, TraceKind};
use nsmirror_store::{CoordinationStore, CreateMode, StoreExt};

/// Instance name `app#NNNN` as used by the scenarios.
pub fn instance(app: &str, number: u32) -> String {
    format!("{app}#{number:04}")
}

/// Creates `/scheduled/<entity>`.
pub fn schedule(store: &dyn CoordinationStore, layout: &Layout, entity: &str) {
    store
        .ensure_path(&layout.scheduled_path(entity), &[])
        .expect("Failed to schedule");
}

/// Creates `/placement/<host>/<entity>`.
pub fn place(store: &dyn CoordinationStore, layout: &Layout, host: &str, entity: &str) {
    store
        .ensure_path(&layout.placement_path(host, entity), &[])
        .expect("Failed to place");
}

/// Writes one live `configured` event per timestamp for `entity`.
pub fn seed_events(
    store: &dyn CoordinationStore,
    layout: &Layout,
    kind: TraceKind,
    entity: &str,
    timestamps: impl IntoIterator<Item = u32>,
) -> Vec<EventRecord> {
    let records: Vec<EventRecord> = timestamps
        .into_iter()
        .map(|ts| EventRecord::new(entity, f64::from(ts), "s1", "configured", format!("u{ts}")))
        .collect();
    seed_records(store, layout, kind, &records);
    records
}

/// Writes `records` as live event nodes, ignoring ones that already exist.
pub fn seed_records(store: &dyn CoordinationStore, layout: &Layout, kind: TraceKind, records: &[EventRecord]) {
    for record in records {
        store
            .ensure_path(&layout.trace_shard_path(kind, &record.entity), &[])
            .expect("Failed to create shard");
        match store.create(&layout.event_path(kind, record), b"", CreateMode::Persistent, &[]) {
            Ok(_) => {}
            Err(e) if e.is_node_exists() => {}
            Err(e) => panic!("Failed to seed event: {e}"),
        }
    }
}

/// Number of live event nodes of `kind` across all shards.
pub fn live_event_count(store: &dyn CoordinationStore, layout: &Layout, kind: TraceKind) -> usize {
    let root = layout.trace_root(kind);
    store
        .children_or_empty(root)
        .expect("Failed to list shards")
        .iter()
        .map(|shard| {
            store
                .children_or_empty(&nsmirror_store::path::join(root, shard))
                .expect("Failed to list shard")
                .len()
        })
        .sum()
}
