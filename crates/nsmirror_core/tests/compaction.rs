//! Compaction passes and reads over the compacted history.

use nsmirror_codec::TraceEvent;
use nsmirror_core::{CompactionConfig, CompactionTarget, EntityState, HistoryReader, Layout, TraceKind};
use nsmirror_store::{CoordinationStore, StoreExt};
use nsmirror_testkit::prelude::*;
use proptest::prelude::*;
use std::time::Duration;

fn config(expiry_secs: u64, batch_size: usize) -> CompactionConfig {
    CompactionConfig::new()
        .expiry(Duration::from_secs(expiry_secs))
        .batch_size(batch_size)
}

fn snapshot_count(ns: &TestNamespace, dir: &str) -> usize {
    ns.store.as_ref().children_or_empty(dir).unwrap().len()
}

#[test]
fn full_batches_of_inactive_entities_are_compacted() {
    let ns = TestNamespace::new();
    let store = ns.store.as_ref();
    for n in 1..=4 {
        seed_events(store, &ns.layout, TraceKind::Instance, &instance("app1", n), 1000..1006);
    }
    schedule(store, &ns.layout, &instance("app1", 3));
    schedule(store, &ns.layout, &instance("app1", 4));

    let report = ns
        .compactor(config(3, 10))
        .compact_trace(TraceKind::Instance, 1100.0)
        .unwrap();

    assert_eq!(report.candidates, 12);
    assert_eq!(report.batches_uploaded, 1);
    assert_eq!(report.nodes_deleted, 10);
    assert_eq!(report.remainder, 2);
    assert_eq!(snapshot_count(&ns, ns.layout.trace_history(TraceKind::Instance)), 1);

    let reader = ns.reader();
    for n in [1, 2] {
        let entity = instance("app1", n);
        let live = store
            .children_or_empty(&ns.layout.trace_shard_path(TraceKind::Instance, &entity))
            .unwrap()
            .into_iter()
            .filter(|name| name.starts_with(&format!("{entity},")))
            .collect::<Vec<_>>();
        assert_eq!(live, vec![format!("{entity},1005,s1,configured,u1005")]);
        assert_eq!(reader.entity_events(TraceKind::Instance, &entity).unwrap().len(), 6);
    }
    // Active entities keep every live event.
    assert_eq!(live_event_count(store, &ns.layout, TraceKind::Instance), 2 + 12);
}

#[test]
fn compaction_between_reads_loses_no_events() {
    let ns = TestNamespace::new();
    let entity = instance("app1", 5);
    let records = seed_events(ns.store.as_ref(), &ns.layout, TraceKind::Instance, &entity, 1000..1006);
    ns.compactor(config(1, 4)).compact_trace(TraceKind::Instance, 5000.0).unwrap();

    let store = HookedStore::new(ns.store.clone());
    let compactor = ns.compactor(config(1, 2));
    store.after_listing(ns.layout.trace_history(TraceKind::Instance), move || {
        assert_eq!(compactor.compact_trace(TraceKind::Instance, 5000.0).unwrap().nodes_deleted, 2);
    });

    let reader = HistoryReader::new(store.clone(), ns.layout.clone());
    assert_eq!(reader.entity_events(TraceKind::Instance, &entity).unwrap(), records);
    assert_eq!(store.pending(), 0);
    assert_eq!(live_event_count(ns.store.as_ref(), &ns.layout, TraceKind::Instance), 0);
    assert_eq!(reader.entity_events(TraceKind::Instance, &entity).unwrap(), records);
}

#[test]
fn second_pass_waits_for_a_full_batch() {
    let ns = TestNamespace::new();
    let store = ns.store.as_ref();
    seed_events(store, &ns.layout, TraceKind::Instance, &instance("app1", 1), 1000..1012);
    let compactor = ns.compactor(config(3, 10));

    compactor.compact_trace(TraceKind::Instance, 1100.0).unwrap();
    let again = compactor.compact_trace(TraceKind::Instance, 1100.0).unwrap();

    assert_eq!(again.candidates, 2);
    assert_eq!(again.batches_uploaded, 0);
    assert_eq!(again.remainder, 2);
    assert_eq!(live_event_count(store, &ns.layout, TraceKind::Instance), 2);
}

#[test]
fn server_events_follow_presence() {
    let ns = TestNamespace::new();
    let store = ns.store.as_ref();
    seed_events(store, &ns.layout, TraceKind::Server, "srv1", 1000..1004);
    seed_events(store, &ns.layout, TraceKind::Server, "srv2", 1000..1004);
    store.ensure_path(&format!("{}/srv2", ns.layout.server_presence), &[]).unwrap();

    let report = ns
        .compactor(config(3, 4))
        .compact(CompactionTarget::Trace(TraceKind::Server), 1100.0)
        .unwrap();

    assert_eq!(report.nodes_deleted, 4);
    assert_eq!(live_event_count(store, &ns.layout, TraceKind::Server), 4);
    let names = store.children(ns.layout.trace_history(TraceKind::Server)).unwrap();
    assert!(names[0].starts_with(Layout::trace_snapshot_prefix(TraceKind::Server)));
}

#[test]
fn finished_entities_are_found_after_compaction() {
    let ns = TestNamespace::new();
    let store = ns.store.as_ref();
    store.set_time_ms(1_000);
    let entity = instance("app1", 9);
    schedule(store, &ns.layout, &entity);
    place(store, &ns.layout, "h1", &entity);
    ns.publisher("h1")
        .publish(
            TraceKind::Instance,
            1.0,
            &entity,
            &TraceEvent::Killed { is_oom: true },
            b"",
        )
        .unwrap();

    let found = ns.reader().find("app1#*").unwrap();
    assert_eq!(found.len(), 1);
    assert!(matches!(found[0].state, EntityState::Finished(_)));

    let compactor = ns.compactor(config(3, 1));
    assert_eq!(compactor.compact_finished(100.0).unwrap().nodes_deleted, 1);
    assert_eq!(compactor.compact_trace(TraceKind::Instance, 100.0).unwrap().nodes_deleted, 1);

    let found = ns.reader().find("app1#*").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].entity, entity);
    assert_eq!(found[0].state, EntityState::Historical);
}

#[test]
fn run_covers_every_target() {
    let ns = TestNamespace::new();
    let reports = ns.compactor(CompactionConfig::default()).run().unwrap();
    let targets: Vec<CompactionTarget> = reports.iter().map(|(target, _)| *target).collect();
    assert_eq!(
        targets,
        vec![
            CompactionTarget::Trace(TraceKind::Instance),
            CompactionTarget::Trace(TraceKind::Server),
            CompactionTarget::Finished,
        ]
    );
    assert!(reports.iter().all(|(_, report)| report.candidates == 0));
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn compaction_preserves_entity_events(batch in event_batch_strategy("app#0001"), size in 1usize..6) {
        let ns = TestNamespace::new();
        seed_records(ns.store.as_ref(), &ns.layout, TraceKind::Instance, &batch);
        let reader = ns.reader();
        let before = reader.entity_events(TraceKind::Instance, "app#0001").unwrap();

        let report = ns
            .compactor(config(1, size))
            .compact_trace(TraceKind::Instance, 5000.0)
            .unwrap();

        prop_assert_eq!(report.nodes_deleted, report.candidates - report.remainder);
        prop_assert_eq!(reader.entity_events(TraceKind::Instance, "app#0001").unwrap(), before);
    }

    #[test]
    fn snapshot_count_stays_bounded(passes in 1usize..8, max_snapshots in 1usize..4) {
        let ns = TestNamespace::new();
        let compactor = ns.compactor(config(1, 2).max_snapshots(max_snapshots));
        let history = ns.layout.trace_history(TraceKind::Instance);

        for pass in 0..passes {
            let first = 1000 + 2 * pass as u32;
            seed_events(ns.store.as_ref(), &ns.layout, TraceKind::Instance, "app#0001", first..first + 2);
            compactor.compact_trace(TraceKind::Instance, 5000.0).unwrap();
            prop_assert!(snapshot_count(&ns, history) <= max_snapshots);
        }
        prop_assert_eq!(snapshot_count(&ns, history), passes.min(max_snapshots));
    }
}
