//! Entity queries against encoded snapshots.

use nsmirror_codec::{entity_glob, parse_sorted, EventRecord, SnapshotCodec, SnapshotRow};
use proptest::prelude::*;

fn to_row(record: &EventRecord) -> SnapshotRow {
    SnapshotRow {
        path: format!("/trace/0001/{}", record.node_name()),
        timestamp: record.timestamp,
        data: None,
        directory: "/trace/0001".to_string(),
        name: record.node_name(),
    }
}

fn entity_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "app#0001".to_string(),
        "app#00010".to_string(),
        "app#000".to_string(),
        "a*p#0001".to_string(),
        "a?p[1]#0001".to_string(),
    ])
}

fn record_strategy() -> impl Strategy<Value = EventRecord> {
    (entity_strategy(), 1000u32..1020, "[a-z]{1,3}").prop_map(|(entity, ts, source)| {
        EventRecord::new(entity, f64::from(ts), source, "pending", "")
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn entity_glob_selects_exactly_one_entity(
        records in prop::collection::vec(record_strategy(), 0..30),
        entity in entity_strategy(),
    ) {
        let codec = SnapshotCodec::default();
        let rows: Vec<SnapshotRow> = records.iter().map(to_row).collect();
        let db = codec.open(&codec.encode(&rows).unwrap()).unwrap();

        let matched = db.rows_matching(&entity_glob(&entity)).unwrap();
        let from_snapshot = parse_sorted(matched.iter().map(|row| row.name.as_str()));

        let mut expected: Vec<EventRecord> = records.iter().filter(|r| r.belongs_to(&entity)).cloned().collect();
        expected.sort();
        prop_assert_eq!(from_snapshot, expected);
    }
}
