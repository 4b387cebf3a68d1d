//! Property-based test generators using proptest.

use nsmirror_codec::EventRecord;
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for valid node names (no `/`, no `,`, never a dotfile).
pub fn child_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,5}").expect("Invalid regex")
}

/// Strategy for one remote child set.
pub fn child_set_strategy() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(child_name_strategy(), 0..12)
}

/// Strategy for a sequence of child sets a directory moves through.
pub fn child_history_strategy() -> impl Strategy<Value = Vec<BTreeSet<String>>> {
    prop::collection::vec(child_set_strategy(), 1..6)
}

/// Strategy for event types that never end an instance.
pub fn non_terminal_type_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["pending", "configured", "deleted", "service_running"])
}

/// Strategy for events of `entity` with whole-second timestamps.
pub fn event_strategy(entity: &'static str) -> impl Strategy<Value = EventRecord> {
    (1000u32..1100, prop::sample::select(vec!["h1", "h2"]), non_terminal_type_strategy()).prop_map(
        move |(ts, source, event_type)| {
            let data = match event_type {
                "configured" => "u1",
                "service_running" => "u1.web",
                _ => "",
            };
            EventRecord::new(entity, f64::from(ts), source, event_type, data)
        },
    )
}

/// Strategy for a batch of events of `entity`, possibly with duplicates.
pub fn event_batch_strategy(entity: &'static str) -> impl Strategy<Value = Vec<EventRecord>> {
    prop::collection::vec(event_strategy(entity), 0..20)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
