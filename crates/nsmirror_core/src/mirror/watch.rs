//! Per-path data watch state.

use std::collections::HashMap;

/// Lifecycle of the data watch on one mirrored path.
///
/// ```text
/// Unwatched --arm--> Watching --fire--> Fired --arm--> Watching
///                        |                 |
///                        +------close------+--> Closed
/// ```
///
/// `Closed` is terminal until the path is registered again by a later
/// children sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Registered, no watch armed yet.
    Unwatched,
    /// A one-shot watch is armed with the store.
    Watching,
    /// The armed watch fired and has not been re-armed.
    Fired,
    /// Node deleted; the path is no longer watched.
    Closed,
}

/// The mirror's watch-set.
#[derive(Debug, Default)]
pub(crate) struct WatchTable {
    states: HashMap<String, WatchState>,
}

impl WatchTable {
    /// Adds `path` to the watch-set. A live entry is left alone.
    pub fn register(&mut self, path: &str) {
        match self.states.get(path) {
            Some(WatchState::Watching | WatchState::Fired | WatchState::Unwatched) => {}
            Some(WatchState::Closed) | None => {
                self.states.insert(path.to_string(), WatchState::Unwatched);
            }
        }
    }

    pub fn state(&self, path: &str) -> Option<WatchState> {
        self.states.get(path).copied()
    }

    /// True if `path` is in the watch-set and not closed.
    pub fn is_live(&self, path: &str) -> bool {
        matches!(
            self.state(path),
            Some(WatchState::Unwatched | WatchState::Watching | WatchState::Fired)
        )
    }

    /// Moves `path` to `Watching`. Returns false if a watch is already armed
    /// or the path is not live.
    pub fn begin_arm(&mut self, path: &str) -> bool {
        match self.states.get_mut(path) {
            Some(state @ (WatchState::Unwatched | WatchState::Fired)) => {
                *state = WatchState::Watching;
                true
            }
            _ => false,
        }
    }

    /// Records a watch fire. Returns false for stale fires on closed paths.
    pub fn fire(&mut self, path: &str) -> bool {
        match self.states.get_mut(path) {
            Some(state @ WatchState::Watching) => {
                *state = WatchState::Fired;
                true
            }
            _ => false,
        }
    }

    /// Returns a path whose arming failed to `Fired` so it is retried.
    pub fn arm_failed(&mut self, path: &str) {
        if let Some(state @ WatchState::Watching) = self.states.get_mut(path) {
            *state = WatchState::Fired;
        }
    }

    /// Marks `path` closed.
    pub fn close(&mut self, path: &str) {
        if let Some(state) = self.states.get_mut(path) {
            *state = WatchState::Closed;
        }
    }

    /// Paths whose watch fired and still need reconciling.
    pub fn fired(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .states
            .iter()
            .filter(|(_, s)| **s == WatchState::Fired)
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Drops closed entries. Returns how many were removed.
    pub fn prune_closed(&mut self) -> usize {
        let before = self.states.len();
        self.states.retain(|_, s| *s != WatchState::Closed);
        before - self.states.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.states.len()
    }
}
