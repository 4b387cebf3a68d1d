use crate::config::TraceConfig;
use crate::error::{CoreError, CoreResult};
use crate::fatal::{AbortOnFatal, FatalHandler};
use crate::history::{open_snapshot, snapshot_names};
use crate::layout::{Layout, TraceKind};
use nsmirror_codec::{entity_glob, parse_sorted, EventRecord, SnapshotCodec, TraceEvent};
use nsmirror_store::{path, CoordinationStore, StoreError, StoreExt, WatchEvent, WatchEventKind, Watcher};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Receives replayed events in order.
///
/// Called with the loop's internal lock held: a handler must not call back
/// into its own [`TraceLoop`].
pub trait TraceHandler<C>: Send {
    /// Handles one decoded event.
    fn on_event(&mut self, ctx: &mut C, record: &EventRecord, event: &TraceEvent);
}

impl<C, F> TraceHandler<C> for F
where
    F: FnMut(&mut C, &EventRecord, &TraceEvent) + Send,
{
    fn on_event(&mut self, ctx: &mut C, record: &EventRecord, event: &TraceEvent) {
        self(ctx, record, event);
    }
}

/// Replay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceState {
    /// Events are still expected.
    Running,
    /// The entity ended; no watch is re-armed.
    Done,
}

/// Watch fires that arrived while [`TraceLoop::start`] was replaying.
#[derive(Debug, Default)]
struct HeldFires {
    shard: bool,
    marker: bool,
}

struct Cursor<C> {
    state: TraceState,
    held: Option<HeldFires>,
    last: Option<EventRecord>,
    last_snapshot: Option<String>,
    applied: usize,
    handler: Box<dyn TraceHandler<C>>,
    ctx: C,
}

struct LoopInner<C> {
    store: Arc<dyn CoordinationStore>,
    layout: Layout,
    config: TraceConfig,
    kind: TraceKind,
    entity: String,
    codec: SnapshotCodec,
    fatal: RwLock<Arc<dyn FatalHandler>>,
    cursor: Mutex<Cursor<C>>,
    done: Condvar,
}

/// Ordered replay of one entity's events.
///
/// [`TraceLoop::start`] first replays snapshots not yet absorbed, oldest
/// first, then follows the live shard with a children watch. Every batch is
/// parsed, sorted and cut down to events strictly newer than the last one
/// applied, so re-delivered batches apply nothing twice.
///
/// The loop is `Done` once a terminal instance event is applied or the
/// entity's active marker (`/scheduled/<entity>` for instances,
/// `/server.presence/<server>` for servers) is gone.
///
/// # Example
///
/// ```rust
/// use nsmirror_core::{Layout, TraceConfig, TraceKind, TraceLoop, TraceState};
/// use nsmirror_store::InMemoryStore;
/// use std::sync::Arc;
///
/// let store = Arc::new(InMemoryStore::new());
/// let trace = TraceLoop::new(
///     store,
///     Layout::default(),
///     TraceConfig::new("host1"),
///     TraceKind::Instance,
///     "app#0001",
///     Vec::new(),
///     |seen: &mut Vec<String>, record: &nsmirror_codec::EventRecord, _: &nsmirror_codec::TraceEvent| {
///         seen.push(record.event_type.clone());
///     },
/// );
/// trace.start().unwrap();
/// // Nothing is scheduled, so the loop finishes immediately.
/// assert_eq!(trace.state(), TraceState::Done);
/// ```
pub struct TraceLoop<C> {
    inner: Arc<LoopInner<C>>,
}

impl<C: Send + 'static> TraceLoop<C> {
    /// Creates a loop over `entity`'s events. Nothing is read until [`start`](Self::start).
    pub fn new<H>(
        store: Arc<dyn CoordinationStore>,
        layout: Layout,
        config: TraceConfig,
        kind: TraceKind,
        entity: impl Into<String>,
        ctx: C,
        handler: H,
    ) -> Self
    where
        H: TraceHandler<C> + 'static,
    {
        Self {
            inner: Arc::new(LoopInner {
                store,
                layout,
                config,
                kind,
                entity: entity.into(),
                codec: SnapshotCodec::default(),
                fatal: RwLock::new(Arc::new(AbortOnFatal)),
                cursor: Mutex::new(Cursor {
                    state: TraceState::Running,
                    held: None,
                    last: None,
                    last_snapshot: None,
                    applied: 0,
                    handler: Box::new(handler),
                    ctx,
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Replaces the fatal handler.
    #[must_use]
    pub fn with_fatal_handler(self, fatal: Arc<dyn FatalHandler>) -> Self {
        *self.inner.fatal.write() = fatal;
        self
    }

    /// Lists the live shard and arms the live watches, replays history,
    /// then applies the live listing.
    ///
    /// The live listing is taken before any snapshot is read, so entries a
    /// concurrent compaction moves out of the shard are found in a snapshot.
    /// Watch fires arriving before the live listing is applied are held and
    /// handled afterwards.
    pub fn start(&self) -> CoreResult<()> {
        self.inner.cursor.lock().held = Some(HeldFires::default());
        let started = self.replay_all();
        let held = self.inner.cursor.lock().held.take().unwrap_or_default();
        let active = started?;

        if !active {
            tracing::debug!(entity = %self.inner.entity, "entity not active, replayed once");
            self.finish();
            return Ok(());
        }
        if self.state() == TraceState::Done {
            return Ok(());
        }
        if held.marker {
            let marker = self.active_marker();
            if self.inner.store.exists_watch(&marker, self.marker_watcher())?.is_none() {
                self.drain_live()?;
                self.finish();
                return Ok(());
            }
        }
        if held.shard {
            self.follow_live()?;
        }
        Ok(())
    }

    /// Returns whether the entity's active marker exists.
    fn replay_all(&self) -> CoreResult<bool> {
        let shard = self.inner.layout.trace_shard_path(self.inner.kind, &self.inner.entity);
        self.inner.store.ensure_path(&shard, &[])?;

        let marker = self.active_marker();
        let active = self.inner.store.exists_watch(&marker, self.marker_watcher())?.is_some();
        let live = if active {
            self.inner.store.children_watch(&shard, self.shard_watcher())?
        } else {
            self.inner.store.children_or_empty(&shard)?
        };

        self.replay_history()?;
        self.process_batch(live.iter().map(String::as_str));
        Ok(active)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TraceState {
        self.inner.cursor.lock().state
    }

    /// Number of events handed to the handler so far.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.inner.cursor.lock().applied
    }

    /// The last event applied.
    #[must_use]
    pub fn last_event(&self) -> Option<EventRecord> {
        self.inner.cursor.lock().last.clone()
    }

    /// Name of the newest snapshot absorbed.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<String> {
        self.inner.cursor.lock().last_snapshot.clone()
    }

    /// Runs `f` on the handler context.
    pub fn with_context<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&self.inner.cursor.lock().ctx)
    }

    /// Blocks until the loop is `Done`.
    pub fn wait(&self) {
        let mut cursor = self.inner.cursor.lock();
        while cursor.state != TraceState::Done {
            self.inner.done.wait(&mut cursor);
        }
    }

    /// Blocks until the loop is `Done` or `timeout` passes. Returns true if done.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cursor = self.inner.cursor.lock();
        if cursor.state == TraceState::Done {
            return true;
        }
        let _ = self
            .inner
            .done
            .wait_while_for(&mut cursor, |c| c.state != TraceState::Done, timeout);
        cursor.state == TraceState::Done
    }

    /// Applies one batch of event node names and returns how many events
    /// reached the handler.
    ///
    /// Names of other entities, malformed names and events not newer than the
    /// last applied one are skipped. A done loop applies nothing.
    pub fn process_batch<'a, I>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let records = parse_sorted(names);
        let mut cursor = self.inner.cursor.lock();
        let mut applied = 0;

        for record in records {
            if cursor.state == TraceState::Done {
                break;
            }
            if !record.belongs_to(&self.inner.entity) {
                continue;
            }
            if cursor.last.as_ref().is_some_and(|last| record <= *last) {
                continue;
            }

            if let Some(event) = TraceEvent::from_record(&record) {
                let Cursor { handler, ctx, .. } = &mut *cursor;
                handler.on_event(ctx, &record, &event);
                applied += 1;
            }
            let terminal = self.inner.kind == TraceKind::Instance && self.inner.config.is_terminal(&record.event_type);
            cursor.last = Some(record);
            if terminal {
                cursor.state = TraceState::Done;
            }
        }

        cursor.applied += applied;
        if cursor.state == TraceState::Done {
            self.inner.done.notify_all();
        }
        applied
    }

    fn replay_history(&self) -> CoreResult<()> {
        let dir = self.inner.layout.trace_history(self.inner.kind);
        let prefix = Layout::trace_snapshot_prefix(self.inner.kind);
        let names = snapshot_names(self.inner.store.as_ref(), dir, prefix)?;
        let glob = entity_glob(&self.inner.entity);

        for name in names {
            let absorbed = self.inner.cursor.lock().last_snapshot.clone();
            if absorbed.as_ref().is_some_and(|last| name <= *last) {
                continue;
            }
            if let Some(db) = open_snapshot(self.inner.store.as_ref(), &self.inner.codec, dir, &name)? {
                let rows = db.rows_matching(&glob)?;
                self.process_batch(rows.iter().map(|row| row.name.as_str()));
            }
            self.inner.cursor.lock().last_snapshot = Some(name);
        }
        Ok(())
    }

    fn follow_live(&self) -> CoreResult<()> {
        if self.state() == TraceState::Done {
            return Ok(());
        }
        let shard = self.inner.layout.trace_shard_path(self.inner.kind, &self.inner.entity);
        let names = self.inner.store.children_watch(&shard, self.shard_watcher())?;
        self.process_batch(names.iter().map(String::as_str));
        Ok(())
    }

    fn drain_live(&self) -> CoreResult<()> {
        let shard = self.inner.layout.trace_shard_path(self.inner.kind, &self.inner.entity);
        match self.inner.store.children(&shard) {
            Ok(names) => {
                self.process_batch(names.iter().map(String::as_str));
                Ok(())
            }
            Err(StoreError::NoNode { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn finish(&self) {
        let mut cursor = self.inner.cursor.lock();
        if cursor.state != TraceState::Done {
            cursor.state = TraceState::Done;
            tracing::debug!(entity = %self.inner.entity, applied = cursor.applied, "trace loop done");
        }
        self.inner.done.notify_all();
    }

    fn active_marker(&self) -> String {
        path::join(self.inner.layout.active_root(self.inner.kind), &self.inner.entity)
    }

    fn shard_watcher(&self) -> Watcher {
        let weak = Arc::downgrade(&self.inner);
        Watcher::new(move |event| {
            if let Some(trace) = upgrade(&weak) {
                trace.on_shard_event(&event);
            }
        })
    }

    fn marker_watcher(&self) -> Watcher {
        let weak = Arc::downgrade(&self.inner);
        Watcher::new(move |event| {
            if let Some(trace) = upgrade(&weak) {
                trace.on_marker_event(&event);
            }
        })
    }

    fn on_shard_event(&self, event: &WatchEvent) {
        if self.state() == TraceState::Done {
            return;
        }
        if event.kind == WatchEventKind::SessionExpired {
            self.escalate(CoreError::Store(StoreError::SessionExpired));
            return;
        }
        if self.hold(|held| held.shard = true) {
            return;
        }
        if let Err(e) = self.follow_live() {
            self.escalate(e);
        }
    }

    fn on_marker_event(&self, event: &WatchEvent) {
        if self.state() == TraceState::Done {
            return;
        }
        if event.kind != WatchEventKind::SessionExpired && self.hold(|held| held.marker = true) {
            return;
        }
        let result = match event.kind {
            WatchEventKind::SessionExpired => Err(CoreError::Store(StoreError::SessionExpired)),
            WatchEventKind::Deleted => self.drain_live().map(|()| self.finish()),
            _ => {
                let marker = self.active_marker();
                match self.inner.store.exists_watch(&marker, self.marker_watcher()) {
                    Ok(Some(_)) => Ok(()),
                    Ok(None) => self.drain_live().map(|()| self.finish()),
                    Err(e) => Err(e.into()),
                }
            }
        };
        if let Err(e) = result {
            self.escalate(e);
        }
    }

    /// Records a fire for later if `start` is still replaying.
    fn hold(&self, mark: impl FnOnce(&mut HeldFires)) -> bool {
        match self.inner.cursor.lock().held.as_mut() {
            Some(held) => {
                mark(held);
                true
            }
            None => false,
        }
    }

    fn escalate(&self, error: CoreError) {
        if error.is_no_node() {
            tracing::debug!(entity = %self.inner.entity, "node vanished during replay");
            return;
        }
        let fatal = Arc::clone(&self.inner.fatal.read());
        fatal.fatal(&format!("trace {}", self.inner.entity), &error);
    }
}

impl<C> std::fmt::Debug for TraceLoop<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLoop")
            .field("entity", &self.inner.entity)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

fn upgrade<C>(weak: &Weak<LoopInner<C>>) -> Option<TraceLoop<C>> {
    weak.upgrade().map(|inner| TraceLoop { inner })
}
