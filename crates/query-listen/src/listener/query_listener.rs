//! QueryListener: the core listener one registration holds against the
//! sync engine.
//!
//! # Threading model
//!
//! The engine calls `on_view_change` / `on_online_state_change` from its
//! own thread, one event at a time. Applications call `remove` from any
//! thread. The Active → Removed transition is a single compare-and-set on
//! `state`; whichever path wins performs the side effect (unlisten, or
//! delivering the terminal error) and the loser is a no-op.
//!
//! `view` holds the raise-policy state. Its lock is held while a raised
//! snapshot or the terminal error is handed to the sink, so the raise
//! decision and the dispatch are one step and two delivering threads (a
//! replay racing a fan-out) cannot reorder events. The sink must only
//! enqueue; `AsyncEventListener` never runs the callback inline.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::engine::SyncEngine;
use crate::error::{ListenError, ListenResult};
use crate::types::{ListenOptions, ListenerId, OnlineState, Query, SnapshotVersion, ViewSnapshot};

use super::EventListener;

const ACTIVE: u8 = 0;
const REMOVED: u8 = 1;

/// Lifecycle state of a listener. `Removed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Active,
    Removed,
}

// ============================================================================
// Raise policy state
// ============================================================================

#[derive(Default)]
struct ListenerView {
    /// Last snapshot received from the engine (raised or not).
    snapshot: Option<ViewSnapshot>,
    raised_initial_event: bool,
    online_state: OnlineState,
    /// Version of the last snapshot handed to the sink.
    last_version: Option<SnapshotVersion>,
}

impl ListenerView {
    /// Record `snapshot`; return what should be raised, if anything.
    fn apply(&mut self, snapshot: ViewSnapshot, options: &ListenOptions) -> Option<ViewSnapshot> {
        if let Some(last) = self.last_version {
            if snapshot.version < last {
                tracing::trace!(
                    version = snapshot.version.0,
                    last = last.0,
                    "stale snapshot dropped"
                );
                return None;
            }
        }

        let snapshot = if options.include_metadata_changes {
            snapshot
        } else {
            snapshot.without_metadata_changes()
        };

        let raised = if !self.raised_initial_event {
            if self.should_raise_initial(&snapshot, options) {
                Some(self.initial_event(&snapshot))
            } else {
                None
            }
        } else if self.should_raise(&snapshot, options) {
            self.last_version = Some(snapshot.version);
            Some(snapshot.clone())
        } else {
            None
        };

        self.snapshot = Some(snapshot);
        raised
    }

    fn on_online_state_change(
        &mut self,
        state: OnlineState,
        options: &ListenOptions,
    ) -> Option<ViewSnapshot> {
        self.online_state = state;
        let held = self.snapshot.as_ref()?;
        if self.raised_initial_event || !self.should_raise_initial(held, options) {
            return None;
        }
        let held = held.clone();
        Some(self.initial_event(&held))
    }

    fn should_raise_initial(&self, snapshot: &ViewSnapshot, options: &ListenOptions) -> bool {
        if !snapshot.from_cache {
            return true;
        }
        let maybe_online = self.online_state != OnlineState::Offline;
        if options.wait_for_sync_when_online && maybe_online {
            return false;
        }
        // Without documents, wait for the backend unless we know we're offline.
        !snapshot.documents.is_empty() || self.online_state == OnlineState::Offline
    }

    fn should_raise(&self, snapshot: &ViewSnapshot, options: &ListenOptions) -> bool {
        if !snapshot.changes.is_empty() {
            return true;
        }
        let pending_writes_changed = self
            .snapshot
            .as_ref()
            .is_some_and(|prev| prev.has_pending_writes != snapshot.has_pending_writes);
        if snapshot.sync_state_changed || pending_writes_changed {
            return options.include_metadata_changes;
        }
        false
    }

    /// The first raised snapshot reports every document as added.
    fn initial_event(&mut self, snapshot: &ViewSnapshot) -> ViewSnapshot {
        self.raised_initial_event = true;
        self.last_version = Some(snapshot.version);
        let mut initial = ViewSnapshot::from_initial_documents(
            snapshot.query.clone(),
            snapshot.documents.clone(),
            snapshot.version,
            snapshot.from_cache,
        );
        initial.has_pending_writes = snapshot.has_pending_writes;
        initial.excludes_metadata_changes = snapshot.excludes_metadata_changes;
        initial
    }
}

// ============================================================================
// QueryListener
// ============================================================================

pub struct QueryListener {
    id: ListenerId,
    query: Query,
    options: ListenOptions,
    state: AtomicU8,
    view: Mutex<ListenerView>,
    sink: Arc<dyn EventListener<ViewSnapshot>>,
    /// Back-reference used only to unlisten; never keeps the engine alive.
    engine: Weak<dyn SyncEngine>,
}

impl QueryListener {
    pub fn new(
        id: ListenerId,
        query: Query,
        options: ListenOptions,
        sink: Arc<dyn EventListener<ViewSnapshot>>,
        engine: Weak<dyn SyncEngine>,
    ) -> Self {
        Self {
            id,
            query,
            options,
            state: AtomicU8::new(ACTIVE),
            view: Mutex::new(ListenerView::default()),
            sink,
            engine,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn options(&self) -> &ListenOptions {
        &self.options
    }

    pub fn state(&self) -> ListenerState {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => ListenerState::Active,
            _ => ListenerState::Removed,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.state() == ListenerState::Removed
    }

    /// Entry point for the sync engine. Returns whether anything was
    /// handed to the sink.
    ///
    /// Events arriving after removal are dropped silently. An error is
    /// terminal: it removes the listener and is delivered exactly once.
    pub fn on_view_change(&self, event: ListenResult<ViewSnapshot>) -> bool {
        match event {
            Ok(snapshot) => self.on_view_snapshot(snapshot),
            Err(error) => self.on_error(error),
        }
    }

    /// Connectivity update from the engine; may release a held-back
    /// initial snapshot.
    pub fn on_online_state_change(&self, state: OnlineState) -> bool {
        if self.is_removed() {
            return false;
        }
        let mut view = self.view.lock();
        match view.on_online_state_change(state, &self.options) {
            Some(snapshot) => self.raise(snapshot),
            None => false,
        }
    }

    /// Unsubscribe from the engine. Only the first call has an effect;
    /// returns whether this call performed the removal.
    pub fn remove(&self) -> bool {
        if !self.mark_removed() {
            return false;
        }
        match self.engine.upgrade() {
            Some(engine) => engine.unlisten(self),
            None => tracing::trace!(listener = %self.id, "engine already gone; nothing to unlisten"),
        }
        tracing::debug!(listener = %self.id, query = self.query.path(), "listener removed");
        true
    }

    /// Mark removed without unlistening. For listeners the engine has not
    /// accepted yet; the caller owns the single unlisten once it has.
    pub(crate) fn detach(&self) -> bool {
        self.mark_removed()
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn on_view_snapshot(&self, snapshot: ViewSnapshot) -> bool {
        if self.is_removed() {
            tracing::trace!(listener = %self.id, "snapshot after removal dropped");
            return false;
        }
        // `view` stays locked through `raise`.
        let mut view = self.view.lock();
        match view.apply(snapshot, &self.options) {
            Some(snapshot) => self.raise(snapshot),
            None => false,
        }
    }

    fn raise(&self, snapshot: ViewSnapshot) -> bool {
        if self.is_removed() {
            return false;
        }
        self.sink.on_event(Ok(snapshot));
        true
    }

    fn on_error(&self, error: ListenError) -> bool {
        let _view = self.view.lock();
        if !self.mark_removed() {
            tracing::trace!(listener = %self.id, "error after removal dropped");
            return false;
        }
        tracing::warn!(
            listener = %self.id,
            query = self.query.path(),
            code = %error.code,
            "listen failed; subscription closed"
        );
        self.sink.on_event(Err(error));
        true
    }

    fn mark_removed(&self) -> bool {
        self.state
            .compare_exchange(ACTIVE, REMOVED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl std::fmt::Debug for QueryListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryListener")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
