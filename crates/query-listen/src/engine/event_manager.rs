//! EventManager: in-process fan-out from view snapshots to query
//! listeners.
//!
//! Listeners on the same query share one target. The latest snapshot per
//! target is kept so that a listener joining late sees the current state
//! immediately.
//!
//! Listener lists are snapshotted under the state lock and the lock is
//! released before any listener runs, so listeners may call back into the
//! manager (e.g. `unlisten` through `QueryListener::remove`) without
//! deadlocking.
//!
//! Deliveries (fan-out, errors, online state and the replay a new listener
//! receives in `listen`) are serialized by a separate `delivery` lock, so a
//! late joiner sees either the replay or the fan-out of a snapshot, never
//! both and never out of order. A sink must not call `listen` or any
//! `on_*` method synchronously; `unlisten` only takes the state lock.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ErrorCode, ListenError};
use crate::listener::QueryListener;
use crate::types::{OnlineState, Query, TargetId, ViewSnapshot};

use super::SyncEngine;

// ============================================================================
// Internal state
// ============================================================================

struct QueryListenersInfo {
    target_id: TargetId,
    listeners: Vec<Arc<QueryListener>>,
    /// Latest snapshot delivered for this target.
    snapshot: Option<ViewSnapshot>,
}

struct EventManagerState {
    queries: HashMap<Query, QueryListenersInfo>,
    online_state: OnlineState,
    next_target_id: i32,
}

impl EventManagerState {
    fn new() -> Self {
        Self {
            queries: HashMap::new(),
            online_state: OnlineState::Unknown,
            next_target_id: 1,
        }
    }
}

// ============================================================================
// EventManager
// ============================================================================

pub struct EventManager {
    state: Mutex<EventManagerState>,
    /// Held for the whole of every delivery; always taken before `state`.
    delivery: Mutex<()>,
    unlisten_calls: AtomicU64,
}

impl EventManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EventManagerState::new()),
            delivery: Mutex::new(()),
            unlisten_calls: AtomicU64::new(0),
        }
    }

    /// Store and fan out each snapshot to the listeners of its query.
    ///
    /// Snapshots for queries nobody listens to are ignored. Returns how many
    /// listener deliveries were raised.
    pub fn on_view_snapshots(&self, snapshots: Vec<ViewSnapshot>) -> usize {
        let _delivery = self.delivery.lock();
        let mut raised = 0;
        for snapshot in snapshots {
            let listeners: Vec<Arc<QueryListener>> = {
                let mut st = self.state.lock();
                match st.queries.get_mut(&snapshot.query) {
                    Some(info) => {
                        info.snapshot = Some(snapshot.clone());
                        info.listeners.clone()
                    }
                    None => {
                        tracing::trace!(query = snapshot.query.path(), "snapshot for unknown query");
                        continue;
                    }
                }
            };
            for listener in listeners {
                if listener.on_view_change(Ok(snapshot.clone())) {
                    raised += 1;
                }
            }
        }
        raised
    }

    /// Fail every listener of `query` with a terminal error.
    ///
    /// The target is released before the error is delivered; listeners are
    /// not expected to unlisten afterwards. Returns how many listeners
    /// received the error.
    pub fn on_error(&self, query: &Query, error: ListenError) -> usize {
        let _delivery = self.delivery.lock();
        let info = self.state.lock().queries.remove(query);
        let Some(info) = info else {
            return 0;
        };
        tracing::warn!(
            query = query.path(),
            target = %info.target_id,
            code = %error.code,
            listeners = info.listeners.len(),
            "target failed"
        );
        let mut delivered = 0;
        for listener in info.listeners {
            if listener.on_view_change(Err(error.clone())) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Broadcast a connectivity change to every listener.
    pub fn on_online_state_change(&self, online_state: OnlineState) {
        let _delivery = self.delivery.lock();
        let listeners: Vec<Arc<QueryListener>> = {
            let mut st = self.state.lock();
            if st.online_state == online_state {
                return;
            }
            st.online_state = online_state;
            st.queries
                .values()
                .flat_map(|info| info.listeners.iter().cloned())
                .collect()
        };
        tracing::debug!(?online_state, listeners = listeners.len(), "online state changed");
        for listener in listeners {
            listener.on_online_state_change(online_state);
        }
    }

    pub fn online_state(&self) -> OnlineState {
        self.state.lock().online_state
    }

    /// Number of listeners currently attached to `query`.
    pub fn listener_count(&self, query: &Query) -> usize {
        self.state
            .lock()
            .queries
            .get(query)
            .map_or(0, |info| info.listeners.len())
    }

    /// Number of queries with at least one listener.
    pub fn active_query_count(&self) -> usize {
        self.state.lock().queries.len()
    }

    pub fn target_id(&self, query: &Query) -> Option<TargetId> {
        self.state.lock().queries.get(query).map(|info| info.target_id)
    }

    /// Total `unlisten` calls received.
    pub fn unlisten_calls(&self) -> u64 {
        self.unlisten_calls.load(Ordering::Relaxed)
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

impl SyncEngine for EventManager {
    fn listen(&self, listener: Arc<QueryListener>) -> Result<TargetId, ListenError> {
        let query = listener.query().clone();
        if query.path().is_empty() {
            return Err(ListenError::new(
                ErrorCode::InvalidArgument,
                "cannot listen to an empty path",
            ));
        }

        let _delivery = self.delivery.lock();
        let (target_id, replay, online_state) = {
            let mut st = self.state.lock();
            let EventManagerState {
                queries,
                online_state,
                next_target_id,
            } = &mut *st;
            let info = match queries.entry(query.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let target_id = TargetId(*next_target_id);
                    *next_target_id = next_target_id.checked_add(1).ok_or_else(|| {
                        ListenError::new(ErrorCode::ResourceExhausted, "target ids exhausted")
                    })?;
                    tracing::debug!(query = query.path(), target = %target_id, "target allocated");
                    entry.insert(QueryListenersInfo {
                        target_id,
                        listeners: Vec::new(),
                        snapshot: None,
                    })
                }
            };
            info.listeners.push(Arc::clone(&listener));
            (info.target_id, info.snapshot.clone(), *online_state)
        };

        if online_state != OnlineState::Unknown {
            listener.on_online_state_change(online_state);
        }
        if let Some(snapshot) = replay {
            listener.on_view_change(Ok(snapshot));
        }
        Ok(target_id)
    }

    fn unlisten(&self, listener: &QueryListener) {
        self.unlisten_calls.fetch_add(1, Ordering::Relaxed);
        let mut st = self.state.lock();
        let query = listener.query();
        let Some(info) = st.queries.get_mut(query) else {
            return;
        };
        info.listeners.retain(|l| l.id() != listener.id());
        if info.listeners.is_empty() {
            let target_id = info.target_id;
            st.queries.remove(query);
            tracing::debug!(query = query.path(), target = %target_id, "target released");
        }
    }
}
