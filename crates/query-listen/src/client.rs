//! Client: owns the engine handle and every outstanding registration.
//!
//! # Threading model
//!
//! `Client` is a cheap `Clone` handle over `Arc<ClientInner>`. Registrations
//! only hold a `Weak<ClientInner>`, so they never keep the client alive.
//! When the last `Client` clone is dropped, or `terminate()` is called, every
//! outstanding registration is muted and removed.
//!
//! The `terminated` flag is flipped under the `listeners` lock, and `listen`
//! inserts under the same lock, so a registration is either visible to
//! `terminate()` or refused with `ClientError::Terminated`. An entry whose
//! `engine.listen` call has not returned yet is only detached by
//! `terminate()`; `listen` performs its one unlisten afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{
    engine::SyncEngine,
    error::{ClientError, ListenResult, Result},
    executor::{Executor, SerialExecutor},
    listener::{AsyncEventListener, CancelMode, EventListener, QueryListener},
    registration::ListenerRegistration,
    types::{ListenOptions, ListenerId, Query, ViewSnapshot},
};

const DEFAULT_EXECUTOR_NAME: &str = "query-listen-dispatch";

// ============================================================================
// Options
// ============================================================================

/// Configuration for [`Client`].
#[derive(Default)]
pub struct ClientOptions {
    /// Where callbacks run when no executor is given per listen call.
    /// `None` spawns a dedicated [`SerialExecutor`].
    pub executor: Option<Arc<dyn Executor>>,
    /// What `remove()` does to events already queued (default: Soft).
    pub cancel_mode: CancelMode,
}

// ============================================================================
// Internal state
// ============================================================================

struct ActiveListener {
    internal: Weak<QueryListener>,
    async_listener: Weak<AsyncEventListener<ViewSnapshot>>,
    /// Set once `engine.listen` has returned for this entry.
    listened: bool,
}

impl ActiveListener {
    fn is_live(&self) -> bool {
        self.internal
            .upgrade()
            .is_some_and(|listener| !listener.is_removed())
    }
}

pub(crate) struct ClientInner {
    engine: Arc<dyn SyncEngine>,
    executor: Arc<dyn Executor>,
    cancel_mode: CancelMode,
    listeners: Mutex<HashMap<ListenerId, ActiveListener>>,
    next_id: AtomicU64,
    terminated: AtomicBool,
}

impl ClientInner {
    fn add_listener(
        self: &Arc<Self>,
        query: Query,
        options: ListenOptions,
        listener: Arc<dyn EventListener<ViewSnapshot>>,
        executor: Arc<dyn Executor>,
    ) -> Result<ListenerRegistration> {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let async_listener = Arc::new(AsyncEventListener::new(executor, listener, self.cancel_mode));
        let sink: Arc<dyn EventListener<ViewSnapshot>> = async_listener.clone();
        let internal = Arc::new(QueryListener::new(
            id,
            query,
            options,
            sink,
            Arc::downgrade(&self.engine),
        ));

        {
            let mut listeners = self.listeners.lock();
            if self.terminated.load(Ordering::Acquire) {
                return Err(ClientError::Terminated);
            }
            listeners.retain(|_, entry| entry.is_live());
            listeners.insert(
                id,
                ActiveListener {
                    internal: Arc::downgrade(&internal),
                    async_listener: Arc::downgrade(&async_listener),
                    listened: false,
                },
            );
        }

        let target = match self.engine.listen(Arc::clone(&internal)) {
            Ok(target) => target,
            Err(error) => {
                self.forget(id);
                async_listener.mute();
                tracing::debug!(listener = %id, code = %error.code, "listen rejected by engine");
                return Err(error.into());
            }
        };

        // terminate() drained the entry while the engine call was in
        // flight; it only detached the listener, so the unlisten is ours.
        let drained = {
            let mut listeners = self.listeners.lock();
            match listeners.get_mut(&id) {
                Some(entry) => {
                    entry.listened = true;
                    false
                }
                None => self.terminated.load(Ordering::Acquire),
            }
        };
        if drained {
            self.engine.unlisten(&internal);
            tracing::debug!(listener = %id, "listen undone by terminate");
            return Err(ClientError::Terminated);
        }

        tracing::debug!(
            listener = %id,
            query = internal.query().path(),
            target = %target,
            "listener registered"
        );
        Ok(ListenerRegistration::new(
            Arc::downgrade(self),
            async_listener,
            internal,
        ))
    }

    /// Drop the table entry for `id`; the registration is already removed.
    pub(crate) fn forget(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }

    fn terminate(&self) {
        let drained: Vec<ActiveListener> = {
            let mut listeners = self.listeners.lock();
            if self.terminated.swap(true, Ordering::AcqRel) {
                return;
            }
            listeners.drain().map(|(_, entry)| entry).collect()
        };

        let mut removed = 0;
        for entry in drained {
            if let Some(async_listener) = entry.async_listener.upgrade() {
                async_listener.mute();
            }
            let Some(internal) = entry.internal.upgrade() else {
                continue;
            };
            let done = if entry.listened {
                internal.remove()
            } else {
                internal.detach()
            };
            if done {
                removed += 1;
            }
        }
        tracing::debug!(removed, "client terminated");
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.terminate();
    }
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client over `engine`.
    ///
    /// Fails only if the default dispatch thread cannot be spawned.
    pub fn new(engine: Arc<dyn SyncEngine>, options: ClientOptions) -> Result<Self> {
        let executor: Arc<dyn Executor> = match options.executor {
            Some(executor) => executor,
            None => Arc::new(SerialExecutor::new(DEFAULT_EXECUTOR_NAME)?),
        };
        Ok(Self {
            inner: Arc::new(ClientInner {
                engine,
                executor,
                cancel_mode: options.cancel_mode,
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                terminated: AtomicBool::new(false),
            }),
        })
    }

    /// Subscribe `callback` to `query`; callbacks run on the client's
    /// default executor.
    pub fn listen(
        &self,
        query: Query,
        options: ListenOptions,
        callback: impl Fn(ListenResult<ViewSnapshot>) + Send + Sync + 'static,
    ) -> Result<ListenerRegistration> {
        self.add_listener(query, options, Arc::new(callback), None)
    }

    /// Like [`listen`](Self::listen), with callbacks running on `executor`.
    pub fn listen_on(
        &self,
        executor: Arc<dyn Executor>,
        query: Query,
        options: ListenOptions,
        callback: impl Fn(ListenResult<ViewSnapshot>) + Send + Sync + 'static,
    ) -> Result<ListenerRegistration> {
        self.add_listener(query, options, Arc::new(callback), Some(executor))
    }

    /// General form: any [`EventListener`], optional executor override.
    pub fn add_listener(
        &self,
        query: Query,
        options: ListenOptions,
        listener: Arc<dyn EventListener<ViewSnapshot>>,
        executor: Option<Arc<dyn Executor>>,
    ) -> Result<ListenerRegistration> {
        let executor = executor.unwrap_or_else(|| Arc::clone(&self.inner.executor));
        self.inner.add_listener(query, options, listener, executor)
    }

    /// Remove every outstanding registration and refuse new ones.
    /// Idempotent.
    pub fn terminate(&self) {
        self.inner.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire)
    }

    /// Registrations that are neither removed nor failed.
    pub fn active_listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .values()
            .filter(|entry| entry.is_live())
            .count()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("terminated", &self.is_terminated())
            .field("cancel_mode", &self.inner.cancel_mode)
            .finish_non_exhaustive()
    }
}
