//! AsyncEventListener<T>: marshals events onto an executor before they
//! reach the user callback.
//!
//! # Cancellation boundary
//!
//! `dispatch` and `mute` are serialized by a short guard, so every event is
//! either enqueued before `mute()` returns or never enqueued at all. What
//! happens to events that were enqueued but have not run yet depends on
//! [`CancelMode`]:
//!   - `Soft` (default): they still run.
//!   - `Hard`: they are discarded when they reach the front of the queue.
//!
//! A callback that is already running always finishes; `mute()` never
//! waits for it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ListenResult;
use crate::executor::Executor;

use super::EventListener;

/// What `mute()` does to events already sitting in the executor's queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelMode {
    /// Queued events still run; only events not yet enqueued are dropped.
    #[default]
    Soft,
    /// Queued events are discarded too.
    Hard,
}

pub struct AsyncEventListener<T> {
    executor: Arc<dyn Executor>,
    delegate: Arc<dyn EventListener<T>>,
    mode: CancelMode,
    /// Read by queued tasks in `Hard` mode, hence shared.
    muted: Arc<AtomicBool>,
    /// Serializes the muted check + enqueue against `mute()`.
    gate: Mutex<()>,
    dispatched: AtomicU64,
}

impl<T: Send + 'static> AsyncEventListener<T> {
    pub fn new(
        executor: Arc<dyn Executor>,
        delegate: Arc<dyn EventListener<T>>,
        mode: CancelMode,
    ) -> Self {
        Self {
            executor,
            delegate,
            mode,
            muted: Arc::new(AtomicBool::new(false)),
            gate: Mutex::new(()),
            dispatched: AtomicU64::new(0),
        }
    }

    /// Enqueue `event` for delivery on the executor. Never blocks on the
    /// callback.
    ///
    /// Returns `false` if the listener is muted and the event was dropped.
    pub fn dispatch(&self, event: ListenResult<T>) -> bool {
        let _gate = self.gate.lock();
        if self.muted.load(Ordering::Acquire) {
            tracing::trace!("listener muted; event dropped");
            return false;
        }

        let delegate = Arc::clone(&self.delegate);
        let muted = Arc::clone(&self.muted);
        let hard = self.mode == CancelMode::Hard;
        self.executor.execute(Box::new(move || {
            if hard && muted.load(Ordering::Acquire) {
                tracing::trace!("listener muted before delivery; queued event discarded");
                return;
            }
            delegate.on_event(event);
        }));
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Stop dispatching. Returns `true` on the first call only.
    pub fn mute(&self) -> bool {
        let _gate = self.gate.lock();
        !self.muted.swap(true, Ordering::AcqRel)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    pub fn mode(&self) -> CancelMode {
        self.mode
    }

    /// Number of events handed to the executor so far.
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl<T: Send + 'static> EventListener<T> for AsyncEventListener<T> {
    fn on_event(&self, event: ListenResult<T>) {
        self.dispatch(event);
    }
}
