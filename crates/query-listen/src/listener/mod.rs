//! Listener layer: the core listener and the async dispatch adapter.
//!
//! # Overview
//!
//! Events flow `SyncEngine` → [`QueryListener`] → [`AsyncEventListener`] →
//! user callback. The query listener decides *whether* an event is raised
//! and owns the Active → Removed state machine; the async listener decides
//! *where* the callback runs.
//!
//! # Modules
//!
//! - [`query_listener`]: [`QueryListener`] and [`ListenerState`].
//! - [`async_listener`]: [`AsyncEventListener<T>`] and [`CancelMode`].

pub mod async_listener;
pub mod query_listener;

pub use async_listener::{AsyncEventListener, CancelMode};
pub use query_listener::{ListenerState, QueryListener};

use crate::error::ListenResult;

/// Receiver of listener events.
///
/// Implemented for any `Fn(ListenResult<T>) + Send + Sync` closure, so
/// plain closures can be passed wherever a listener is expected.
pub trait EventListener<T>: Send + Sync {
    fn on_event(&self, event: ListenResult<T>);
}

impl<T, F> EventListener<T> for F
where
    F: Fn(ListenResult<T>) + Send + Sync,
{
    fn on_event(&self, event: ListenResult<T>) {
        self(event)
    }
}
