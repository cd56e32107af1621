//! Sync engine seam.
//!
//! The query execution / sync engine is an external collaborator. This
//! crate only needs two operations from it, captured by [`SyncEngine`].
//! [`EventManager`] is an in-process implementation that fans snapshots out
//! to listeners grouped by query.

pub mod event_manager;

use std::sync::Arc;

use crate::error::ListenError;
use crate::listener::QueryListener;
use crate::types::TargetId;

pub use event_manager::EventManager;

/// Narrow interface the listener layer consumes from the sync engine.
///
/// The engine keeps its own `Arc` to every listened `QueryListener` until
/// `unlisten` is called or it delivers a terminal error, and must deliver
/// events to a given listener one at a time.
pub trait SyncEngine: Send + Sync {
    /// Start delivering view changes for `listener.query()` to `listener`.
    fn listen(&self, listener: Arc<QueryListener>) -> Result<TargetId, ListenError>;

    /// Stop delivering to `listener` and release the engine's reference.
    fn unlisten(&self, listener: &QueryListener);
}
