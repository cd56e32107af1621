//! ListenerRegistration: the handle returned by `Client::listen`.

use std::sync::{Arc, Weak};

use crate::client::ClientInner;
use crate::listener::{AsyncEventListener, QueryListener};
use crate::types::ViewSnapshot;

/// Represents one active subscription. Call [`remove`](Self::remove) to
/// stop it.
///
/// Dropping the handle does **not** stop the listener; the engine keeps it
/// alive until `remove()` is called or the client terminates.
#[must_use = "dropping a ListenerRegistration does not stop the listener; call remove()"]
pub struct ListenerRegistration {
    /// Liveness check only; never extends the client's lifetime.
    client: Weak<ClientInner>,
    async_listener: Arc<AsyncEventListener<ViewSnapshot>>,
    internal: Arc<QueryListener>,
}

impl ListenerRegistration {
    pub(crate) fn new(
        client: Weak<ClientInner>,
        async_listener: Arc<AsyncEventListener<ViewSnapshot>>,
        internal: Arc<QueryListener>,
    ) -> Self {
        Self {
            client,
            async_listener,
            internal,
        }
    }

    /// Stop the subscription.
    ///
    /// After this returns no event that has not already been queued reaches
    /// the callback; with `CancelMode::Hard`, queued events are discarded
    /// too. Safe to call any number of times, from any thread, including
    /// after the client terminated or the listener failed.
    pub fn remove(&self) {
        let muted = self.async_listener.mute();
        let removed = self.internal.remove();
        if let Some(client) = self.client.upgrade() {
            client.forget(self.internal.id());
        }
        if muted || removed {
            tracing::debug!(listener = %self.internal.id(), "registration removed");
        }
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("listener", &self.internal.id())
            .field("query", self.internal.query())
            .field("state", &self.internal.state())
            .finish_non_exhaustive()
    }
}
