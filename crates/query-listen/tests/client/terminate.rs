//! Tests for client termination.

use std::sync::Arc;

use parking_lot::Mutex;

use query_listen::engine::{EventManager, SyncEngine};
use query_listen::error::{ErrorCode, ListenError};
use query_listen::listener::QueryListener;
use query_listen::types::{ListenOptions, Query, TargetId};
use query_listen::{Client, ClientError, ClientOptions};

use super::support::{Fixture, Recorder};

#[test]
fn terminate_removes_every_registration() {
    let fixture = Fixture::new();
    let recorder = Recorder::default();
    let _a = fixture
        .client
        .listen(Query::new("rooms"), ListenOptions::default(), recorder.callback())
        .expect("listen");
    let _b = fixture
        .client
        .listen(Query::new("users"), ListenOptions::default(), recorder.callback())
        .expect("listen");
    assert_eq!(fixture.client.active_listener_count(), 2);

    fixture.client.terminate();

    assert!(fixture.client.is_terminated());
    assert_eq!(fixture.client.active_listener_count(), 0);
    assert_eq!(fixture.manager.active_query_count(), 0);
    assert_eq!(fixture.push("rooms", 1), 0);
    fixture.settle();
    assert_eq!(recorder.len(), 0);
}

#[test]
fn listen_after_terminate_fails() {
    let fixture = Fixture::new();
    fixture.client.terminate();

    let result = fixture.client.listen(
        Query::new("rooms"),
        ListenOptions::default(),
        Recorder::default().callback(),
    );

    assert!(matches!(result, Err(ClientError::Terminated)));
    assert_eq!(fixture.manager.active_query_count(), 0);
}

#[test]
fn terminate_is_idempotent() {
    let fixture = Fixture::new();
    let registration = fixture
        .client
        .listen(Query::new("rooms"), ListenOptions::default(), Recorder::default().callback())
        .expect("listen");

    fixture.client.terminate();
    fixture.client.terminate();
    registration.remove();

    assert_eq!(fixture.manager.unlisten_calls(), 1);
}

#[test]
fn dropping_the_last_clone_terminates() {
    let manager = Arc::new(EventManager::new());
    let client = Client::new(manager.clone(), ClientOptions::default()).expect("client");
    let clone = client.clone();
    let _registration = client
        .listen(Query::new("rooms"), ListenOptions::default(), Recorder::default().callback())
        .expect("listen");

    drop(client);
    assert_eq!(manager.active_query_count(), 1, "a clone is still alive");

    drop(clone);
    assert_eq!(manager.active_query_count(), 0);
    assert_eq!(manager.unlisten_calls(), 1);
}

#[test]
fn engine_rejection_leaves_no_registration() {
    let fixture = Fixture::new();

    let result = fixture.client.listen(
        Query::new(""),
        ListenOptions::default(),
        Recorder::default().callback(),
    );

    match result {
        Err(ClientError::Listen(error)) => assert_eq!(error.code, ErrorCode::InvalidArgument),
        other => panic!("expected a listen error, got {other:?}"),
    }
    assert_eq!(fixture.client.active_listener_count(), 0);
}

#[test]
fn terminated_error_message() {
    assert_eq!(ClientError::Terminated.to_string(), "Client has been terminated");
}

/// Engine that terminates its client from inside `listen`, before handing
/// the listener to an `EventManager`.
struct TerminatingEngine {
    manager: Arc<EventManager>,
    client: Mutex<Option<Client>>,
}

impl SyncEngine for TerminatingEngine {
    fn listen(&self, listener: Arc<QueryListener>) -> Result<TargetId, ListenError> {
        let client = self.client.lock().take();
        if let Some(client) = client {
            client.terminate();
        }
        self.manager.listen(listener)
    }

    fn unlisten(&self, listener: &QueryListener) {
        self.manager.unlisten(listener);
    }
}

#[test]
fn terminate_during_listen_unlistens_once() {
    let manager = Arc::new(EventManager::new());
    let engine = Arc::new(TerminatingEngine {
        manager: Arc::clone(&manager),
        client: Mutex::new(None),
    });
    let client = Client::new(engine.clone(), ClientOptions::default()).expect("client");
    *engine.client.lock() = Some(client.clone());

    let result = client.listen(
        Query::new("rooms"),
        ListenOptions::default(),
        Recorder::default().callback(),
    );

    assert!(matches!(result, Err(ClientError::Terminated)));
    assert!(client.is_terminated());
    assert_eq!(manager.unlisten_calls(), 1);
    assert_eq!(manager.active_query_count(), 0);
    assert_eq!(client.active_listener_count(), 0);
}
