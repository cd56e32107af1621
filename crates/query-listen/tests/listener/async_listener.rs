//! Tests for `AsyncEventListener<T>`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use query_listen::error::{ErrorCode, ListenError, ListenResult};
use query_listen::executor::{Executor, SerialExecutor, Task};
use query_listen::listener::{AsyncEventListener, CancelMode, EventListener};

// ============================================================================
// Helpers
// ============================================================================

/// Queues tasks until the test runs them explicitly.
#[derive(Default)]
struct ManualExecutor {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualExecutor {
    fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.queue.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, task: Task) {
        self.queue.lock().push_back(task);
    }
}

type Log = Arc<Mutex<Vec<ListenResult<u32>>>>;

fn make_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn recorder(log: &Log) -> Arc<dyn EventListener<u32>> {
    let log = Arc::clone(log);
    Arc::new(move |event: ListenResult<u32>| log.lock().push(event))
}

fn values(log: &Log) -> Vec<u32> {
    log.lock().iter().filter_map(|e| e.as_ref().ok().copied()).collect()
}

fn manual_listener(mode: CancelMode) -> (Arc<ManualExecutor>, AsyncEventListener<u32>, Log) {
    let executor = Arc::new(ManualExecutor::default());
    let log = make_log();
    let listener = AsyncEventListener::new(executor.clone(), recorder(&log), mode);
    (executor, listener, log)
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn dispatch_does_not_run_callback_inline() {
    let (executor, listener, log) = manual_listener(CancelMode::Soft);

    assert!(listener.dispatch(Ok(1)));

    assert!(log.lock().is_empty(), "callback must wait for the executor");
    assert_eq!(executor.pending(), 1);
}

#[test]
fn dispatch_preserves_submission_order() {
    let (executor, listener, log) = manual_listener(CancelMode::Soft);

    for i in 0..5 {
        listener.dispatch(Ok(i));
    }
    executor.run_all();

    assert_eq!(values(&log), vec![0, 1, 2, 3, 4]);
    assert_eq!(listener.dispatched_count(), 5);
}

#[test]
fn errors_pass_through_unchanged() {
    let (executor, listener, log) = manual_listener(CancelMode::Soft);
    let error = ListenError::new(ErrorCode::Unavailable, "backend unreachable");

    listener.dispatch(Err(error.clone()));
    executor.run_all();

    assert_eq!(*log.lock(), vec![Err(error)]);
}

#[test]
fn on_event_is_dispatch() {
    let (executor, listener, log) = manual_listener(CancelMode::Soft);

    listener.on_event(Ok(9));
    assert!(log.lock().is_empty());
    executor.run_all();

    assert_eq!(values(&log), vec![9]);
}

// ============================================================================
// Muting
// ============================================================================

#[test]
fn mute_drops_events_not_yet_enqueued() {
    let (executor, listener, log) = manual_listener(CancelMode::Soft);

    listener.mute();
    assert!(!listener.dispatch(Ok(1)), "dispatch after mute must report a drop");
    executor.run_all();

    assert!(log.lock().is_empty());
    assert_eq!(listener.dispatched_count(), 0);
}

#[test]
fn soft_mute_still_runs_queued_events() {
    let (executor, listener, log) = manual_listener(CancelMode::Soft);

    listener.dispatch(Ok(1));
    listener.dispatch(Ok(2));
    listener.mute();
    listener.dispatch(Ok(3));
    executor.run_all();

    assert_eq!(values(&log), vec![1, 2]);
}

#[test]
fn hard_mute_discards_queued_events() {
    let (executor, listener, log) = manual_listener(CancelMode::Hard);

    listener.dispatch(Ok(1));
    executor.run_all();
    listener.dispatch(Ok(2));
    listener.mute();
    executor.run_all();

    assert_eq!(values(&log), vec![1], "event queued before a hard mute must not run");
}

#[test]
fn mute_reports_first_call_only() {
    let (_executor, listener, _log) = manual_listener(CancelMode::Soft);

    assert!(!listener.is_muted());
    assert!(listener.mute());
    assert!(!listener.mute());
    assert!(listener.is_muted());
}

#[test]
fn default_mode_is_soft() {
    assert_eq!(CancelMode::default(), CancelMode::Soft);
    let (_executor, listener, _log) = manual_listener(CancelMode::default());
    assert_eq!(listener.mode(), CancelMode::Soft);
}

// ============================================================================
// With a real executor
// ============================================================================

#[test]
fn serial_executor_delivers_many_events_in_order() {
    let executor = Arc::new(SerialExecutor::new("async-listener-order").expect("spawn executor"));
    let log = make_log();
    let listener = AsyncEventListener::new(executor.clone(), recorder(&log), CancelMode::Soft);

    for i in 0..1_000 {
        listener.dispatch(Ok(i));
    }
    executor.wait_idle();

    let expected: Vec<u32> = (0..1_000).collect();
    assert_eq!(values(&log), expected);
}

#[test]
fn callback_runs_off_the_dispatching_thread() {
    let executor = Arc::new(SerialExecutor::new("async-listener-thread").expect("spawn executor"));
    let seen = Arc::new(Mutex::new(None));
    let seen_clone = Arc::clone(&seen);
    let delegate: Arc<dyn EventListener<u32>> = Arc::new(move |_event: ListenResult<u32>| {
        *seen_clone.lock() = Some(thread::current().id());
    });
    let listener = AsyncEventListener::new(executor.clone(), delegate, CancelMode::Soft);

    listener.dispatch(Ok(1));
    executor.wait_idle();

    let callback_thread = *seen.lock();
    let callback_thread = callback_thread.expect("callback should have run");
    assert_ne!(callback_thread, thread::current().id());
}

#[test]
fn concurrent_mute_never_lets_later_dispatches_through() {
    let executor = Arc::new(SerialExecutor::new("async-listener-race").expect("spawn executor"));
    let log = make_log();
    let listener = Arc::new(AsyncEventListener::new(
        executor.clone(),
        recorder(&log),
        CancelMode::Soft,
    ));

    let producer = {
        let listener = Arc::clone(&listener);
        thread::spawn(move || {
            let mut accepted = Vec::new();
            for i in 0..10_000 {
                if listener.dispatch(Ok(i)) {
                    accepted.push(i);
                }
            }
            accepted
        })
    };
    thread::yield_now();
    listener.mute();
    let accepted = producer.join().expect("producer thread");
    executor.wait_idle();

    // Soft mode: exactly the accepted prefix is delivered, in order.
    assert_eq!(values(&log), accepted);
    let expected_prefix: Vec<u32> = (0..accepted.len() as u32).collect();
    assert_eq!(accepted, expected_prefix, "accepted events must form a prefix");
}
