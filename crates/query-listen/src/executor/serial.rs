//! SerialExecutor: a dedicated OS thread draining an ordered task queue.
//!
//! The queue is an unbounded `tokio::sync::mpsc` channel: `execute` is a
//! lock-free send and never blocks the producer. The worker thread exits
//! once every sender is gone and the queue is drained, so tasks enqueued
//! before the executor is dropped still run.

use std::thread::{self, ThreadId};

use tokio::sync::{mpsc, oneshot};

use super::{run_guarded, Executor, Task};

pub struct SerialExecutor {
    name: String,
    sender: mpsc::UnboundedSender<Task>,
    worker: ThreadId,
}

impl SerialExecutor {
    /// Spawn the worker thread, named `name`.
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let name: String = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();

        let label = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            while let Some(task) = receiver.blocking_recv() {
                run_guarded(&label, task);
            }
            tracing::debug!(executor = %label, "serial executor drained");
        })?;

        Ok(Self {
            name,
            sender,
            worker: handle.thread().id(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until every task enqueued before this call has run.
    ///
    /// Returns immediately when called from the worker thread itself.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context
    /// (blocking receive inside a tokio runtime).
    pub fn wait_idle(&self) {
        if self.is_current() {
            return;
        }
        let (tx, rx) = oneshot::channel::<()>();
        self.execute(Box::new(move || {
            let _ = tx.send(());
        }));
        // A closed queue drops the barrier task; the receive then errors out.
        let _ = rx.blocking_recv();
    }
}

impl Executor for SerialExecutor {
    fn execute(&self, task: Task) {
        if self.sender.send(task).is_err() {
            tracing::debug!(executor = %self.name, "executor shut down; task dropped");
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.worker
    }
}

impl std::fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialExecutor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
