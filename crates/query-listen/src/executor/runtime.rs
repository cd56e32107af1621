//! TokioExecutor: an ordered task queue drained by one task on a tokio
//! runtime.
//!
//! Callbacks run inline on a runtime worker, so they should be short and
//! must not block. For blocking callbacks use `SerialExecutor`.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use super::{run_guarded, Executor, Task};

static NEXT_EXECUTOR_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the `TokioExecutor` whose task is running on this thread, or 0.
    static RUNNING: Cell<u64> = const { Cell::new(0) };
}

pub struct TokioExecutor {
    id: u64,
    sender: mpsc::UnboundedSender<Task>,
}

impl TokioExecutor {
    /// Spawn the draining task on `handle`.
    pub fn new(handle: &Handle) -> Self {
        let id = NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();

        handle.spawn(async move {
            let label = format!("tokio-executor-{id}");
            while let Some(task) = receiver.recv().await {
                RUNNING.with(|r| r.set(id));
                run_guarded(&label, task);
                RUNNING.with(|r| r.set(0));
            }
            tracing::debug!(executor = %label, "tokio executor drained");
        });

        Self { id, sender }
    }

    /// Spawn on the runtime of the calling context.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(&Handle::current())
    }

    /// Resolve once every task enqueued before this call has run.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel::<()>();
        self.execute(Box::new(move || {
            let _ = tx.send(());
        }));
        let _ = rx.await;
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        if self.sender.send(task).is_err() {
            tracing::debug!(executor = self.id, "executor shut down; task dropped");
        }
    }

    fn is_current(&self) -> bool {
        RUNNING.with(|r| r.get() == self.id)
    }
}
