//! Dispatch primitives: where user callbacks actually run.
//!
//! # Overview
//!
//! An [`Executor`] accepts boxed tasks and runs them one at a time, in
//! submission order, on an execution context chosen by the application.
//! Listener callbacks never run on the sync engine's thread: the engine
//! hands each event to an executor and returns immediately.
//!
//! # Modules
//!
//! - [`serial`]: [`SerialExecutor`], a dedicated OS thread.
//! - [`runtime`]: [`TokioExecutor`], a single task on a tokio runtime.

pub mod runtime;
pub mod serial;

use std::panic::AssertUnwindSafe;

pub use runtime::TokioExecutor;
pub use serial::SerialExecutor;

/// A unit of work submitted to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Enqueue-for-execution primitive with FIFO ordering.
///
/// Implementations must run tasks one at a time in the order `execute` was
/// called, and `execute` must not block waiting for earlier tasks.
pub trait Executor: Send + Sync {
    /// Enqueue `task`. Tasks submitted after the executor shut down are
    /// dropped without running.
    fn execute(&self, task: Task);

    /// Whether the calling thread is currently running one of this
    /// executor's tasks.
    fn is_current(&self) -> bool {
        false
    }
}

/// Run `task`, containing any panic so the draining loop survives.
pub(crate) fn run_guarded(executor: &str, task: Task) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(task)) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::warn!(executor, %reason, "listener task panicked");
    }
}
