//! Error types for the worker pool.
//!
//! This module defines the central `Error` enum, which captures every outcome
//! other than a successful [`Output`](crate::Output) that a submitter can
//! observe. Each variant maps to a stable [`Error::outcome`] label used for
//! logging and metrics.
//!
//! ## Error Cases
//! - `PoolSaturated`: No worker is idle and the queue is at capacity.
//! - `Execution`: The executor failed or the worker crashed mid-task.
//! - `ExecutionTimeout`: The task outlived the watchdog and its worker was
//!   written off.
//! - `WorkerStartup`: A worker thread (or the watchdog runtime) could not be
//!   started.
//! - `NoLiveWorkers`: Every worker is dead and the restart policy does not
//!   replace them.
//! - `Cancelled`: The task was cancelled before a result could be delivered.
//! - `ServiceShutdown`: The pool no longer accepts work.

use core::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

/// Boxed error returned by an [`Executor`](crate::Executor).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for the worker pool.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// All workers are busy and the pending queue is full.
    #[error("Pool saturated: queue is at capacity ({capacity})")]
    PoolSaturated { capacity: usize },

    /// The task failed on its worker, or the worker crashed while running it.
    #[error("Execution error on worker {worker_id}: {reason}")]
    Execution { worker_id: usize, reason: String },

    /// The task exceeded the per-task time budget.
    #[error("Execution timed out on worker {worker_id} after {timeout:?}")]
    ExecutionTimeout { worker_id: usize, timeout: Duration },

    /// A worker could not be started.
    #[error("Worker startup failure: {context}")]
    WorkerStartup { context: String },

    /// No worker is alive to run the task.
    #[error("No live workers available")]
    NoLiveWorkers,

    /// The task was cancelled before completion.
    #[error("Task cancelled")]
    Cancelled,

    /// The pool is shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Short, stable label describing this outcome.
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::PoolSaturated { .. } => "saturated",
            Self::Execution { .. } => "execution_error",
            Self::ExecutionTimeout { .. } => "timeout",
            Self::WorkerStartup { .. } => "startup_failure",
            Self::NoLiveWorkers => "no_live_workers",
            Self::Cancelled => "cancelled",
            Self::ServiceShutdown => "shutdown",
        }
    }

    /// Whether the caller may reasonably retry the same submission later.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolSaturated { .. } | Self::NoLiveWorkers | Self::Cancelled
        )
    }
}
