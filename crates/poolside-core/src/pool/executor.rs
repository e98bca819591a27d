use crate::{BoxError, Output, Task, WorkerId};

/// Runs tasks on behalf of the pool's workers.
///
/// An executor is shared by every worker and called from the worker's own
/// thread, one task at a time per worker. It must not touch pool state.
///
/// - Returning `Err` is a failed completion: the caller receives
///   [`Error::Execution`](crate::Error::Execution) and the worker stays
///   available.
/// - Panicking means the worker's execution context is no longer usable: the
///   caller receives [`Error::Execution`](crate::Error::Execution) and the
///   worker is retired according to the pool's
///   [`RestartPolicy`](crate::RestartPolicy).
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, worker_id: WorkerId, task: &Task) -> Result<Output, BoxError>;
}

impl<F> Executor for F
where
    F: Fn(WorkerId, &Task) -> Result<Output, BoxError> + Send + Sync + 'static,
{
    fn execute(&self, worker_id: WorkerId, task: &Task) -> Result<Output, BoxError> {
        self(worker_id, task)
    }
}
