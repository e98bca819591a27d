use super::{
    manager::{Completion, Shared},
    request::WorkRequest,
};
use crate::{Executor, WorkerId};
use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Weak},
    thread,
};
use tokio::sync::mpsc;

/// Starts a worker thread for `slot` and returns the channel feeding it.
pub(crate) fn spawn(
    slot: usize,
    worker_id: WorkerId,
    pool: Weak<Shared>,
    executor: Arc<dyn Executor>,
) -> io::Result<mpsc::UnboundedSender<WorkRequest>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name(format!("poolside-worker-{worker_id}"))
        .spawn(move || worker_loop(worker_id, slot, rx, pool, executor))?;
    Ok(tx)
}

/// Worker thread responsible for processing [`WorkRequest`] messages.
///
/// Each worker runs on its own OS thread so that CPU-bound tasks never stall
/// the async runtime. The worker blocks on its channel, runs one task at a
/// time through the shared [`Executor`], and reports every completion back to
/// the pool, which decides whether the worker keeps going.
///
/// The loop ends when:
///
/// - the pool declares the worker dead (crash or watchdog timeout),
/// - a [`WorkRequest::Shutdown`] arrives,
/// - the pool drops the sending half of the channel, or the pool itself is
///   gone.
///
/// # Arguments
///
/// - `worker_id`: Identifier of this worker (used in logs and task output).
/// - `slot`: Index of the pool slot this worker occupies.
/// - `rx`: Receiver through which [`WorkRequest`]s are received.
/// - `pool`: Weak reference back to the pool for completion reports.
/// - `executor`: Runs the task bodies.
pub(crate) fn worker_loop(
    worker_id: WorkerId,
    slot: usize,
    mut rx: mpsc::UnboundedReceiver<WorkRequest>,
    pool: Weak<Shared>,
    executor: Arc<dyn Executor>,
) {
    tracing::trace!("Worker {worker_id} started in slot {slot}");

    while let Some(work) = rx.blocking_recv() {
        match work {
            WorkRequest::Run { task } => {
                let task_id = task.id();
                tracing::trace!(
                    task_id,
                    operation = %task.operation(),
                    queued_for = ?task.submitted_at().elapsed(),
                    "Worker {worker_id} claimed task"
                );

                let completion =
                    match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(worker_id, &task)))
                    {
                        Ok(result) => Completion::Finished(result),
                        Err(payload) => Completion::Crashed(panic_message(payload.as_ref())),
                    };

                let Some(pool) = pool.upgrade() else {
                    break;
                };
                if !pool.complete(slot, worker_id, task_id, completion) {
                    break;
                }
            }
            WorkRequest::Shutdown { response } => {
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
