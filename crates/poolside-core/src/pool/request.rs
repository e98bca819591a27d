use crate::Task;
use tokio::sync::oneshot;

/// A message sent from the pool to an individual worker thread.
///
/// The pool only sends [`WorkRequest::Run`] to a worker it has just marked
/// `Busy`, so a worker never has more than one task waiting in its channel.
#[derive(Debug)]
pub enum WorkRequest {
    /// Execute `task` and report back through the pool.
    Run { task: Task },

    /// Request the worker to stop.
    ///
    /// - `response`: One-shot channel acknowledging that the worker has left
    ///   its loop.
    Shutdown { response: oneshot::Sender<()> },
}
