use super::manager::Shared;
use crate::{Error, Operation, Output, Result, TaskId};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use pin_project_lite::pin_project;
use std::sync::Weak;
use tokio::sync::oneshot;

pin_project! {
    /// A pending result returned by [`WorkerPool::submit`].
    ///
    /// Resolves exactly once, with the task's [`Output`] or the [`Error`] that
    /// ended it. Dropping the handle before it resolves cancels the task: a
    /// queued task is removed from the queue, a running task finishes on its
    /// worker and its result is discarded.
    ///
    /// [`WorkerPool::submit`]: crate::WorkerPool::submit
    #[must_use = "dropping a TaskHandle cancels the task"]
    pub struct TaskHandle {
        task_id: TaskId,
        operation: Operation,
        #[pin]
        rx: oneshot::Receiver<Result<Output>>,
        pool: Weak<Shared>,
        resolved: bool,
    }

    impl PinnedDrop for TaskHandle {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if !*this.resolved {
                if let Some(pool) = this.pool.upgrade() {
                    pool.cancel(*this.task_id);
                }
            }
        }
    }
}

impl TaskHandle {
    pub(crate) fn new(
        task_id: TaskId,
        operation: Operation,
        rx: oneshot::Receiver<Result<Output>>,
        pool: Weak<Shared>,
    ) -> Self {
        Self {
            task_id,
            operation,
            rx,
            pool,
            resolved: false,
        }
    }

    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Cancels the task. Equivalent to dropping the handle.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Future for TaskHandle {
    type Output = Result<Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.rx.poll(cx) {
            Poll::Ready(received) => {
                *this.resolved = true;
                // The sender is only dropped unsent when the pool goes away.
                Poll::Ready(received.unwrap_or_else(|_| Err(Error::Cancelled)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
