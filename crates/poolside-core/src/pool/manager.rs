//! Fixed-size worker pool with a bounded FIFO queue.
//!
//! This module defines the [`WorkerPool`] struct, which owns N worker threads,
//! the queue of tasks waiting for a worker, and the table of tasks currently
//! running. All three live behind a single [`Mutex`], so submission, worker
//! state transitions and queue mutation are serialized with respect to each
//! other and never observed half-done.
//!
//! ## Dispatch
//!
//! - `submit` hands the task to an idle worker directly when there is one.
//! - Otherwise the task is appended to the queue, or rejected with
//!   [`Error::PoolSaturated`] when the queue is at capacity.
//! - Whenever a worker becomes idle it is immediately given the head of the
//!   queue, so queued tasks start in submission order.
//!
//! ## Failure handling
//!
//! Every assignment arms a watchdog on the tokio runtime the pool was created
//! in. A task that outlives [`PoolConfig::task_timeout`] resolves with
//! [`Error::ExecutionTimeout`] and its worker is declared dead; a worker whose
//! executor panics is declared dead as well. Dead workers are replaced
//! according to the configured [`RestartPolicy`].

use super::{
    config::{PoolConfig, RestartPolicy},
    executor::Executor,
    handle::TaskHandle,
    request::WorkRequest,
    worker,
};
use crate::{
    BoxError, Error, Operation, Output, PoolStats, Result, Task, TaskId, WorkerId, WorkerStatus,
};
use core::time::Duration;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    task::AbortHandle,
    time::{sleep, timeout},
};

type Reply = oneshot::Sender<Result<Output>>;

/// How a worker finished a task.
pub(crate) enum Completion {
    /// The executor returned, successfully or not.
    Finished(core::result::Result<Output, BoxError>),
    /// The executor panicked; carries the panic message.
    Crashed(String),
}

/// A pool of worker threads executing [`Operation`]s submitted by callers.
///
/// The pool is constructed once, shared by reference (usually behind an
/// [`Arc`]), and torn down with [`WorkerPool::shutdown`]. Dropping the pool
/// performs the synchronous part of the shutdown: new work is refused, queued
/// and in-flight tasks are cancelled, and idle workers exit.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    config: PoolConfig,
    executor: Arc<dyn Executor>,
    runtime: Handle,
    state: Mutex<State>,
}

struct State {
    /// One entry per slot. `None` until a worker has been started there.
    slots: Vec<Option<WorkerEntry>>,
    queue: VecDeque<Pending>,
    in_flight: HashMap<TaskId, InFlight>,
    next_task_id: TaskId,
    next_worker_id: WorkerId,
    accepting: bool,
}

struct WorkerEntry {
    id: WorkerId,
    status: WorkerStatus,
    /// Dropped once the worker is dead or shutting down.
    tx: Option<mpsc::UnboundedSender<WorkRequest>>,
}

struct Pending {
    task: Task,
    reply: Reply,
}

struct InFlight {
    slot: usize,
    /// `None` once the submitter has cancelled.
    reply: Option<Reply>,
    watchdog: AbortHandle,
}

impl WorkerPool {
    /// Starts a pool running tasks through `executor`.
    ///
    /// Must be called from within a tokio runtime; the runtime drives the
    /// per-task watchdogs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerStartup`] if the pool size is zero, no tokio
    /// runtime is available, or fewer than `min_workers` worker threads could
    /// be started.
    pub fn new<E: Executor>(config: PoolConfig, executor: E) -> Result<Self> {
        Self::with_executor(config, Arc::new(executor))
    }

    /// Like [`WorkerPool::new`], for an executor that is already shared.
    pub fn with_executor(config: PoolConfig, executor: Arc<dyn Executor>) -> Result<Self> {
        if config.size == 0 {
            return Err(Error::WorkerStartup {
                context: "pool size must be greater than 0".to_string(),
            });
        }

        let runtime = Handle::try_current().map_err(|e| Error::WorkerStartup {
            context: format!("no tokio runtime available for the watchdog: {e}"),
        })?;

        let size = config.size;
        let shared = Arc::new(Shared {
            config,
            executor,
            runtime,
            state: Mutex::new(State {
                slots: (0..size).map(|_| None).collect(),
                queue: VecDeque::new(),
                in_flight: HashMap::new(),
                next_task_id: 0,
                next_worker_id: 0,
                accepting: true,
            }),
        });

        let started = {
            let mut state = shared.state.lock();
            (0..size)
                .filter(|&slot| shared.spawn_into(&mut state, slot))
                .count()
        };

        let required = shared.config.min_workers.clamp(1, size);
        if started < required {
            shared.close();
            return Err(Error::WorkerStartup {
                context: format!("only {started} of {size} workers started (minimum {required})"),
            });
        }

        if started < size {
            tracing::warn!("Worker pool degraded: {started} of {size} workers running");
        }
        tracing::info!(
            "Worker pool started with {started} workers (queue capacity: {:?}, restart policy: {})",
            shared.config.queue_capacity,
            shared.config.restart_policy
        );

        Ok(Self { shared })
    }

    /// Submits `operation` for execution and returns a handle to its result.
    ///
    /// Never blocks: the task is either handed to an idle worker, queued, or
    /// rejected.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolSaturated`] if no worker is idle and the queue is full.
    /// - [`Error::NoLiveWorkers`] if every worker is dead and none can be
    ///   started.
    /// - [`Error::ServiceShutdown`] once shutdown has begun.
    pub fn submit(&self, operation: Operation) -> Result<TaskHandle> {
        self.shared.submit(operation)
    }

    /// Returns a consistent snapshot of worker and queue state.
    pub fn stats(&self) -> PoolStats {
        self.shared.state.lock().stats()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Whether the pool still accepts submissions.
    pub fn is_accepting(&self) -> bool {
        self.shared.state.lock().accepting
    }

    /// Gracefully shuts down the pool.
    ///
    /// - Stops accepting new tasks.
    /// - Waits up to [`PoolConfig::shutdown_timeout`] for queued and running
    ///   tasks to finish.
    /// - Cancels whatever is left ([`Error::Cancelled`]).
    /// - Sends a shutdown request to each live worker and waits (up
    ///   to 3 seconds per worker) for acknowledgements.
    ///
    /// Calling it more than once is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        // === Phase 0: Stop accepting new tasks ===
        tracing::info!("Refusing new tasks");
        self.shared.state.lock().accepting = false;

        // === Phase 1: Let queued and running tasks drain ===
        let pending = self.stats();
        tracing::info!(
            "Draining {} queued and {} running tasks",
            pending.queued,
            pending.in_flight
        );
        let drain_result = timeout(self.shared.config.shutdown_timeout, async {
            while !self.shared.is_drained() {
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => tracing::debug!("All tasks drained successfully"),
            Err(_) => {
                let left = self.stats();
                tracing::warn!(
                    "Graceful drain timed out ({} queued, {} running)",
                    left.queued,
                    left.in_flight
                );
            }
        }

        // === Phase 2: Cancel any remaining work ===
        let cancelled = self.shared.close();
        if cancelled > 0 {
            tracing::warn!("Cancelled {cancelled} unfinished tasks");
        }

        // === Phase 3: Notify workers to shut down ===
        tracing::debug!("Notifying all workers to shut down");
        let shutdown_handles: Vec<_> = {
            let mut state = self.shared.state.lock();
            state
                .slots
                .iter_mut()
                .flatten()
                .filter_map(|entry| {
                    let tx = entry.tx.take()?;
                    let (response, rx) = oneshot::channel();
                    match tx.send(WorkRequest::Shutdown { response }) {
                        Ok(()) => Some((entry.id, rx)),
                        Err(_e) => {
                            tracing::error!("Failed to send shutdown to worker {}", entry.id);
                            None
                        }
                    }
                })
                .collect()
        };

        tracing::debug!("Waiting for up to 3s per worker for shutdown acknowledgements");
        let timeout_futures = shutdown_handles
            .into_iter()
            .map(|(worker_id, rx)| async move {
                match timeout(Duration::from_secs(3), rx).await {
                    Ok(Ok(())) => tracing::trace!("Worker {worker_id} shutdown acknowledged"),
                    Ok(Err(e)) => tracing::error!("Worker {worker_id} returned error: {e}"),
                    Err(_) => tracing::warn!("Worker {worker_id} shutdown timed out"),
                }
            });

        futures::future::join_all(timeout_futures).await;

        tracing::info!("Worker pool shutdown complete");
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.close();
        let mut state = self.shared.state.lock();
        for entry in state.slots.iter_mut().flatten() {
            entry.tx = None;
        }
    }
}

impl Shared {
    fn submit(self: &Arc<Self>, operation: Operation) -> Result<TaskHandle> {
        let mut state = self.state.lock();
        if !state.accepting {
            return Err(Error::ServiceShutdown);
        }

        let slot = self.idle_or_revived(&mut state);
        if slot.is_none() {
            if state.live_workers() == 0 {
                return Err(Error::NoLiveWorkers);
            }
            if let Some(capacity) = self.config.queue_capacity {
                if state.queue.len() >= capacity {
                    tracing::debug!(%operation, "Rejecting task: queue at capacity ({capacity})");
                    return Err(Error::PoolSaturated { capacity });
                }
            }
        }

        let task_id = state.next_task_id;
        state.next_task_id += 1;
        let task = Task::new(task_id, operation);
        let (reply, rx) = oneshot::channel();

        match slot {
            Some(slot) => self.assign(&mut state, slot, task, reply),
            None => {
                tracing::trace!(task_id, %operation, "Queued task behind busy workers");
                state.queue.push_back(Pending { task, reply });
            }
        }

        Ok(TaskHandle::new(task_id, operation, rx, Arc::downgrade(self)))
    }

    /// Records the outcome of a task and returns whether the worker should
    /// keep running.
    pub(crate) fn complete(
        self: &Arc<Self>,
        slot: usize,
        worker_id: WorkerId,
        task_id: TaskId,
        completion: Completion,
    ) -> bool {
        let mut state = self.state.lock();
        let current = state.slots[slot]
            .as_ref()
            .is_some_and(|w| w.id == worker_id && w.status == WorkerStatus::Busy);

        let (result, crashed) = match completion {
            Completion::Finished(Ok(output)) => (Ok(output), false),
            Completion::Finished(Err(e)) => {
                tracing::warn!("Task {task_id} failed on worker {worker_id}: {e}");
                let reason = e.to_string();
                (Err(Error::Execution { worker_id, reason }), false)
            }
            Completion::Crashed(message) => {
                tracing::error!("Worker {worker_id} crashed running task {task_id}: {message}");
                let reason = format!("worker crashed: {message}");
                (Err(Error::Execution { worker_id, reason }), true)
            }
        };

        match state.in_flight.remove(&task_id) {
            Some(in_flight) => {
                in_flight.watchdog.abort();
                match in_flight.reply {
                    Some(reply) => {
                        if reply.send(result).is_err() {
                            tracing::debug!("Task {task_id} submitter went away; result discarded");
                        }
                    }
                    None => tracing::debug!("Task {task_id} was cancelled; result discarded"),
                }
            }
            None => tracing::debug!(
                "Worker {worker_id} finished task {task_id} after it was resolved; result discarded"
            ),
        }

        // Already written off by the watchdog.
        if !current {
            return false;
        }

        if crashed {
            self.retire(&mut state, slot, worker_id);
            return false;
        }

        if let Some(entry) = state.slots[slot].as_mut() {
            entry.status = WorkerStatus::Idle;
        }
        self.dispatch(&mut state);
        true
    }

    /// Best-effort cancellation requested by a dropped [`TaskHandle`].
    pub(crate) fn cancel(&self, task_id: TaskId) {
        let mut state = self.state.lock();
        if let Some(pos) = state.queue.iter().position(|p| p.task.id() == task_id) {
            state.queue.remove(pos);
            tracing::debug!("Task {task_id} cancelled while queued");
        } else if let Some(in_flight) = state.in_flight.get_mut(&task_id) {
            in_flight.reply = None;
            tracing::debug!("Task {task_id} cancelled while running; its result will be discarded");
        }
    }

    /// Watchdog expiry for `task_id`.
    fn expire(self: &Arc<Self>, task_id: TaskId, worker_id: WorkerId) {
        let mut state = self.state.lock();
        let Some(in_flight) = state.in_flight.remove(&task_id) else {
            return;
        };

        let limit = self.config.task_timeout;
        tracing::warn!("Task {task_id} exceeded {limit:?} on worker {worker_id}");
        if let Some(reply) = in_flight.reply {
            let _ = reply.send(Err(Error::ExecutionTimeout {
                worker_id,
                timeout: limit,
            }));
        }
        self.retire(&mut state, in_flight.slot, worker_id);
    }

    /// Stops accepting work and cancels everything not yet resolved. Returns
    /// the number of cancelled tasks.
    fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.accepting = false;

        let mut cancelled = 0;
        for pending in state.queue.drain(..) {
            let _ = pending.reply.send(Err(Error::Cancelled));
            cancelled += 1;
        }
        for (_, in_flight) in state.in_flight.drain() {
            in_flight.watchdog.abort();
            if let Some(reply) = in_flight.reply {
                let _ = reply.send(Err(Error::Cancelled));
            }
            cancelled += 1;
        }
        cancelled
    }

    fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && state.in_flight.is_empty()
    }

    /// Hands the head of the queue to idle (or freshly started) workers until
    /// either runs out.
    fn dispatch(self: &Arc<Self>, state: &mut State) {
        while !state.queue.is_empty() {
            let Some(slot) = self.idle_or_revived(state) else {
                break;
            };
            let Some(Pending { task, reply }) = state.queue.pop_front() else {
                break;
            };
            self.assign(state, slot, task, reply);
        }

        if !state.queue.is_empty() && state.live_workers() == 0 {
            tracing::warn!(
                "No live workers left; failing {} queued tasks",
                state.queue.len()
            );
            for pending in state.queue.drain(..) {
                let _ = pending.reply.send(Err(Error::NoLiveWorkers));
            }
        }
    }

    fn assign(self: &Arc<Self>, state: &mut State, slot: usize, task: Task, reply: Reply) {
        let task_id = task.id();
        let Some(entry) = state.slots[slot].as_mut() else {
            let _ = reply.send(Err(Error::NoLiveWorkers));
            return;
        };

        let worker_id = entry.id;
        entry.status = WorkerStatus::Busy;
        let sent = entry
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(WorkRequest::Run { task }).is_ok());

        if !sent {
            tracing::error!("Worker {worker_id} is no longer running; failing task {task_id}");
            let _ = reply.send(Err(Error::Execution {
                worker_id,
                reason: "worker thread is no longer running".to_string(),
            }));
            self.retire(state, slot, worker_id);
            return;
        }

        let watchdog = self.arm_watchdog(task_id, worker_id);
        state.in_flight.insert(
            task_id,
            InFlight {
                slot,
                reply: Some(reply),
                watchdog,
            },
        );
    }

    fn arm_watchdog(self: &Arc<Self>, task_id: TaskId, worker_id: WorkerId) -> AbortHandle {
        let pool = Arc::downgrade(self);
        let limit = self.config.task_timeout;
        self.runtime
            .spawn(async move {
                sleep(limit).await;
                if let Some(pool) = pool.upgrade() {
                    pool.expire(task_id, worker_id);
                }
            })
            .abort_handle()
    }

    /// Declares the worker in `slot` dead and applies the restart policy.
    fn retire(self: &Arc<Self>, state: &mut State, slot: usize, worker_id: WorkerId) {
        match state.slots[slot].as_mut() {
            Some(entry) if entry.id == worker_id => {
                entry.status = WorkerStatus::Dead;
                // The thread leaves its loop once its current task returns.
                entry.tx = None;
            }
            _ => return,
        }

        tracing::warn!(
            slot,
            "Worker {worker_id} is dead (restart policy: {})",
            self.config.restart_policy
        );

        if self.config.restart_policy == RestartPolicy::Immediate && state.accepting {
            self.spawn_into(state, slot);
        }
        self.dispatch(state);
    }

    /// Returns an idle slot, starting a replacement worker in a dead slot if
    /// the restart policy allows it.
    fn idle_or_revived(self: &Arc<Self>, state: &mut State) -> Option<usize> {
        if let Some(slot) = state.idle_slot() {
            return Some(slot);
        }
        if self.config.restart_policy == RestartPolicy::Never || !state.accepting {
            return None;
        }
        state
            .vacant_slots()
            .into_iter()
            .find(|&slot| self.spawn_into(state, slot))
    }

    /// Starts a fresh worker in `slot`. Failures are logged and leave the slot
    /// vacant.
    fn spawn_into(self: &Arc<Self>, state: &mut State, slot: usize) -> bool {
        let worker_id = state.next_worker_id;
        state.next_worker_id += 1;

        match worker::spawn(
            slot,
            worker_id,
            Arc::downgrade(self),
            Arc::clone(&self.executor),
        ) {
            Ok(tx) => {
                state.slots[slot] = Some(WorkerEntry {
                    id: worker_id,
                    status: WorkerStatus::Idle,
                    tx: Some(tx),
                });
                tracing::debug!(slot, "Worker {worker_id} started");
                true
            }
            Err(e) => {
                let err = Error::WorkerStartup {
                    context: format!("failed to spawn worker {worker_id}: {e}"),
                };
                tracing::error!(slot, "{err}");
                false
            }
        }
    }
}

impl State {
    fn idle_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(w) if w.status == WorkerStatus::Idle))
    }

    fn vacant_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !matches!(s, Some(w) if w.status != WorkerStatus::Dead))
            .map(|(slot, _)| slot)
            .collect()
    }

    fn live_workers(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|w| w.status != WorkerStatus::Dead)
            .count()
    }

    fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            size: self.slots.len(),
            queued: self.queue.len(),
            in_flight: self.in_flight.len(),
            ..PoolStats::default()
        };
        for slot in &self.slots {
            match slot.as_ref().map(|w| w.status) {
                Some(WorkerStatus::Idle) => stats.idle += 1,
                Some(WorkerStatus::Busy) => stats.busy += 1,
                Some(WorkerStatus::Dead) | None => stats.dead += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Operations;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use parking_lot::Condvar;

    /// Holds heavy computations until opened and records the order in which
    /// tasks start.
    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        cv: Condvar,
        started: Mutex<Vec<TaskId>>,
    }

    impl Gate {
        fn open(&self) {
            *self.open.lock() = true;
            self.cv.notify_all();
        }

        fn wait(&self) {
            let mut open = self.open.lock();
            while !*open {
                self.cv.wait(&mut open);
            }
        }
    }

    #[derive(Clone, Default)]
    struct GatedExecutor {
        gate: Arc<Gate>,
    }

    impl Executor for GatedExecutor {
        fn execute(
            &self,
            worker_id: WorkerId,
            task: &Task,
        ) -> core::result::Result<Output, BoxError> {
            self.gate.started.lock().push(task.id());
            match task.operation() {
                Operation::ProcessRequest => Ok(Output::Text(format!("worker {worker_id}"))),
                Operation::HeavyComputation => {
                    self.gate.wait();
                    Ok(Output::Number(task.id() as f64))
                }
            }
        }
    }

    /// Panics, fails or stalls on heavy computations; answers process
    /// requests normally.
    #[derive(Clone, Copy)]
    enum Faulty {
        Panic,
        Fail,
        Stall(Duration),
    }

    impl Executor for Faulty {
        fn execute(
            &self,
            worker_id: WorkerId,
            task: &Task,
        ) -> core::result::Result<Output, BoxError> {
            if task.operation() == Operation::ProcessRequest {
                return Ok(Output::Text(format!("worker {worker_id}")));
            }
            match self {
                Self::Panic => panic!("execution context lost"),
                Self::Fail => Err("bad input".into()),
                Self::Stall(d) => {
                    std::thread::sleep(*d);
                    Ok(Output::Number(0.0))
                }
            }
        }
    }

    fn config(size: usize, queue_capacity: Option<usize>) -> PoolConfig {
        PoolConfig {
            size,
            queue_capacity,
            task_timeout: Duration::from_secs(10),
            ..PoolConfig::default()
        }
    }

    async fn wait_for(pool: &WorkerPool, pred: impl Fn(&PoolStats) -> bool) {
        timeout(Duration::from_secs(5), async {
            while !pred(&pool.stats()) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("pool never reached expected state: {:?}", pool.stats()));
    }

    fn worker_of(output: &Output) -> WorkerId {
        match output {
            Output::Text(text) => text.trim_start_matches("worker ").parse().unwrap(),
            Output::Number(_) => panic!("expected text output"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_builtin_operations() {
        let pool = WorkerPool::new(config(4, Some(8)), Operations::new(1_000)).unwrap();
        assert_eq!(pool.stats().idle, 4);

        let text = pool.submit(Operation::ProcessRequest).unwrap().await.unwrap();
        assert!(matches!(text, Output::Text(ref s) if s.starts_with("[Worker ")));

        let number = pool.submit(Operation::HeavyComputation).unwrap().await.unwrap();
        assert!(matches!(number, Output::Number(n) if n.is_finite() && n >= 0.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_task_resolves_exactly_once() {
        let pool = WorkerPool::new(config(4, None), Operations::new(1_000)).unwrap();
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let op = if i % 2 == 0 {
                    Operation::ProcessRequest
                } else {
                    Operation::HeavyComputation
                };
                pool.submit(op).unwrap()
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        assert_eq!(results.len(), 64);
        assert!(results.iter().all(Result::is_ok));
        wait_for(&pool, |s| s.in_flight == 0 && s.queued == 0 && s.idle == 4).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn saturated_pool_rejects_without_blocking() {
        let executor = GatedExecutor::default();
        let gate = Arc::clone(&executor.gate);
        let pool = WorkerPool::new(config(2, Some(1)), executor).unwrap();

        let running: Vec<_> = (0..2)
            .map(|_| pool.submit(Operation::HeavyComputation).unwrap())
            .collect();
        wait_for(&pool, |s| s.busy == 2).await;

        let queued = pool.submit(Operation::HeavyComputation).unwrap();
        assert_eq!(pool.stats().queued, 1);

        let rejected = pool.submit(Operation::HeavyComputation);
        assert_eq!(rejected.err(), Some(Error::PoolSaturated { capacity: 1 }));

        gate.open();
        for handle in running {
            assert!(handle.await.is_ok());
        }
        assert!(queued.await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn zero_capacity_only_bypasses_the_queue() {
        let executor = GatedExecutor::default();
        let gate = Arc::clone(&executor.gate);
        let pool = WorkerPool::new(config(1, Some(0)), executor).unwrap();

        let running = pool.submit(Operation::HeavyComputation).unwrap();
        wait_for(&pool, |s| s.busy == 1).await;
        assert_eq!(
            pool.submit(Operation::ProcessRequest).err(),
            Some(Error::PoolSaturated { capacity: 0 })
        );

        gate.open();
        assert!(running.await.is_ok());
        assert!(pool.submit(Operation::ProcessRequest).unwrap().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queued_tasks_start_in_submission_order() {
        let executor = GatedExecutor::default();
        let gate = Arc::clone(&executor.gate);
        let pool = WorkerPool::new(config(1, None), executor).unwrap();

        let first = pool.submit(Operation::HeavyComputation).unwrap();
        wait_for(&pool, |s| s.busy == 1).await;

        let queued: Vec<_> = (0..8)
            .map(|_| pool.submit(Operation::ProcessRequest).unwrap())
            .collect();
        let expected: Vec<TaskId> = core::iter::once(first.task_id())
            .chain(queued.iter().map(TaskHandle::task_id))
            .collect();
        assert_eq!(pool.stats().queued, 8);

        gate.open();
        assert!(first.await.is_ok());
        for handle in queued {
            assert!(handle.await.is_ok());
        }

        assert_eq!(*gate.started.lock(), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn never_more_busy_workers_than_pool_size() {
        struct Counting {
            current: AtomicUsize,
            peak: AtomicUsize,
        }

        impl Executor for Counting {
            fn execute(&self, _: WorkerId, _: &Task) -> core::result::Result<Output, BoxError> {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(2));
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(Output::Number(0.0))
            }
        }

        let counting = Arc::new(Counting {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let pool = WorkerPool::with_executor(config(3, None), counting.clone()).unwrap();

        let handles: Vec<_> = (0..40)
            .map(|_| pool.submit(Operation::HeavyComputation).unwrap())
            .collect();
        for handle in handles {
            assert!(handle.await.is_ok());
        }

        let peak = counting.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak} exceeded pool size");
        assert!(peak >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crashed_worker_is_replaced_immediately() {
        let pool = WorkerPool::new(config(2, Some(4)), Faulty::Panic).unwrap();

        let err = pool
            .submit(Operation::HeavyComputation)
            .unwrap()
            .await
            .unwrap_err();
        let Error::Execution { worker_id, reason } = err else {
            panic!("expected execution error, got {err:?}");
        };
        assert!(reason.contains("execution context lost"));

        let stats = pool.stats();
        assert_eq!((stats.size, stats.idle, stats.dead), (2, 2, 0));

        // Replacements get fresh ids, so the crashed worker never answers again.
        for _ in 0..4 {
            let output = pool.submit(Operation::ProcessRequest).unwrap().await.unwrap();
            assert_ne!(worker_of(&output), worker_id);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_task_keeps_its_worker() {
        let pool = WorkerPool::new(config(1, Some(4)), Faulty::Fail).unwrap();

        let first = pool.submit(Operation::ProcessRequest).unwrap().await.unwrap();
        let err = pool
            .submit(Operation::HeavyComputation)
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution { ref reason, .. } if reason == "bad input"));

        let stats = pool.stats();
        assert_eq!((stats.idle, stats.dead), (1, 0));
        let second = pool.submit(Operation::ProcessRequest).unwrap().await.unwrap();
        assert_eq!(worker_of(&first), worker_of(&second));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_task_times_out_and_worker_is_replaced() {
        let config = PoolConfig {
            task_timeout: Duration::from_millis(100),
            ..config(1, Some(4))
        };
        let pool = WorkerPool::new(config, Faulty::Stall(Duration::from_millis(600))).unwrap();

        let err = pool
            .submit(Operation::HeavyComputation)
            .unwrap()
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::ExecutionTimeout {
                worker_id: 0,
                timeout: Duration::from_millis(100)
            }
        );

        wait_for(&pool, |s| s.idle == 1 && s.dead == 0).await;
        let output = pool.submit(Operation::ProcessRequest).unwrap().await.unwrap();
        assert_eq!(worker_of(&output), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lazy_policy_replaces_on_next_submit() {
        let config = PoolConfig {
            restart_policy: RestartPolicy::Lazy,
            ..config(1, Some(4))
        };
        let pool = WorkerPool::new(config, Faulty::Panic).unwrap();

        assert!(pool.submit(Operation::HeavyComputation).unwrap().await.is_err());
        assert_eq!(pool.stats().dead, 1);

        let output = pool.submit(Operation::ProcessRequest).unwrap().await.unwrap();
        assert_eq!(worker_of(&output), 1);
        assert_eq!(pool.stats().dead, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn never_policy_runs_out_of_workers() {
        let config = PoolConfig {
            restart_policy: RestartPolicy::Never,
            ..config(1, Some(4))
        };
        let pool = WorkerPool::new(config, Faulty::Panic).unwrap();

        assert!(pool.submit(Operation::HeavyComputation).unwrap().await.is_err());
        assert_eq!(
            pool.submit(Operation::ProcessRequest).err(),
            Some(Error::NoLiveWorkers)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_a_queued_handle_removes_the_task() {
        let executor = GatedExecutor::default();
        let gate = Arc::clone(&executor.gate);
        let pool = WorkerPool::new(config(1, None), executor).unwrap();

        let running = pool.submit(Operation::HeavyComputation).unwrap();
        wait_for(&pool, |s| s.busy == 1).await;

        let queued = pool.submit(Operation::ProcessRequest).unwrap();
        let cancelled_id = queued.task_id();
        assert_eq!(pool.stats().queued, 1);
        queued.cancel();
        assert_eq!(pool.stats().queued, 0);

        gate.open();
        assert!(running.await.is_ok());
        assert!(!gate.started.lock().contains(&cancelled_id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_a_running_handle_discards_the_result() {
        let executor = GatedExecutor::default();
        let gate = Arc::clone(&executor.gate);
        let pool = WorkerPool::new(config(1, None), executor).unwrap();

        let running = pool.submit(Operation::HeavyComputation).unwrap();
        wait_for(&pool, |s| s.busy == 1).await;
        drop(running);
        assert_eq!(pool.stats().in_flight, 1);

        gate.open();
        wait_for(&pool, |s| s.idle == 1 && s.in_flight == 0).await;
        assert!(pool.submit(Operation::ProcessRequest).unwrap().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_drains_queued_work() {
        let executor = GatedExecutor::default();
        let gate = Arc::clone(&executor.gate);
        let config = PoolConfig {
            shutdown_timeout: Duration::from_secs(2),
            ..config(1, None)
        };
        let pool = WorkerPool::new(config, executor).unwrap();

        let running = pool.submit(Operation::HeavyComputation).unwrap();
        let queued = pool.submit(Operation::HeavyComputation).unwrap();

        let (shutdown, ()) = tokio::join!(pool.shutdown(), async {
            sleep(Duration::from_millis(50)).await;
            gate.open();
        });
        assert!(shutdown.is_ok());
        assert!(running.await.is_ok());
        assert!(queued.await.is_ok());
        assert_eq!(
            pool.submit(Operation::ProcessRequest).err(),
            Some(Error::ServiceShutdown)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_cancels_work_that_outlives_the_drain() {
        let executor = GatedExecutor::default();
        let gate = Arc::clone(&executor.gate);
        let config = PoolConfig {
            shutdown_timeout: Duration::from_millis(100),
            ..config(1, None)
        };
        let pool = WorkerPool::new(config, executor).unwrap();

        let running = pool.submit(Operation::HeavyComputation).unwrap();
        let queued = pool.submit(Operation::HeavyComputation).unwrap();
        wait_for(&pool, |s| s.busy == 1).await;

        let (shutdown, ()) = tokio::join!(pool.shutdown(), async {
            sleep(Duration::from_millis(300)).await;
            gate.open();
        });
        assert!(shutdown.is_ok());
        assert_eq!(running.await.err(), Some(Error::Cancelled));
        assert_eq!(queued.await.err(), Some(Error::Cancelled));
        assert!(!pool.is_accepting());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_the_pool_cancels_pending_handles() {
        let executor = GatedExecutor::default();
        let gate = Arc::clone(&executor.gate);
        let pool = WorkerPool::new(config(1, None), executor).unwrap();

        let running = pool.submit(Operation::HeavyComputation).unwrap();
        let queued = pool.submit(Operation::ProcessRequest).unwrap();
        drop(pool);

        assert_eq!(running.await.err(), Some(Error::Cancelled));
        assert_eq!(queued.await.err(), Some(Error::Cancelled));
        gate.open();
    }

    #[test]
    fn construction_requires_a_runtime() {
        let err = WorkerPool::new(PoolConfig::default(), Operations::new(1))
            .err()
            .unwrap();
        assert!(matches!(err, Error::WorkerStartup { .. }));
    }

    #[tokio::test]
    async fn zero_sized_pool_is_rejected() {
        let err = WorkerPool::new(config(0, None), Operations::new(1))
            .err()
            .unwrap();
        assert!(matches!(err, Error::WorkerStartup { ref context } if context.contains("size")));
    }
}
