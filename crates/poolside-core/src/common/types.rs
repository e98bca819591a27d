//! # Task and Worker Types
//!
//! Shared types describing the work flowing through the pool and the state of
//! the workers executing it.
//!
//! ## Overview
//!
//! - [`Operation`] - What a caller asks a worker to do
//! - [`Task`] - An immutable unit of work, identified by a [`TaskId`]
//! - [`Output`] - The value produced by a successful task
//! - [`WorkerStatus`] - Lifecycle state of a single worker
//! - [`PoolStats`] - A consistent snapshot of the pool

use core::fmt;
use std::time::Instant;

/// Identifier assigned to a worker. Replacement workers get fresh ids.
pub type WorkerId = usize;

/// Identifier assigned to a task at submission, increasing in submission
/// order.
pub type TaskId = u64;

/// The operations a worker knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Tag the handling worker and the time of processing.
    ProcessRequest,
    /// Run a fixed-length CPU-bound accumulation loop.
    HeavyComputation,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessRequest => "process_request",
            Self::HeavyComputation => "heavy_computation",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work submitted to the pool.
///
/// Tasks are immutable once created. The pool owns a task while it is queued
/// and hands it over to the worker that claims it.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    operation: Operation,
    submitted_at: Instant,
}

impl Task {
    pub fn new(id: TaskId, operation: Operation) -> Self {
        Self {
            id,
            operation,
            submitted_at: Instant::now(),
        }
    }

    pub const fn id(&self) -> TaskId {
        self.id
    }

    pub const fn operation(&self) -> Operation {
        self.operation
    }

    pub const fn submitted_at(&self) -> Instant {
        self.submitted_at
    }
}

/// The value produced by a successfully executed task.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Text(String),
    Number(f64),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(value) => write!(f, "{value}"),
        }
    }
}

/// Lifecycle state of a worker.
///
/// `Idle -> Busy` on assignment, `Busy -> Idle` on completion (successful or
/// not), and `Dead` once the worker's thread is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    Idle,
    Busy,
    Dead,
}

impl WorkerStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Dead => "dead",
        }
    }
}

/// Point-in-time view of the pool, read under the pool lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker slots (the configured pool size).
    pub size: usize,
    pub idle: usize,
    pub busy: usize,
    /// Slots whose worker is dead or never started.
    pub dead: usize,
    /// Tasks waiting in the FIFO queue.
    pub queued: usize,
    /// Tasks claimed by a worker and not yet resolved.
    pub in_flight: usize,
}

impl PoolStats {
    /// Workers able to accept work now or after their current task.
    pub const fn live(&self) -> usize {
        self.idle + self.busy
    }
}
