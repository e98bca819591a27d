//! Built-in operations run by pool workers.
//!
//! Both operations only touch the calling worker's thread-local state: the
//! timestamp is read from the system clock and the pseudo-random values come
//! from the worker thread's own generator.

use crate::{BoxError, Executor, Operation, Output, Task, WorkerId};
use chrono::{SecondsFormat, Utc};
use rand::Rng;

/// Iteration count of [`Operation::HeavyComputation`] unless configured
/// otherwise.
pub const DEFAULT_HEAVY_ITERATIONS: usize = 10_000_000;

/// The default [`Executor`], running the two [`Operation`]s.
#[derive(Debug, Clone, Copy)]
pub struct Operations {
    heavy_iterations: usize,
}

impl Operations {
    pub const fn new(heavy_iterations: usize) -> Self {
        Self { heavy_iterations }
    }

    pub const fn heavy_iterations(&self) -> usize {
        self.heavy_iterations
    }
}

impl Default for Operations {
    fn default() -> Self {
        Self::new(DEFAULT_HEAVY_ITERATIONS)
    }
}

impl Executor for Operations {
    fn execute(&self, worker_id: WorkerId, task: &Task) -> Result<Output, BoxError> {
        Ok(match task.operation() {
            Operation::ProcessRequest => Output::Text(process_request(worker_id)),
            Operation::HeavyComputation => {
                Output::Number(heavy_computation(self.heavy_iterations))
            }
        })
    }
}

/// Returns a tag naming the worker and an RFC 3339 timestamp in UTC with
/// millisecond precision.
pub fn process_request(worker_id: WorkerId) -> String {
    format!(
        "[Worker {worker_id}] Processed at {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Sums `iterations` uniform samples from `[0, 1)`.
pub fn heavy_computation(iterations: usize) -> f64 {
    let mut rng = rand::rng();
    let mut result = 0.0_f64;
    for _ in 0..iterations {
        result += rng.random::<f64>();
    }
    result
}
