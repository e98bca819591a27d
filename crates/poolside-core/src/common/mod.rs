pub mod error;
pub mod types;

pub use error::{BoxError, Error, Result};
pub use types::{Operation, Output, PoolStats, Task, TaskId, WorkerId, WorkerStatus};
