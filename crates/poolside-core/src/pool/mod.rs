//! The worker pool.
//!
//! ## Structure
//!
//! - [`manager`] - [`WorkerPool`](manager::WorkerPool): queue, worker table,
//!   dispatch, watchdog and shutdown.
//! - [`worker`] - The loop run by every worker thread.
//! - [`handle`] - [`TaskHandle`](handle::TaskHandle), the future a submitter
//!   awaits.
//! - [`executor`] - The [`Executor`](executor::Executor) seam.
//! - [`config`] - [`PoolConfig`](config::PoolConfig) and
//!   [`RestartPolicy`](config::RestartPolicy).

pub mod config;
pub mod executor;
pub mod handle;
pub mod manager;
pub(crate) mod request;
pub(crate) mod worker;
