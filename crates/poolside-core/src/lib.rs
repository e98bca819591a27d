#![doc = include_str!("../README.md")]

mod common;
pub mod ops;
pub mod pool;

pub use common::*;
pub use ops::Operations;
pub use pool::{
    config::{PoolConfig, RestartPolicy},
    executor::Executor,
    handle::TaskHandle,
    manager::WorkerPool,
};
