use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use poolside_core::{PoolConfig, RestartPolicy, ops::DEFAULT_HEAVY_ITERATIONS};

/// Runtime configuration for the `poolside-server` binary.
///
/// These settings control the HTTP listener, the size and queueing behavior
/// of the worker pool, and how worker failures are handled. All values are
/// parsed from CLI arguments or environment variables, once, at startup.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "poolside-server",
    version,
    about = "An HTTP service that offloads request work to a fixed-size worker pool"
)]
pub struct CliArgs {
    /// Interface to bind the HTTP listener to.
    ///
    /// Environment variable: `HOST`
    #[arg(long, env = "HOST", default_value_t = String::from("0.0.0.0"))]
    pub host: String,

    /// Port to listen on.
    ///
    /// Environment variable: `PORT`
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Number of worker threads executing tasks.
    ///
    /// Environment variable: `POOL_SIZE`
    #[arg(long, env = "POOL_SIZE", default_value_t = 4)]
    pub pool_size: usize,

    /// Maximum number of tasks waiting for a worker. Submissions beyond this
    /// are answered with 503. Use 0 to reject whenever every worker is busy.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 256)]
    pub queue_capacity: usize,

    /// Remove the queue bound entirely (overrides `QUEUE_CAPACITY`).
    #[arg(long, default_value_t = false)]
    pub unbounded_queue: bool,

    /// Time budget of a single task, in milliseconds. A task exceeding it
    /// fails and its worker is written off.
    ///
    /// Environment variable: `TASK_TIMEOUT_MS`
    #[arg(long, env = "TASK_TIMEOUT_MS", default_value_t = 30_000)]
    pub task_timeout_ms: u64,

    /// What to do with a dead worker: `immediate`, `lazy` or `never`.
    ///
    /// Environment variable: `RESTART_POLICY`
    #[arg(long, env = "RESTART_POLICY", default_value_t = RestartPolicy::Immediate)]
    pub restart_policy: RestartPolicy,

    /// Minimum number of workers that must start for the server to boot.
    ///
    /// Environment variable: `MIN_WORKERS`
    #[arg(long, env = "MIN_WORKERS", default_value_t = 1)]
    pub min_workers: usize,

    /// Iterations of the `POST /threads` computation.
    ///
    /// Environment variable: `HEAVY_ITERATIONS`
    #[arg(long, env = "HEAVY_ITERATIONS", default_value_t = DEFAULT_HEAVY_ITERATIONS)]
    pub heavy_iterations: usize,

    /// Seconds to let in-flight tasks drain on shutdown before cancelling.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Interval, in milliseconds, at which pool gauges are refreshed.
    ///
    /// Environment variable: `METRICS_INTERVAL_MS`
    #[arg(long, env = "METRICS_INTERVAL_MS", default_value_t = 5_000)]
    pub metrics_interval_ms: u64,

    /// Log output format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub pool: PoolConfig,
    pub heavy_iterations: usize,
    pub metrics_interval: Duration,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.pool_size == 0 {
            bail!("POOL_SIZE must be greater than 0");
        }

        if args.min_workers > args.pool_size {
            bail!(
                "MIN_WORKERS ({}) exceeds POOL_SIZE ({})",
                args.min_workers,
                args.pool_size
            );
        }

        if args.task_timeout_ms == 0 {
            bail!("TASK_TIMEOUT_MS must be greater than 0");
        }

        if args.metrics_interval_ms == 0 {
            bail!("METRICS_INTERVAL_MS must be greater than 0");
        }

        let queue_capacity = (!args.unbounded_queue).then_some(args.queue_capacity);

        Ok(Self {
            server_addr: format!("{}:{}", args.host, args.port),
            pool: PoolConfig {
                size: args.pool_size,
                queue_capacity,
                task_timeout: Duration::from_millis(args.task_timeout_ms),
                restart_policy: args.restart_policy,
                min_workers: args.min_workers,
                shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            },
            heavy_iterations: args.heavy_iterations,
            metrics_interval: Duration::from_millis(args.metrics_interval_ms),
            log_format: args.log_format,
        })
    }
}
