use core::{fmt, str::FromStr, time::Duration};

/// What the pool does with a worker slot once its worker is declared dead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Spawn a replacement into the slot as soon as the worker dies.
    #[default]
    Immediate,
    /// Refill the slot the next time work is waiting and no worker is idle.
    Lazy,
    /// Leave the slot dead. Once every slot is dead, work is rejected.
    Never,
}

impl RestartPolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Lazy => "lazy",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown restart policy `{0}` (expected immediate, lazy or never)")]
pub struct ParseRestartPolicyError(String);

impl FromStr for RestartPolicy {
    type Err = ParseRestartPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "lazy" => Ok(Self::Lazy),
            "never" | "none" => Ok(Self::Never),
            _ => Err(ParseRestartPolicyError(s.to_string())),
        }
    }
}

/// Static configuration of a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker slots (N).
    pub size: usize,
    /// Maximum number of queued tasks. `None` leaves the queue unbounded and
    /// `Some(0)` disables queueing entirely.
    pub queue_capacity: Option<usize>,
    /// Watchdog threshold for a single task.
    pub task_timeout: Duration,
    pub restart_policy: RestartPolicy,
    /// Fewer workers than this at startup is fatal.
    pub min_workers: usize,
    /// How long [`WorkerPool::shutdown`](crate::WorkerPool::shutdown) waits
    /// for queued and in-flight tasks to drain before cancelling them.
    pub shutdown_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 4,
            queue_capacity: Some(256),
            task_timeout: Duration::from_secs(30),
            restart_policy: RestartPolicy::Immediate,
            min_workers: 1,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}
