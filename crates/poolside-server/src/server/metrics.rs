//! Prometheus metrics exposed on `GET /metrics`.
//!
//! ## Metrics
//!
//! - `http_request_duration_ms{method, route, code}`: one sample per completed
//!   HTTP request, recorded by the tracking middleware.
//! - `pool_tasks_total{operation, outcome}`: tasks submitted by the handlers,
//!   by how they ended.
//! - `pool_workers{status}`, `pool_queue_depth`, `pool_tasks_in_flight`:
//!   worker pool gauges, refreshed by [`spawn_pool_sampler`].
//! - `process_*`: CPU, memory and file descriptor usage of the process
//!   (Linux only), collected on every scrape.

use core::time::Duration;
use poolside_core::{Operation, PoolStats, WorkerPool, WorkerStatus};
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Histogram buckets for request durations, in milliseconds.
pub const DURATION_BUCKETS_MS: [f64; 6] = [0.1, 5.0, 15.0, 50.0, 100.0, 500.0];

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Metric handles and the registry they are exported from.
pub struct Metrics {
    registry: Registry,
    request_duration: HistogramVec,
    tasks: IntCounterVec,
    pool_workers: IntGaugeVec,
    pool_queue_depth: IntGauge,
    pool_in_flight: IntGauge,
}

impl Metrics {
    /// Creates and registers every metric in a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let request_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_ms", "Duration of HTTP requests in ms")
                .buckets(DURATION_BUCKETS_MS.to_vec()),
            &["method", "route", "code"],
        )?;

        let tasks = IntCounterVec::new(
            Opts::new("pool_tasks_total", "Tasks submitted to the worker pool"),
            &["operation", "outcome"],
        )?;

        let pool_workers = IntGaugeVec::new(
            Opts::new("pool_workers", "Worker slots by status"),
            &["status"],
        )?;

        let pool_queue_depth = IntGauge::new("pool_queue_depth", "Tasks waiting for a worker")?;

        let pool_in_flight = IntGauge::new(
            "pool_tasks_in_flight",
            "Tasks claimed by a worker and not yet resolved",
        )?;

        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(tasks.clone()))?;
        registry.register(Box::new(pool_workers.clone()))?;
        registry.register(Box::new(pool_queue_depth.clone()))?;
        registry.register(Box::new(pool_in_flight.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            request_duration,
            tasks,
            pool_workers,
            pool_queue_depth,
            pool_in_flight,
        })
    }

    /// Records one completed HTTP request.
    pub fn observe_request(&self, method: &str, route: &str, code: u16, elapsed: Duration) {
        let code = code.to_string();
        self.request_duration
            .with_label_values(&[method, route, code.as_str()])
            .observe(elapsed.as_secs_f64() * 1_000.0);
    }

    pub fn record_task(&self, operation: Operation, outcome: &str) {
        self.tasks
            .with_label_values(&[operation.as_str(), outcome])
            .inc();
    }

    /// Copies a pool snapshot into the pool gauges.
    pub fn record_pool(&self, stats: &PoolStats) {
        for (status, count) in [
            (WorkerStatus::Idle, stats.idle),
            (WorkerStatus::Busy, stats.busy),
            (WorkerStatus::Dead, stats.dead),
        ] {
            self.pool_workers
                .with_label_values(&[status.as_str()])
                .set(count as i64);
        }
        self.pool_queue_depth.set(stats.queued as i64);
        self.pool_in_flight.set(stats.in_flight as i64);
    }

    /// Encodes every registered metric in the text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

/// Refreshes the pool gauges every `interval` until `shutdown` is cancelled.
pub fn spawn_pool_sampler(
    metrics: Arc<Metrics>,
    pool: Arc<WorkerPool>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => metrics.record_pool(&pool.stats()),
            }
        }
        tracing::debug!("Pool metrics sampler stopped");
    })
}
