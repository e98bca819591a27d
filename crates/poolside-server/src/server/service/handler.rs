//! HTTP handlers dispatching requests to the worker pool.
//!
//! Each work route maps to one [`Operation`], submits it, and awaits the
//! resulting [`TaskHandle`](poolside_core::TaskHandle). Pool errors are turned
//! into HTTP responses by [`ApiError`]:
//!
//! - `PoolSaturated` → 503 with `Retry-After: 1`.
//! - `ServiceShutdown`, `NoLiveWorkers`, `Cancelled` → 503.
//! - Anything else → 500 with a generic body. The cause is logged, never
//!   returned to the client.

use crate::server::metrics::{CONTENT_TYPE, Metrics};
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use poolside_core::{Error, Operation, Output, PoolStats, RestartPolicy, WorkerPool};
use serde::Serialize;
use std::sync::Arc;

/// Body returned for failures whose cause must not reach the client.
pub const INTERNAL_ERROR_BODY: &str = "Something broke!";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub const fn new(pool: Arc<WorkerPool>, metrics: Arc<Metrics>) -> Self {
        Self { pool, metrics }
    }

    /// Submits `operation` and waits for its result, counting the outcome.
    ///
    /// A request dropped while waiting counts as cancelled.
    async fn run(&self, operation: Operation) -> Result<Output, ApiError> {
        let mut outcome = TaskOutcome {
            metrics: &self.metrics,
            operation,
            recorded: false,
        };
        let result = match self.pool.submit(operation) {
            Ok(handle) => handle.await,
            Err(e) => Err(e),
        };
        outcome.record(match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        });
        Ok(result?)
    }
}

struct TaskOutcome<'a> {
    metrics: &'a Metrics,
    operation: Operation,
    recorded: bool,
}

impl TaskOutcome<'_> {
    fn record(&mut self, outcome: &str) {
        self.recorded = true;
        self.metrics.record_task(self.operation, outcome);
    }
}

impl Drop for TaskOutcome<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.record(Error::Cancelled.outcome());
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HeavyComputationResponse {
    pub result: f64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub accepting: bool,
    pub size: usize,
    pub idle: usize,
    pub busy: usize,
    pub dead: usize,
    pub queued: usize,
    pub in_flight: usize,
}

impl HealthResponse {
    fn new(stats: PoolStats, accepting: bool) -> Self {
        Self {
            accepting,
            size: stats.size,
            idle: stats.idle,
            busy: stats.busy,
            dead: stats.dead,
            queued: stats.queued,
            in_flight: stats.in_flight,
        }
    }
}

/// `GET /`
pub async fn process_request(State(state): State<AppState>) -> Result<String, ApiError> {
    match state.run(Operation::ProcessRequest).await? {
        Output::Text(text) => Ok(format!("Hello from poolside! {text}")),
        other => Err(ApiError::UnexpectedOutput(other)),
    }
}

/// `POST /threads`
pub async fn heavy_computation(
    State(state): State<AppState>,
) -> Result<Json<HeavyComputationResponse>, ApiError> {
    match state.run(Operation::HeavyComputation).await? {
        Output::Number(result) => Ok(Json(HeavyComputationResponse { result })),
        other => Err(ApiError::UnexpectedOutput(other)),
    }
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    // Scrapes see current pool state, not the last sampler tick.
    state.metrics.record_pool(&state.pool.stats());
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response())
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    let stats = state.pool.stats();
    let accepting = state.pool.is_accepting();
    // Immediate and Lazy pools start a worker for the next submission.
    let can_serve =
        stats.live() > 0 || state.pool.config().restart_policy != RestartPolicy::Never;
    let status = if accepting && can_serve {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthResponse::new(stats, accepting))).into_response()
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Pool(#[from] Error),

    #[error("Metrics encoding failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Operation returned an unexpected output: {0:?}")]
    UnexpectedOutput(Output),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Pool(Error::PoolSaturated { capacity }) => {
                tracing::warn!("Rejecting request, pool saturated (capacity {capacity})");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    [(header::RETRY_AFTER, "1")],
                    "Server busy, try again later",
                )
                    .into_response()
            }
            Self::Pool(e @ (Error::ServiceShutdown | Error::NoLiveWorkers | Error::Cancelled)) => {
                tracing::warn!("Request not served: {e}");
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable").into_response()
            }
            e => {
                tracing::error!("Request failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response()
            }
        }
    }
}
