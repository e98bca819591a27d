//! HTTP surface of the service.
//!
//! ## Structure
//!
//! - [`handler`] - route handlers and the [`AppState`](handler::AppState)
//!   they share.
//! - [`middleware`] - request duration tracking and panic recovery.
//!
//! ## Routes
//!
//! | Method | Path       | Work                  |
//! |--------|------------|-----------------------|
//! | GET    | `/`        | `ProcessRequest`      |
//! | POST   | `/threads` | `HeavyComputation`    |
//! | GET    | `/metrics` | Prometheus exposition |
//! | GET    | `/health`  | Pool liveness         |

pub mod handler;
pub mod middleware;

use crate::server::metrics::Metrics;
use axum::{
    Router,
    routing::{get, post},
};
use handler::AppState;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Builds the application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    with_layers(routes(), Arc::clone(&state.metrics)).with_state(state)
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::process_request))
        .route("/threads", post(handler::heavy_computation))
        .route("/metrics", get(handler::metrics))
        .route("/health", get(handler::health))
}

// Panics are caught inside the duration tracking so they are recorded as 500s.
fn with_layers(router: Router<AppState>, metrics: Arc<Metrics>) -> Router<AppState> {
    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn_with_state(
                metrics,
                middleware::track_metrics,
            ))
            .layer(CatchPanicLayer::custom(middleware::handle_panic)),
    )
}
