//! Request-level middleware: duration tracking and panic recovery.

use super::handler::INTERNAL_ERROR_BODY;
use crate::server::metrics::Metrics;
use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use core::any::Any;
use std::{sync::Arc, time::Instant};

/// Route label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "<unmatched>";

/// Status recorded for requests whose client went away before a response.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Records one `http_request_duration_ms` sample per request.
///
/// The route label is the matched route template, or [`UNMATCHED_ROUTE`].
/// A request dropped before its response is ready is recorded with
/// [`CLIENT_CLOSED_REQUEST`].
pub async fn track_metrics(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
        .to_owned();
    let mut sample = RequestSample {
        metrics,
        method: request.method().to_string(),
        route,
        start: Instant::now(),
        recorded: false,
    };

    let response = next.run(request).await;

    sample.record(response.status().as_u16());
    response
}

struct RequestSample {
    metrics: Arc<Metrics>,
    method: String,
    route: String,
    start: Instant,
    recorded: bool,
}

impl RequestSample {
    fn record(&mut self, code: u16) {
        self.recorded = true;
        self.metrics
            .observe_request(&self.method, &self.route, code, self.start.elapsed());
    }
}

impl Drop for RequestSample {
    fn drop(&mut self) {
        if !self.recorded {
            self.record(CLIENT_CLOSED_REQUEST);
        }
    }
}

/// Turns a handler panic into a 500.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let reason = err
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    tracing::error!("Handler panicked: {reason}");
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response()
}
