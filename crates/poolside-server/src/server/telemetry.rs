//! Structured logging for the server.
//!
//! ## Behavior
//!
//! - Uses `tracing-subscriber` with either pretty-printed or JSON output.
//! - Pulls filtering rules from `RUST_LOG` or defaults to `info`.
//! - Pretty output includes thread ID, file, and line number.
//! - Timestamped using local time (RFC 3339 format).
//!
//! Worker threads are named `poolside-worker-<id>`, so pool events can be told
//! apart from request handling in the thread column.

use crate::server::config::LogFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                    .with_file(true)
                    .pretty(),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_thread_names(true)
                    .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                    .json(),
            )
            .try_init()?,
    }

    Ok(())
}
