#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use poolside_core::{Operations, WorkerPool};
use server::config::{CliArgs, ServerConfig};
use server::metrics::{Metrics, spawn_pool_sampler};
use server::service::{handler::AppState, router};
use server::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(config.log_format)?;

    let pool = Arc::new(WorkerPool::new(
        config.pool.clone(),
        Operations::new(config.heavy_iterations),
    )?);
    let metrics = Arc::new(Metrics::new()?);

    let sampler_token = CancellationToken::new();
    let sampler = spawn_pool_sampler(
        Arc::clone(&metrics),
        Arc::clone(&pool),
        config.metrics_interval,
        sampler_token.clone(),
    );

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config.server_addr, &config);

    let app = router(AppState::new(Arc::clone(&pool), metrics));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // 1. Stop refreshing gauges
    sampler_token.cancel();
    if let Err(e) = sampler.await {
        tracing::error!("Metrics sampler failed: {:?}", e);
    }

    // 2. Drain and stop the worker pool
    if let Err(e) = pool.shutdown().await {
        tracing::error!("Error during pool shutdown: {:?}", e);
    }

    served?;
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting poolside on {} with full config: {:#?}", addr, config);
    } else {
        tracing::info!(
            "Starting poolside on {} with {} workers (restart policy: {})",
            addr,
            config.pool.size,
            config.pool.restart_policy
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                core::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            core::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
