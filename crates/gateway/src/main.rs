//! API Gateway binary
//!
//! Wires configuration, logging, metrics and the admission pipeline together,
//! serves until a termination signal, then shuts down in order.

use anyhow::Context;
use api_gateway::{create_router, shutdown_signal, AppState, ShutdownCoordinator};
use gateway_common::{
    config::GatewayConfig,
    metrics::{self, request_duration_metric, LATENCY_BUCKETS},
    ratelimit::spawn_sweeper,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::IntoFuture;
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = GatewayConfig::load().context("failed to load configuration")?;

    init_tracing(&config.observability.log_level, config.observability.json_logging);

    info!("Starting API Gateway v{}", gateway_common::VERSION);

    // Initialize metrics
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(request_duration_metric()), LATENCY_BUCKETS)
        .context("invalid latency buckets")?
        .install_recorder()
        .context("failed to install metrics recorder")?;
    metrics::register_metrics();

    let state = AppState::from_config(config, handle).context("failed to build gateway")?;
    let config = state.config.clone();

    info!(
        rate = state.limiter.rate(),
        burst = state.limiter.capacity(),
        workers = config.worker_pool.workers,
        queue_capacity = state.pool.queue_capacity(),
        upstream = %state.proxy.target(),
        "Pipeline configured"
    );

    if let Some(interval) = config.rate_limit.sweep_interval() {
        info!(interval_secs = interval.as_secs(), "Rate limiter eviction enabled");
        spawn_sweeper(state.limiter.clone(), interval, config.rate_limit.max_idle());
    }

    let pool = state.pool.clone();
    let app = create_router(state);

    // Start the server
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(
        address = %addr,
        read_timeout_secs = config.server.read_timeout_secs,
        write_timeout_secs = config.server.write_timeout_secs,
        idle_timeout_secs = config.server.idle_timeout_secs,
        "Listening"
    );

    let coordinator = ShutdownCoordinator::new(config.shutdown_grace());
    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(coordinator.listener_stop())
        .into_future();

    if let Err(e) = coordinator.run(server, shutdown_signal(), &pool).await {
        error!(error = %e, "Shutdown did not complete cleanly");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
