//! API Gateway
//!
//! Admission and dispatch for inbound HTTP requests:
//! - Bearer token authentication
//! - Per-client rate limiting
//! - Reverse proxying to a single upstream
//! - Dispatch to a bounded worker pool
//! - Ordered graceful shutdown

pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod router;
pub mod shutdown;

use gateway_common::{
    config::{ensure_valid, GatewayConfig},
    errors::Result,
    JwtManager, RateLimiter, WorkerPool,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

pub use proxy::{ProxyError, ReverseProxy};
pub use router::create_router;
pub use shutdown::{shutdown_signal, ShutdownCoordinator, ShutdownPhase};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub jwt: Arc<JwtManager>,
    pub limiter: Arc<RateLimiter>,
    pub pool: Arc<WorkerPool>,
    pub proxy: Arc<ReverseProxy>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        config: Arc<GatewayConfig>,
        jwt: Arc<JwtManager>,
        limiter: Arc<RateLimiter>,
        pool: Arc<WorkerPool>,
        proxy: Arc<ReverseProxy>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config,
            jwt,
            limiter,
            pool,
            proxy,
            metrics,
        }
    }

    /// Build every collaborator from configuration.
    ///
    /// Starts the worker pool, so this must run inside a Tokio runtime.
    pub fn from_config(config: GatewayConfig, metrics: PrometheusHandle) -> Result<Self> {
        ensure_valid(&config)?;

        let jwt = JwtManager::new(&config.auth.jwt_secret, config.auth.jwt_expiration_secs);
        let limiter = RateLimiter::from_config(&config.rate_limit);
        let proxy = ReverseProxy::new(&config.upstream)?;
        let pool = WorkerPool::from_config(&config.worker_pool);

        Ok(Self::new(
            Arc::new(config),
            Arc::new(jwt),
            Arc::new(limiter),
            Arc::new(pool),
            Arc::new(proxy),
            metrics,
        ))
    }
}
