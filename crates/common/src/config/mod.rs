//! Configuration management for the gateway
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use crate::errors::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct GatewayConfig {
    /// Listener configuration
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,

    /// Token validation
    #[validate(nested)]
    pub auth: AuthConfig,

    /// Reverse proxy target and transport
    #[serde(default)]
    #[validate(nested)]
    pub upstream: UpstreamConfig,

    /// Per-client token bucket
    #[serde(default)]
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,

    /// Synchronous job processing
    #[serde(default)]
    #[validate(nested)]
    pub worker_pool: WorkerPoolConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum time to read a request body
    #[serde(default = "default_read_timeout")]
    #[validate(range(min = 1))]
    pub read_timeout_secs: u64,

    /// Maximum time for a proxied exchange
    #[serde(default = "default_write_timeout")]
    #[validate(range(min = 1))]
    pub write_timeout_secs: u64,

    /// Keep-alive idle window
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Grace period for in-flight requests on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AuthConfig {
    /// Shared HS256 secret
    #[validate(length(min = 1))]
    pub jwt_secret: String,

    /// Lifetime of tokens minted by the gateway
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpstreamConfig {
    /// Upstream origin, e.g. http://localhost:9001
    #[serde(default = "default_upstream_url")]
    #[validate(url)]
    pub url: String,

    #[serde(default = "default_connect_timeout")]
    #[validate(range(min = 1))]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_tls_handshake_timeout")]
    #[validate(range(min = 1))]
    pub tls_handshake_timeout_ms: u64,

    #[serde(default = "default_response_header_timeout")]
    #[validate(range(min = 1))]
    pub response_header_timeout_ms: u64,

    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    #[serde(default = "default_idle_conn_timeout")]
    pub idle_conn_timeout_secs: u64,

    /// Idle connections kept per upstream host
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RateLimitConfig {
    /// Tokens refilled per second (per client)
    #[serde(default = "default_rate_limit")]
    #[validate(range(exclusive_min = 0.0))]
    pub requests_per_second: f64,

    /// Burst capacity
    #[serde(default = "default_burst")]
    #[validate(range(min = 1))]
    pub burst: u32,

    /// Idle-bucket sweep period, 0 disables eviction
    #[serde(default)]
    pub sweep_interval_secs: u64,

    /// Buckets idle longer than this are evicted by the sweep
    #[serde(default = "default_max_idle")]
    pub max_idle_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks
    #[serde(default = "default_workers")]
    #[validate(range(min = 1))]
    pub workers: usize,

    /// Bounded queue slots
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Simulated processing latency per job
    #[serde(default = "default_process_latency")]
    pub process_latency_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. "info", "api_gateway=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_read_timeout() -> u64 { 5 }
fn default_write_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 120 }
fn default_shutdown_grace() -> u64 { 10 }
fn default_jwt_expiration() -> u64 { 3600 }
fn default_upstream_url() -> String { "http://localhost:9001".to_string() }
fn default_connect_timeout() -> u64 { 3000 }
fn default_tls_handshake_timeout() -> u64 { 3000 }
fn default_response_header_timeout() -> u64 { 5000 }
fn default_keepalive() -> u64 { 30 }
fn default_idle_conn_timeout() -> u64 { 90 }
fn default_max_idle_per_host() -> usize { 50 }
fn default_rate_limit() -> f64 { 2.0 }
fn default_burst() -> u32 { 5 }
fn default_max_idle() -> u64 { 300 }
fn default_workers() -> usize { 2 }
fn default_queue_capacity() -> usize { 1 }
fn default_process_latency() -> u64 { 2000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl GatewayConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        Self::finish(config)
    }

    /// Load from a specific file, still honoring APP__ overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Address the listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.server.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.server.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.server.idle_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_secs)
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn tls_handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.tls_handshake_timeout_ms)
    }

    pub fn response_header_timeout(&self) -> Duration {
        Duration::from_millis(self.response_header_timeout_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn idle_conn_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_conn_timeout_secs)
    }
}

impl RateLimitConfig {
    /// Sweep period, if eviction is enabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            connect_timeout_ms: default_connect_timeout(),
            tls_handshake_timeout_ms: default_tls_handshake_timeout(),
            response_header_timeout_ms: default_response_header_timeout(),
            keepalive_secs: default_keepalive(),
            idle_conn_timeout_secs: default_idle_conn_timeout(),
            max_idle_per_host: default_max_idle_per_host(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            sweep_interval_secs: 0,
            max_idle_secs: default_max_idle(),
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            process_latency_ms: default_process_latency(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig {
                jwt_secret: "development-secret".to_string(),
                jwt_expiration_secs: default_jwt_expiration(),
            },
            upstream: UpstreamConfig::default(),
            rate_limit: RateLimitConfig::default(),
            worker_pool: WorkerPoolConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Reject a configuration that would make the pipeline unusable
pub fn ensure_valid(config: &GatewayConfig) -> Result<()> {
    config.validate().map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.write_timeout(), Duration::from_secs(10));
        assert_eq!(config.idle_timeout(), Duration::from_secs(120));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
        assert_eq!(config.rate_limit.burst, 5);
        assert_eq!(config.worker_pool.workers, 2);
        assert_eq!(config.worker_pool.queue_capacity, 1);
        assert!(config.rate_limit.sweep_interval().is_none());
        assert!(ensure_valid(&config).is_ok());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret.clear();

        let err = ensure_valid(&config).unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_zero_pool_sizes_rejected() {
        let mut config = GatewayConfig::default();
        config.worker_pool.queue_capacity = 0;
        assert!(ensure_valid(&config).is_err());

        let mut config = GatewayConfig::default();
        config.worker_pool.workers = 0;
        assert!(ensure_valid(&config).is_err());
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        let mut config = GatewayConfig::default();
        config.rate_limit.requests_per_second = 0.0;
        assert!(ensure_valid(&config).is_err());
    }

    #[test]
    fn test_invalid_upstream_url_rejected() {
        let mut config = GatewayConfig::default();
        config.upstream.url = "not a url".to_string();
        assert!(ensure_valid(&config).is_err());
    }

    #[test]
    fn test_partial_source_fills_defaults() {
        let config = Config::builder()
            .set_override("auth.jwt_secret", "s3cret")
            .unwrap()
            .set_override("worker_pool.workers", 8)
            .unwrap()
            .build()
            .unwrap();

        let config = GatewayConfig::finish(config).unwrap();
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.worker_pool.workers, 8);
        assert_eq!(config.worker_pool.queue_capacity, 1);
        assert_eq!(config.upstream.url, "http://localhost:9001");
    }
}
