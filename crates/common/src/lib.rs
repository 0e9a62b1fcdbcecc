//! API Gateway Common Library
//!
//! Shared building blocks of the admission-and-dispatch pipeline:
//! - Bearer token authentication
//! - Per-client token bucket rate limiting
//! - Bounded worker pool with per-job response rendezvous
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod ratelimit;
pub mod worker;

// Re-export commonly used types
pub use auth::{AuthError, Claims, JwtManager};
pub use config::GatewayConfig;
pub use errors::{AppError, Result};
pub use ratelimit::RateLimiter;
pub use worker::{Job, JobHandler, PoolError, WorkerPool};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
