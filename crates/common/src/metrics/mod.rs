//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the request pipeline with
//! SLO-aligned histograms and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::{Duration, Instant};

/// Metrics prefix for all gateway metrics
pub const METRICS_PREFIX: &str = "gateway";

/// Histogram buckets for request latency (in seconds).
/// Worker-path requests sit in the upper buckets.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

pub fn request_duration_metric() -> String {
    format!("{}_request_duration_seconds", METRICS_PREFIX)
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        request_duration_metric(),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Admission metrics
    describe_counter!(
        format!("{}_rate_limited_total", METRICS_PREFIX),
        Unit::Count,
        "Requests rejected by the rate limiter"
    );

    describe_gauge!(
        format!("{}_rate_limiter_keys", METRICS_PREFIX),
        Unit::Count,
        "Client keys with a token bucket"
    );

    // Worker pool metrics
    describe_counter!(
        format!("{}_worker_jobs_total", METRICS_PREFIX),
        Unit::Count,
        "Jobs processed by the worker pool"
    );

    describe_gauge!(
        format!("{}_worker_queue_depth", METRICS_PREFIX),
        Unit::Count,
        "Jobs waiting in the worker queue"
    );

    // Upstream metrics
    describe_counter!(
        format!("{}_upstream_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Upstream transport failures"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    path: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, path: &str) -> Self {
        Self {
            start: Instant::now(),
            path: path.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion, returning the elapsed time
    pub fn finish(self, status: u16) -> Duration {
        let elapsed = self.start.elapsed();
        record_request(&self.method, &self.path, status, elapsed);
        elapsed
    }
}

/// Count one finished request and observe its latency
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        request_duration_metric(),
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_rate_limited() {
    counter!(format!("{}_rate_limited_total", METRICS_PREFIX)).increment(1);
}

pub fn record_limiter_keys(tracked: usize) {
    gauge!(format!("{}_rate_limiter_keys", METRICS_PREFIX)).set(tracked as f64);
}

pub fn record_job_processed() {
    counter!(format!("{}_worker_jobs_total", METRICS_PREFIX)).increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!(format!("{}_worker_queue_depth", METRICS_PREFIX)).set(depth as f64);
}

pub fn record_upstream_error(kind: &'static str) {
    counter!(
        format!("{}_upstream_errors_total", METRICS_PREFIX),
        "kind" => kind
    )
    .increment(1);
}
