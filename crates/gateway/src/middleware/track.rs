//! Request outcome recording

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use gateway_common::metrics::RequestMetrics;
use tracing::info;

/// Label used when no route matched
const UNMATCHED: &str = "unmatched";

/// Record method, route, final status and latency for every request,
/// whichever stage produced the response.
pub async fn track_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED.to_owned());

    let tracker = RequestMetrics::start(&method, &path);
    let response = next.run(request).await;

    let status = response.status().as_u16();
    let elapsed = tracker.finish(status);

    info!(
        method = %method,
        path = %path,
        status,
        latency_ms = elapsed.as_millis() as u64,
        "Request completed"
    );

    response
}
