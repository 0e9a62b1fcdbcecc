//! Health and metrics endpoints

use axum::extract::State;

use crate::AppState;

/// Liveness probe, independent of auth and rate limiting
pub async fn health() -> &'static str {
    "OK"
}

/// Prometheus exposition of the installed recorder
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
