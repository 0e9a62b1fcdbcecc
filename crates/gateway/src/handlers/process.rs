//! Worker pool dispatch

use axum::{body::Bytes, extract::State};
use gateway_common::errors::Result;

use crate::AppState;

/// Hand the request body to the pool and reply with the worker's output.
///
/// Waits for a queue slot when the pool is saturated.
pub async fn process(State(state): State<AppState>, body: Bytes) -> Result<Bytes> {
    let reply = state.pool.dispatch(body).await?;
    Ok(reply)
}
