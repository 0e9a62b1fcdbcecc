//! Upstream forwarding

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    response::Response,
};
use gateway_common::errors::Result;
use std::net::SocketAddr;

use crate::AppState;

pub async fn proxy(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Result<Response<Body>> {
    let response = state.proxy.forward(request, Some(addr.ip())).await?;
    Ok(response)
}
