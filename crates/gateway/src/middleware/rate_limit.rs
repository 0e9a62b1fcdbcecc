//! Rate limiting middleware using the per-client token bucket

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use gateway_common::{errors::AppError, metrics};
use std::net::SocketAddr;

use crate::AppState;

/// Bucket key for a client: its IP address without the port
pub fn client_key(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(&addr);

    if !state.limiter.allow(&key) {
        metrics::record_rate_limited();
        tracing::warn!(client = %key, "Rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    metrics::record_limiter_keys(state.limiter.tracked_keys());
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_key_drops_port() {
        let a: SocketAddr = "10.1.2.3:50000".parse().unwrap();
        let b: SocketAddr = "10.1.2.3:50001".parse().unwrap();
        assert_eq!(client_key(&a), "10.1.2.3");
        assert_eq!(client_key(&a), client_key(&b));

        let v6: SocketAddr = "[::1]:8080".parse().unwrap();
        assert_eq!(client_key(&v6), "::1");
    }
}
