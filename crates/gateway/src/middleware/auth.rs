//! Bearer token gate

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use gateway_common::{auth::bearer_from_headers, errors::AppError};
use tracing::warn;

use crate::AppState;

/// Reject requests without a valid bearer token.
///
/// On success the verified [`Claims`](gateway_common::Claims) are attached to
/// the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_from_headers(request.headers())
        .and_then(|token| state.jwt.validate(token))
        .map_err(|e| {
            warn!(reason = e.reason(), path = %request.uri().path(), "Authentication rejected");
            AppError::from(e)
        })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
