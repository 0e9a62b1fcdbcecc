//! Route table and layer stack

use axum::{
    error_handling::HandleErrorLayer,
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get},
    BoxError, Router,
};
use gateway_common::{errors::AppError, metrics};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::RequestBodyTimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    handlers,
    middleware::{auth_middleware, rate_limit_middleware, track_middleware},
    AppState,
};

/// Create the gateway router
pub fn create_router(state: AppState) -> Router {
    let write_timeout = state.config.write_timeout();
    let read_timeout = state.config.read_timeout();

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // The write timeout bounds proxied exchanges only; worker jobs may wait
    // on a full queue for as long as it takes.
    let proxied = Router::new()
        .route("/api/", any(handlers::proxy::proxy))
        .route("/api/{*path}", any(handlers::proxy::proxy))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_write_timeout))
                .timeout(write_timeout),
        );

    // route_layer keeps unknown paths at 404; the last layer added runs
    // first, so auth precedes rate limiting.
    let protected = proxied
        .route("/process", any(handlers::process::process))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::health::metrics))
        .merge(protected)
        .layer(from_fn(track_middleware))
        .layer(RequestBodyTimeoutLayer::new(read_timeout))
        .layer(
            ServiceBuilder::new()
                .layer(request_id)
                .layer(propagate_id)
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

async fn handle_write_timeout(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        metrics::record_upstream_error("write_timeout");
        AppError::UpstreamTimeout {
            message: "write timeout elapsed".to_string(),
        }
    } else {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}
