//! Route definitions for the ImageMesh HTTP API.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the router with every route and its request-level layers.
///
/// The upload limit comes from `server.max_upload_mb`; bodies over it are
/// answered with 413 and any partially written upload is removed.
pub fn build_router(state: AppState) -> Router {
    let max_upload = state.config.server.max_upload_bytes();

    Router::new()
        .route("/convert", post(handlers::convert::convert_image))
        .route("/health", get(handlers::health::health))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::logging::request_logging,
        ))
        .with_state(state)
}
