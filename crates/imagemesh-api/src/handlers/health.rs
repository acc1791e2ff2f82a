//! Health check handler.

use axum::Json;
use axum::extract::State;

use crate::dto::response::HealthResponse;
use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let converter = &state.converter;
    let model_loaded = converter.is_ready();

    Json(HealthResponse {
        status: if model_loaded { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        model_loaded,
        model_dir: converter.model_dir().display().to_string(),
        available_slots: converter.available_slots(),
        metrics: converter.metrics().snapshot(),
    })
}
