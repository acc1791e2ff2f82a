//! Response DTOs.

use serde::Serialize;

use imagemesh_pipeline::MetricsSnapshot;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` when the model is loaded, `"degraded"` otherwise.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Whether conversions can be served.
    pub model_loaded: bool,
    /// Resolved model directory.
    pub model_dir: String,
    /// Free conversion slots.
    pub available_slots: usize,
    /// Conversion counters and latencies.
    pub metrics: MetricsSnapshot,
}
