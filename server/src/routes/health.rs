//! Banner and health check endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub classes: usize,
    pub backend: String,
    pub low_confidence_threshold: f64,
}

/// GET / - API banner
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Dog disease classifier API. POST an image to /predict." }))
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        classes: state.service.current_model().labels().count(),
        backend: dog_training::backend::backend_name().to_string(),
        low_confidence_threshold: state.config.low_confidence_threshold,
    })
}
