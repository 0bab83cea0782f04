//! Model management endpoint

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::info;

use super::error::ApiError;
use crate::state::SharedState;

#[derive(Serialize)]
pub struct ReloadResponse {
    pub status: String,
    pub classes: usize,
    pub previous_classes: usize,
}

/// POST /model/reload - load the artifact again and swap it in
pub async fn reload_model(State(state): State<SharedState>) -> Result<Json<ReloadResponse>, ApiError> {
    let loader_state = state.clone();
    let model = tokio::task::spawn_blocking(move || (loader_state.loader)())
        .await
        .map_err(|e| ApiError::internal(format!("reload task failed: {e}")))??;

    let classes = model.labels().count();
    let previous = state.service.reload(model);
    info!("Model reloaded ({} classes)", classes);

    Ok(Json(ReloadResponse {
        status: "reloaded".to_string(),
        classes,
        previous_classes: previous.labels().count(),
    }))
}
