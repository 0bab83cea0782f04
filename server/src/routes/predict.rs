//! Prediction endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use dog_inference::PredictionResult;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::ApiError;
use crate::state::SharedState;

/// Multipart field carrying the image
const FILE_FIELD: &str = "file";

/// POST /predict - classify one uploaded image
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResult>, ApiError> {
    let request_id = Uuid::new_v4();

    let mut bytes = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await?
    {
        if field.name() == Some(FILE_FIELD) {
            bytes = field.bytes().await?.to_vec();
            break;
        }
    }

    let service_state = state.clone();
    let result = tokio::task::spawn_blocking(move || service_state.service.classify(&bytes))
        .await
        .map_err(|e| ApiError::internal(format!("classification task failed: {e}")))?;

    match result {
        Ok(prediction) => {
            info!(
                %request_id,
                prediction = %prediction.label,
                confidence = prediction.confidence,
                low_confidence = prediction.is_low_confidence(),
                "prediction served"
            );
            Ok(Json(prediction))
        }
        Err(e) => {
            warn!(%request_id, code = e.code(), "prediction rejected: {e}");
            Err(e.into())
        }
    }
}
