//! HTTP routes

mod error;
pub mod health;
pub mod model;
pub mod predict;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/predict", post(predict::predict))
        .route("/model/reload", post(model::reload_model))
        .with_state(state)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use dog_core::{Classifier, ImageDimensions, ImageTensor, LabelSet, Result, ServeConfig};
    use dog_inference::{ConfidencePolicy, InferenceService, LoadedModel};
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::state::{AppState, ModelLoader};

    const BOUNDARY: &str = "dog-disease-test-boundary";

    struct Constant(Vec<f32>);

    impl Classifier for Constant {
        fn num_classes(&self) -> usize {
            self.0.len()
        }

        fn input_dims(&self) -> ImageDimensions {
            ImageDimensions::square(4)
        }

        fn predict_batch(&self, images: &[ImageTensor]) -> Result<Vec<Vec<f32>>> {
            Ok(images.iter().map(|_| self.0.clone()).collect())
        }
    }

    fn loaded(probs: Vec<f32>, labels: &[&str]) -> LoadedModel {
        LoadedModel::new(Box::new(Constant(probs)), LabelSet::new(labels.iter().copied()).unwrap())
            .unwrap()
    }

    fn app(probs: Vec<f32>) -> Router {
        app_with_config(probs, ServeConfig::default())
    }

    fn app_with_config(probs: Vec<f32>, config: ServeConfig) -> Router {
        let service = InferenceService::new(loaded(probs, &["A", "B", "C"]), ConfidencePolicy::default());
        let loader: ModelLoader = Box::new(|| Ok(loaded(vec![0.8, 0.2], &["healthy", "mange"])));
        router(Arc::new(AppState::new(config, service, loader)))
    }

    /// Uncompressed noise PNG of roughly `3 * side * side` bytes.
    fn large_png(side: u32) -> Vec<u8> {
        let mut state = 0x2545_f491_u32;
        let image = RgbImage::from_fn(side, side, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            Rgb([r, g, b])
        });
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(6, 6, Rgb([10, 200, 90]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn multipart_request(field: &str, payload: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"dog.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_predict_returns_label_and_confidence() {
        let response = app(vec![0.1, 0.7, 0.2])
            .oneshot(multipart_request("file", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["prediction"], "B");
        assert_eq!(body["confidence"], 70.0);
        assert!(body.get("advisory").is_none());
    }

    #[tokio::test]
    async fn test_predict_low_confidence_has_advisory() {
        let response = app(vec![0.4, 0.35, 0.25])
            .oneshot(multipart_request("file", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["prediction"], "A");
        assert_eq!(body["advisory"], dog_inference::LOW_CONFIDENCE_ADVISORY);
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_bad_request() {
        let response = app(vec![0.1, 0.7, 0.2])
            .oneshot(multipart_request("file", b"not an image"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "DecodeError");
        assert!(body.get("prediction").is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_input() {
        let response = app(vec![0.1, 0.7, 0.2])
            .oneshot(multipart_request("picture", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "EmptyInputError");
    }

    #[tokio::test]
    async fn test_health_reports_classes() {
        let response = app(vec![0.1, 0.7, 0.2])
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["classes"], 3);
    }

    #[tokio::test]
    async fn test_reload_swaps_model() {
        let app = app(vec![0.1, 0.7, 0.2]);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/model/reload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["classes"], 2);
        assert_eq!(body["previous_classes"], 3);

        let response = app.oneshot(multipart_request("file", &png())).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["prediction"], "healthy");
    }

    #[tokio::test]
    async fn test_upload_larger_than_two_megabytes_is_classified() {
        let photo = large_png(1000);
        assert!(photo.len() > 2 * 1024 * 1024);

        let response = app(vec![0.1, 0.7, 0.2])
            .oneshot(multipart_request("file", &photo))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["prediction"], "B");
    }

    #[tokio::test]
    async fn test_upload_over_configured_limit_is_rejected() {
        let config = ServeConfig {
            max_upload_bytes: 1024,
            ..ServeConfig::default()
        };
        let response = app_with_config(vec![0.1, 0.7, 0.2], config)
            .oneshot(multipart_request("file", &large_png(64)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "PayloadTooLarge");
    }
}
