//! The classification entry point used by the server and the CLI predictor.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use dog_core::{Error, Result};
use dog_dataset::ImageNormalizer;
use tracing::debug;

use crate::handle::{LoadedModel, ModelHandle};
use crate::policy::{ConfidencePolicy, PredictionResult};

/// Normalize, classify and gate one image at a time.
///
/// Holds no per-request state; concurrent calls share the current model.
#[derive(Debug)]
pub struct InferenceService {
    handle: ModelHandle,
    policy: ConfidencePolicy,
}

impl InferenceService {
    pub fn new(model: LoadedModel, policy: ConfidencePolicy) -> Self {
        Self {
            handle: ModelHandle::new(model),
            policy,
        }
    }

    pub fn policy(&self) -> ConfidencePolicy {
        self.policy
    }

    pub fn current_model(&self) -> Arc<LoadedModel> {
        self.handle.current()
    }

    /// Replace the served model; in-flight requests finish on the old one.
    pub fn reload(&self, model: LoadedModel) -> Arc<LoadedModel> {
        self.handle.swap(model)
    }

    pub fn classify(&self, raw: &[u8]) -> Result<PredictionResult> {
        if raw.is_empty() {
            return Err(Error::EmptyInput);
        }

        let model = self.handle.current();
        let normalizer = ImageNormalizer::new(model.classifier().input_dims());
        let image = normalizer.normalize(raw)?;

        let probabilities = model.classifier().predict(&image)?;
        let result = self.policy.apply(&probabilities, model.labels())?;
        debug!(
            "Predicted {} ({:.2}%){}",
            result.label,
            result.confidence,
            if result.advisory.is_some() { " [low confidence]" } else { "" }
        );
        Ok(result)
    }

    pub fn classify_path(&self, path: &Path) -> Result<PredictionResult> {
        let raw = fs::read(path)
            .map_err(|e| Error::NotFound(format!("image {}: {e}", path.display())))?;
        self.classify(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::LOW_CONFIDENCE_ADVISORY;
    use dog_core::{Classifier, ImageDimensions, ImageTensor, LabelSet};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    struct Constant(Vec<f32>);

    impl Classifier for Constant {
        fn num_classes(&self) -> usize {
            self.0.len()
        }

        fn input_dims(&self) -> ImageDimensions {
            ImageDimensions::square(4)
        }

        fn predict_batch(&self, images: &[ImageTensor]) -> Result<Vec<Vec<f32>>> {
            assert!(images.iter().all(|i| i.dims() == ImageDimensions::square(4)));
            Ok(images.iter().map(|_| self.0.clone()).collect())
        }
    }

    fn service(probs: Vec<f32>) -> InferenceService {
        let model = LoadedModel::new(
            Box::new(Constant(probs)),
            LabelSet::new(["A", "B", "C"]).unwrap(),
        )
        .unwrap();
        InferenceService::new(model, ConfidencePolicy::default())
    }

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(10, 6, Rgb([120, 30, 200]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_classify_confident() {
        let result = service(vec![0.1, 0.7, 0.2]).classify(&png_bytes()).unwrap();
        assert_eq!(result.label, "B");
        assert_eq!(result.confidence, 70.0);
        assert!(result.advisory.is_none());
    }

    #[test]
    fn test_classify_low_confidence() {
        let result = service(vec![0.4, 0.35, 0.25]).classify(&png_bytes()).unwrap();
        assert_eq!(result.class_id, 0);
        assert_eq!(result.confidence, 40.0);
        assert_eq!(result.advisory.as_deref(), Some(LOW_CONFIDENCE_ADVISORY));
    }

    #[test]
    fn test_empty_input() {
        let err = service(vec![0.1, 0.7, 0.2]).classify(&[]).unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
        assert_eq!(err.code(), "EmptyInputError");
    }

    #[test]
    fn test_undecodable_input() {
        let err = service(vec![0.1, 0.7, 0.2])
            .classify(b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(err.code(), "DecodeError");
    }

    #[test]
    fn test_reload_changes_labels() {
        let service = service(vec![0.1, 0.7, 0.2]);
        service.reload(
            LoadedModel::new(
                Box::new(Constant(vec![0.9, 0.1])),
                LabelSet::new(["healthy", "mange"]).unwrap(),
            )
            .unwrap(),
        );

        let result = service.classify(&png_bytes()).unwrap();
        assert_eq!(result.label, "healthy");
        assert_eq!(result.confidence, 90.0);
    }

    #[test]
    fn test_concurrent_classification() {
        let service = Arc::new(service(vec![0.1, 0.7, 0.2]));
        let bytes = Arc::new(png_bytes());

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                let bytes = Arc::clone(&bytes);
                std::thread::spawn(move || service.classify(&bytes).unwrap())
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap().label, "B");
        }
    }
}
