//! [`Classifier`] backed by a trained Burn model.

use std::sync::{Mutex, PoisonError};

use burn::tensor::backend::Backend;
use dog_core::{Classifier, Error, ImageDimensions, ImageTensor, Result};
use dog_dataset::images_to_tensor;
use dog_training::{DogDiseaseClassifier, ModelArtifact};
use tracing::debug;

use crate::handle::LoadedModel;

pub struct BurnClassifier<B: Backend> {
    model: Mutex<DogDiseaseClassifier<B>>,
    dims: ImageDimensions,
    device: B::Device,
}

impl<B: Backend> BurnClassifier<B> {
    pub fn new(model: DogDiseaseClassifier<B>, dims: ImageDimensions, device: B::Device) -> Self {
        Self {
            model: Mutex::new(model),
            dims,
            device,
        }
    }

    fn model(&self) -> DogDiseaseClassifier<B> {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<B: Backend> Classifier for BurnClassifier<B> {
    fn num_classes(&self) -> usize {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .num_classes()
    }

    fn input_dims(&self) -> ImageDimensions {
        self.dims
    }

    fn predict_batch(&self, images: &[ImageTensor]) -> Result<Vec<Vec<f32>>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(bad) = images.iter().find(|image| image.dims() != self.dims) {
            return Err(Error::InvalidArgument(format!(
                "expected {} input, got {}",
                self.dims,
                bad.dims()
            )));
        }

        let refs: Vec<&ImageTensor> = images.iter().collect();
        let input = images_to_tensor::<B>(&refs, self.dims, &self.device);
        let output = self.model().forward_softmax(input);
        let [batch, num_classes] = output.dims();

        let flat: Vec<f32> = output
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| Error::Model(format!("Failed to read probabilities: {e:?}")))?;
        debug!("Classified batch of {}", batch);
        Ok(flat.chunks(num_classes).map(<[f32]>::to_vec).collect())
    }
}

/// Load a model artifact into a [`LoadedModel`] ready for serving.
pub fn load_model<B: Backend>(artifact: &ModelArtifact, device: &B::Device) -> Result<LoadedModel> {
    let (model, metadata) = artifact.load::<B>(device)?;
    let classifier = BurnClassifier::new(model, metadata.image_dims, device.clone());
    LoadedModel::new(Box::new(classifier), metadata.labels)
}
