//! Burn Dataset and Batcher integration.
//!
//! Images are normalized once when the dataset is built and kept in memory;
//! batches are assembled channel-first as `[batch, 3, height, width]`.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use dog_core::{Error, ImageDimensions, ImageTensor, Result};
use tracing::info;

use crate::loader::ImageSample;
use crate::preprocess::ImageNormalizer;

/// A single normalized image with its class id
#[derive(Clone, Debug)]
pub struct DogDiseaseItem {
    pub image: ImageTensor,
    pub label: usize,
}

/// In-memory dataset of normalized images
#[derive(Clone, Debug)]
pub struct DogDiseaseDataset {
    items: Vec<DogDiseaseItem>,
    dims: ImageDimensions,
}

impl DogDiseaseDataset {
    /// Decode and normalize every sample; an unreadable file fails the whole load.
    pub fn load(samples: &[ImageSample], normalizer: &ImageNormalizer) -> Result<Self> {
        let items = samples
            .iter()
            .map(|sample| {
                Ok(DogDiseaseItem {
                    image: normalizer.normalize_path(&sample.path)?,
                    label: sample.label,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Loaded {} images at {}", items.len(), normalizer.target());

        Ok(Self {
            items,
            dims: normalizer.target(),
        })
    }

    /// Build from already-normalized items, all of the same resolution.
    pub fn from_items(items: Vec<DogDiseaseItem>, dims: ImageDimensions) -> Result<Self> {
        if let Some(bad) = items.iter().find(|item| item.image.dims() != dims) {
            return Err(Error::Dataset(format!(
                "item has dimensions {}, expected {}",
                bad.image.dims(),
                dims
            )));
        }
        Ok(Self { items, dims })
    }

    pub fn dims(&self) -> ImageDimensions {
        self.dims
    }

    pub fn labels(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.label).collect()
    }

    pub fn items(&self) -> &[DogDiseaseItem] {
        &self.items
    }
}

impl Dataset<DogDiseaseItem> for DogDiseaseDataset {
    fn get(&self, index: usize) -> Option<DogDiseaseItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of images and targets
#[derive(Clone, Debug)]
pub struct DogDiseaseBatch<B: Backend> {
    /// Shape `[batch_size, 3, height, width]`
    pub images: Tensor<B, 4>,
    /// Shape `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

/// Stack normalized images into a channel-first tensor.
///
/// Used by both the training batcher and the inference classifier.
pub fn images_to_tensor<B: Backend>(
    images: &[&ImageTensor],
    dims: ImageDimensions,
    device: &B::Device,
) -> Tensor<B, 4> {
    let data: Vec<f32> = images.iter().flat_map(|image| image.to_chw()).collect();
    Tensor::<B, 4>::from_floats(
        TensorData::new(
            data,
            [images.len(), 3, dims.height as usize, dims.width as usize],
        ),
        device,
    )
}

#[derive(Clone, Debug)]
pub struct DogDiseaseBatcher<B: Backend> {
    device: B::Device,
    dims: ImageDimensions,
}

impl<B: Backend> DogDiseaseBatcher<B> {
    pub fn new(device: B::Device, dims: ImageDimensions) -> Self {
        Self { device, dims }
    }
}

impl<B: Backend> Batcher<DogDiseaseItem, DogDiseaseBatch<B>> for DogDiseaseBatcher<B> {
    fn batch(&self, items: Vec<DogDiseaseItem>) -> DogDiseaseBatch<B> {
        let images: Vec<&ImageTensor> = items.iter().map(|item| &item.image).collect();
        let images = images_to_tensor::<B>(&images, self.dims, &self.device);

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [items.len()]),
            &self.device,
        );

        DogDiseaseBatch { images, targets }
    }
}
