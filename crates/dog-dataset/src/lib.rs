//! Dataset loading, normalization and class balancing for dog disease images.
//!
//! This crate provides the image normalizer shared by training and serving,
//! the class-balance estimator, directory scanning, augmentation and the
//! Burn dataset/batcher glue.

pub mod augmentation;
pub mod burn_dataset;
pub mod class_weights;
pub mod loader;
pub mod preprocess;

pub use augmentation::AugmentationPipeline;
pub use burn_dataset::{
    images_to_tensor, DogDiseaseBatch, DogDiseaseBatcher, DogDiseaseDataset, DogDiseaseItem,
};
pub use class_weights::{compute_weights, ClassWeightTable};
pub use loader::{scan_images, DatasetScanner, ImageSample, ScannedDataset};
pub use preprocess::ImageNormalizer;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::augmentation::*;
    pub use crate::burn_dataset::*;
    pub use crate::class_weights::*;
    pub use crate::loader::*;
    pub use crate::preprocess::*;
}
