//! Configuration structures for training, evaluation and serving.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::ImageDimensions;
use crate::{Error, Result};

/// Main configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Model configuration
    pub model: ModelConfig,
    /// Training hyperparameters
    pub training: TrainingParams,
    /// Control policies applied after each epoch
    pub policies: PolicyConfig,
    /// Data configuration
    pub data: DataConfig,
    /// Output configuration
    pub output: OutputConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            training: TrainingParams::default(),
            policies: PolicyConfig::default(),
            data: DataConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.image_size == 0 {
            return Err(Error::Config("model.image_size must be positive".into()));
        }
        if self.training.epochs == 0 {
            return Err(Error::Config("training.epochs must be positive".into()));
        }
        if self.training.batch_size == 0 {
            return Err(Error::Config("training.batch_size must be positive".into()));
        }
        if !(self.training.learning_rate > 0.0) {
            return Err(Error::Config("training.learning_rate must be positive".into()));
        }
        if !(self.policies.lr_factor > 0.0 && self.policies.lr_factor < 1.0) {
            return Err(Error::Config("policies.lr_factor must lie in (0, 1)".into()));
        }
        if self.policies.lr_patience == 0 || self.policies.early_stopping_patience == 0 {
            return Err(Error::Config("policy patience values must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.data.validation_split) {
            return Err(Error::Config("data.validation_split must lie in [0, 1)".into()));
        }
        if !(0.0..1.0).contains(&self.data.augmentation.zoom_range) {
            return Err(Error::Config("data.augmentation.zoom_range must lie in [0, 1)".into()));
        }
        if !(0.0..=180.0).contains(&self.data.augmentation.rotation_range) {
            return Err(Error::Config(
                "data.augmentation.rotation_range must lie in [0, 180]".into(),
            ));
        }
        Ok(())
    }

    pub fn image_dimensions(&self) -> ImageDimensions {
        ImageDimensions::square(self.model.image_size)
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Square input resolution
    pub image_size: u32,
    /// Number of convolutional blocks in the feature extractor
    pub feature_blocks: usize,
    /// Leading feature-extractor blocks kept frozen during training
    pub frozen_blocks: usize,
    /// Base number of convolutional filters
    pub base_filters: usize,
    /// Units in the dense layer of the classification head
    pub hidden_units: usize,
    /// Dropout rate before the output layer
    pub dropout: f64,
    /// Optional model record used to initialise the weights before freezing
    pub pretrained_path: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            feature_blocks: 5,
            frozen_blocks: 3,
            base_filters: 16,
            hidden_units: 128,
            dropout: 0.2,
            pretrained_path: None,
        }
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Epoch budget
    pub epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Initial learning rate
    pub learning_rate: f64,
    /// Weight the loss by inverse class frequency
    pub class_weighting: bool,
    /// Random seed for shuffling and augmentation
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 32,
            learning_rate: 1e-5,
            class_weighting: true,
            seed: 42,
        }
    }
}

/// Early stopping and learning-rate plateau settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Epochs without validation-accuracy improvement before stopping
    pub early_stopping_patience: usize,
    /// Minimum accuracy gain that counts as an improvement
    pub early_stopping_min_delta: f64,
    /// Epochs without validation-loss improvement before reducing the LR
    pub lr_patience: usize,
    /// Multiplicative LR reduction
    pub lr_factor: f64,
    /// Minimum loss decrease that counts as an improvement
    pub lr_min_delta: f64,
    /// Lower bound for the learning rate
    pub min_lr: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            early_stopping_patience: 5,
            early_stopping_min_delta: 0.0,
            lr_patience: 2,
            lr_factor: 0.5,
            lr_min_delta: 1e-4,
            min_lr: 0.0,
        }
    }
}

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Dataset root with one subdirectory per class
    pub data_dir: PathBuf,
    /// Fraction of every class held out for validation
    pub validation_split: f64,
    /// Training-time augmentation
    pub augmentation: AugmentationConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/dog_disease_dataset"),
            validation_split: 0.2,
            augmentation: AugmentationConfig::default(),
        }
    }
}

/// Augmentation applied to normalized training images
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    pub enabled: bool,
    pub horizontal_flip: bool,
    /// Maximum rotation in degrees, either direction
    pub rotation_range: f64,
    /// Zoom factor is drawn from `[1 - zoom_range, 1 + zoom_range]`
    pub zoom_range: f64,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            horizontal_flip: true,
            rotation_range: 20.0,
            zoom_range: 0.2,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for the model artifact and reports
    pub output_dir: PathBuf,
    /// Base file name of the model artifact
    pub model_name: String,
    /// Write the classification report after training
    pub write_report: bool,
    /// Export the training history as CSV next to the JSON
    pub export_csv: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            model_name: "dog_disease_model".to_string(),
            write_report: true,
            export_csv: true,
        }
    }
}

/// Configuration for the inference service and HTTP server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the model artifact
    pub artifact_dir: PathBuf,
    /// Base file name of the model artifact
    pub model_name: String,
    /// Confidence (percent) below which an advisory is attached
    pub low_confidence_threshold: f64,
    /// Largest accepted request body for uploads
    pub max_upload_bytes: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            artifact_dir: PathBuf::from("output"),
            model_name: "dog_disease_model".to_string(),
            low_confidence_threshold: 50.0,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl ServeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.low_confidence_threshold) {
            return Err(Error::Config(
                "low_confidence_threshold must lie in [0, 100]".into(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_training_config() {
        let config = TrainingConfig::default();
        assert_eq!(config.model.image_size, 224);
        assert_eq!(config.model.hidden_units, 128);
        assert_eq!(config.training.epochs, 20);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.learning_rate, 1e-5);
        assert_eq!(config.policies.early_stopping_patience, 5);
        assert_eq!(config.policies.lr_patience, 2);
        assert_eq!(config.policies.lr_factor, 0.5);
        assert_eq!(config.data.validation_split, 0.2);
        assert_eq!(config.data.augmentation.rotation_range, 20.0);
        assert_eq!(config.data.augmentation.zoom_range, 0.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TrainingConfig = toml::from_str(
            r#"
            [training]
            epochs = 3

            [policies]
            lr_patience = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.policies.lr_patience, 4);
        assert_eq!(config.policies.early_stopping_patience, 5);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = TrainingConfig::default();
        config.policies.lr_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.data.validation_split = 1.0;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.training.epochs = 0;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.data.augmentation.rotation_range = 270.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serve_config_defaults() {
        let config = ServeConfig::default();
        assert_eq!(config.low_confidence_threshold, 50.0);
        assert!(config.validate().is_ok());

        let bad = ServeConfig {
            low_confidence_threshold: 120.0,
            ..ServeConfig::default()
        };
        assert!(bad.validate().is_err());

        assert!(config.max_upload_bytes > 2 * 1024 * 1024);
        let no_uploads = ServeConfig {
            max_upload_bytes: 0,
            ..ServeConfig::default()
        };
        assert!(no_uploads.validate().is_err());
    }

    #[test]
    fn test_shipped_configs_parse() {
        let train: TrainingConfig =
            toml::from_str(include_str!("../../../configs/train.toml")).unwrap();
        assert!(train.validate().is_ok());
        assert_eq!(train.model.frozen_blocks, 3);
        assert_eq!(train.policies.lr_min_delta, 1e-4);

        let serve: ServeConfig =
            toml::from_str(include_str!("../../../configs/serve.toml")).unwrap();
        assert_eq!(serve.port, 8000);
    }
}
