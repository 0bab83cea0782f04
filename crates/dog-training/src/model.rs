//! CNN classifier: convolutional feature extractor plus a shallow dense head.
//!
//! The leading feature-extractor blocks can be frozen so only the later blocks
//! and the head receive gradient updates.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use burn::record::CompactRecorder;
use dog_core::{Error, ModelConfig};
use std::path::PathBuf;

/// Configuration for the DogDiseaseClassifier model
#[derive(Config, Debug)]
pub struct DogDiseaseClassifierConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Input image size (assumes square images)
    #[config(default = "224")]
    pub input_size: usize,

    /// Number of convolutional blocks in the feature extractor
    #[config(default = "5")]
    pub feature_blocks: usize,

    /// Base number of convolutional filters, doubled per block
    #[config(default = "16")]
    pub base_filters: usize,

    /// Units in the dense hidden layer
    #[config(default = "128")]
    pub hidden_units: usize,

    /// Dropout rate before the output layer
    #[config(default = "0.2")]
    pub dropout_rate: f64,
}

impl DogDiseaseClassifierConfig {
    pub fn from_model_config(model: &ModelConfig, num_classes: usize) -> Self {
        Self::new(num_classes)
            .with_input_size(model.image_size as usize)
            .with_feature_blocks(model.feature_blocks)
            .with_base_filters(model.base_filters)
            .with_hidden_units(model.hidden_units)
            .with_dropout_rate(model.dropout)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DogDiseaseClassifier<B> {
        DogDiseaseClassifier::new(self, device)
    }
}

/// Everything needed to build, initialise and freeze a classifier
#[derive(Debug, Clone)]
pub struct ModelSetup {
    pub config: DogDiseaseClassifierConfig,
    pub frozen_blocks: usize,
    /// Model record to start from instead of random weights
    pub pretrained: Option<PathBuf>,
}

impl ModelSetup {
    pub fn from_model_config(model: &ModelConfig, num_classes: usize) -> Self {
        Self {
            config: DogDiseaseClassifierConfig::from_model_config(model, num_classes),
            frozen_blocks: model.frozen_blocks,
            pretrained: model.pretrained_path.clone(),
        }
    }

    pub fn build<B: Backend>(
        &self,
        device: &B::Device,
    ) -> dog_core::Result<DogDiseaseClassifier<B>> {
        if self.frozen_blocks > self.config.feature_blocks {
            return Err(Error::Config(format!(
                "cannot freeze {} of {} feature blocks",
                self.frozen_blocks, self.config.feature_blocks
            )));
        }

        let mut model = self.config.init::<B>(device);
        if let Some(path) = &self.pretrained {
            model = model
                .load_file(path.clone(), &CompactRecorder::new(), device)
                .map_err(|e| Error::Model(format!("Failed to load pretrained weights: {e:?}")))?;
        }
        Ok(model.freeze_feature_blocks(self.frozen_blocks))
    }

    /// Independent copy of `model`.
    ///
    /// `Module::clone` shares batch-norm running statistics with the source model,
    /// so the copy goes through a record into freshly initialised modules.
    pub fn copy_of<B: Backend>(
        &self,
        model: &DogDiseaseClassifier<B>,
        device: &B::Device,
    ) -> DogDiseaseClassifier<B> {
        self.config
            .init::<B>(device)
            .load_record(model.clone().into_record())
            .freeze_feature_blocks(self.frozen_blocks)
    }
}

/// A CNN block with Conv2d, BatchNorm, ReLU, and optional MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        with_pool: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        let pool = if with_pool {
            Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init())
        } else {
            None
        };

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

/// Dog disease classifier
///
/// Architecture:
/// - `feature_blocks` convolutional blocks, filters doubling per block
/// - Global Average Pooling
/// - Dense(hidden_units, relu) -> Dropout -> Dense(num_classes)
#[derive(Module, Debug)]
pub struct DogDiseaseClassifier<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> DogDiseaseClassifier<B> {
    pub fn new(config: &DogDiseaseClassifierConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(config.feature_blocks);
        let mut in_channels = 3;
        let mut out_channels = config.base_filters;
        let mut spatial = config.input_size;

        for _ in 0..config.feature_blocks {
            // Stop halving once the feature map would vanish.
            let with_pool = spatial >= 2;
            blocks.push(ConvBlock::new(in_channels, out_channels, with_pool, device));
            if with_pool {
                spatial /= 2;
            }
            in_channels = out_channels;
            out_channels *= 2;
        }

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc1 = LinearConfig::new(in_channels, config.hidden_units).init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc2 = LinearConfig::new(config.hidden_units, config.num_classes).init(device);

        Self {
            blocks,
            global_pool,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Logits of shape `[batch_size, num_classes]` for input `[batch_size, 3, H, W]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Exclude the first `count` feature blocks from gradient updates.
    pub fn freeze_feature_blocks(mut self, count: usize) -> Self {
        self.blocks = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| if i < count { block.no_grad() } else { block })
            .collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn small_config(num_classes: usize) -> DogDiseaseClassifierConfig {
        DogDiseaseClassifierConfig::new(num_classes)
            .with_input_size(16)
            .with_feature_blocks(3)
            .with_base_filters(4)
            .with_hidden_units(8)
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = small_config(17).init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 17]);
        assert_eq!(model.num_classes(), 17);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = small_config(3).init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let probs: Vec<f32> = model.forward_softmax(input).into_data().to_vec().unwrap();

        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_tiny_input_does_not_over_pool() {
        let device = Default::default();
        let model = small_config(2)
            .with_input_size(4)
            .with_feature_blocks(4)
            .init::<TestBackend>(&device);

        let output = model.forward(Tensor::<TestBackend, 4>::zeros([1, 3, 4, 4], &device));
        assert_eq!(output.dims(), [1, 2]);
    }

    #[test]
    fn test_setup_rejects_overfreezing() {
        let setup = ModelSetup {
            config: small_config(2),
            frozen_blocks: 4,
            pretrained: None,
        };
        assert!(setup.build::<TestBackend>(&Default::default()).is_err());
    }

    #[test]
    fn test_copy_matches_original() {
        let device = Default::default();
        let setup = ModelSetup {
            config: small_config(3),
            frozen_blocks: 1,
            pretrained: None,
        };
        let model = setup.build::<TestBackend>(&device).unwrap();
        let copy = setup.copy_of(&model, &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let a: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = copy.forward(input).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_config.json");
        let config = small_config(5).with_dropout_rate(0.3);

        config.save(&path).unwrap();
        let loaded = DogDiseaseClassifierConfig::load(&path).unwrap();

        assert_eq!(loaded.num_classes, 5);
        assert_eq!(loaded.feature_blocks, 3);
        assert_eq!(loaded.dropout_rate, 0.3);
    }

    #[test]
    fn test_defaults_match_model_config() {
        let config = DogDiseaseClassifierConfig::from_model_config(&ModelConfig::default(), 17);
        assert_eq!(config.input_size, 224);
        assert_eq!(config.hidden_units, 128);
        assert_eq!(config.num_classes, 17);
    }
}
