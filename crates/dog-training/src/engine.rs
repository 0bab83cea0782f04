//! The numeric engine: one optimization pass and one evaluation pass per call.
//!
//! The controller only talks to [`NumericEngine`]; [`BurnEngine`] is the real
//! implementation (Adam, class-weighted cross-entropy, Burn autodiff).

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    tensor::{activation::softmax, backend::AutodiffBackend, ElementConversion},
};
use dog_core::{Error, Result};
use dog_dataset::{
    AugmentationPipeline, ClassWeightTable, DogDiseaseBatcher, DogDiseaseDataset, DogDiseaseItem,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::model::{DogDiseaseClassifier, ModelSetup};

/// Summary of one optimization pass over the training split
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochFit {
    pub loss: f64,
    pub accuracy: f64,
}

/// Result of one evaluation pass over the held-out split
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationPass {
    pub loss: f64,
    pub accuracy: f64,
    /// One probability vector per validation sample
    pub probabilities: Vec<Vec<f32>>,
    /// True class id per validation sample
    pub targets: Vec<usize>,
}

/// Opaque optimizer/evaluator driven by the training controller.
pub trait NumericEngine {
    /// Cheap copy of the model weights
    type Snapshot: Clone;

    fn fit_epoch(&mut self, learning_rate: f64, class_weights: &ClassWeightTable)
        -> Result<EpochFit>;

    fn evaluate(&mut self) -> Result<ValidationPass>;

    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snapshot: Self::Snapshot);
}

/// Batch size, seed and augmentation for [`BurnEngine`]
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub batch_size: usize,
    pub seed: u64,
    pub augmentation: AugmentationPipeline,
}

/// Burn-backed numeric engine
pub struct BurnEngine<B: AutodiffBackend, O> {
    setup: ModelSetup,
    model: DogDiseaseClassifier<B>,
    optimizer: O,
    train: DogDiseaseDataset,
    validation: DogDiseaseDataset,
    options: EngineOptions,
    rng: ChaCha8Rng,
    device: B::Device,
}

impl<B, O> BurnEngine<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<DogDiseaseClassifier<B>, B>,
{
    /// Build the model from `setup` and wrap it with the optimizer and data.
    pub fn new(
        setup: ModelSetup,
        optimizer: O,
        train: DogDiseaseDataset,
        validation: DogDiseaseDataset,
        options: EngineOptions,
        device: B::Device,
    ) -> Result<Self> {
        if train.is_empty() {
            return Err(Error::Dataset("training split is empty".into()));
        }
        if validation.is_empty() {
            return Err(Error::Dataset("validation split is empty".into()));
        }
        if options.batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be positive".into()));
        }

        let model = setup.build::<B>(&device)?;
        let rng = ChaCha8Rng::seed_from_u64(options.seed);
        Ok(Self {
            setup,
            model,
            optimizer,
            train,
            validation,
            options,
            rng,
            device,
        })
    }

    pub fn model(&self) -> &DogDiseaseClassifier<B> {
        &self.model
    }

    pub fn into_model(self) -> DogDiseaseClassifier<B> {
        self.model
    }

    fn training_items(&mut self, indices: &[usize]) -> Result<Vec<DogDiseaseItem>> {
        let items = self.train.items();
        indices
            .iter()
            .map(|&i| {
                let item = &items[i];
                let image = if self.options.augmentation.is_enabled() {
                    self.options.augmentation.augment(&item.image, &mut self.rng)?
                } else {
                    item.image.clone()
                };
                Ok(DogDiseaseItem {
                    image,
                    label: item.label,
                })
            })
            .collect()
    }
}

impl<B, O> NumericEngine for BurnEngine<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<DogDiseaseClassifier<B>, B>,
{
    type Snapshot = DogDiseaseClassifier<B>;

    fn fit_epoch(
        &mut self,
        learning_rate: f64,
        class_weights: &ClassWeightTable,
    ) -> Result<EpochFit> {
        let batcher = DogDiseaseBatcher::<B>::new(self.device.clone(), self.train.dims());
        let loss_fn = CrossEntropyLossConfig::new()
            .with_weights(Some(class_weights.as_loss_weights()))
            .init(&self.device);

        let mut indices: Vec<usize> = (0..self.train.len()).collect();
        indices.shuffle(&mut self.rng);

        let num_batches = indices.len().div_ceil(self.options.batch_size);
        let mut total_loss = 0.0;
        let mut correct = 0usize;
        let mut total = 0usize;

        for (batch_idx, chunk) in indices.chunks(self.options.batch_size).enumerate() {
            let batch = batcher.batch(self.training_items(chunk)?);
            let batch_len = chunk.len();

            let output = self.model.forward(batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(Error::Training(format!(
                    "non-finite loss {loss_value} at batch {}",
                    batch_idx + 1
                )));
            }
            total_loss += loss_value * batch_len as f64;

            let batch_correct: i64 = output
                .argmax(1)
                .squeeze::<1>(1)
                .equal(batch.targets)
                .int()
                .sum()
                .into_scalar()
                .elem();
            correct += batch_correct as usize;
            total += batch_len;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self.optimizer.step(learning_rate, self.model.clone(), grads);

            if (batch_idx + 1) % 10 == 0 || batch_idx + 1 == num_batches {
                debug!(
                    "  Batch {}/{}: loss = {:.4}, acc = {:.2}%",
                    batch_idx + 1,
                    num_batches,
                    loss_value,
                    100.0 * correct as f64 / total as f64
                );
            }
        }

        Ok(EpochFit {
            loss: total_loss / total as f64,
            accuracy: correct as f64 / total as f64,
        })
    }

    fn evaluate(&mut self) -> Result<ValidationPass> {
        let model = self.model.valid();
        let batcher =
            DogDiseaseBatcher::<B::InnerBackend>::new(self.device.clone(), self.validation.dims());
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);

        let mut total_loss = 0.0;
        let mut probabilities = Vec::with_capacity(self.validation.len());
        let mut targets = Vec::with_capacity(self.validation.len());

        for chunk in self.validation.items().chunks(self.options.batch_size) {
            let batch = batcher.batch(chunk.to_vec());
            let logits = model.forward(batch.images);
            let [batch_len, num_classes] = logits.dims();

            let loss: f64 = loss_fn
                .forward(logits.clone(), batch.targets)
                .into_scalar()
                .elem();
            total_loss += loss * batch_len as f64;

            let flat: Vec<f32> = softmax(logits, 1)
                .into_data()
                .convert::<f32>()
                .to_vec()
                .map_err(|e| Error::Model(format!("Failed to read probabilities: {e:?}")))?;
            probabilities.extend(flat.chunks(num_classes).map(<[f32]>::to_vec));
            targets.extend(chunk.iter().map(|item| item.label));
        }

        let n = targets.len() as f64;
        let correct = probabilities
            .iter()
            .zip(&targets)
            .filter(|&(probs, &target)| dog_core::argmax(probs) == Some(target))
            .count();

        let pass = ValidationPass {
            loss: total_loss / n,
            accuracy: correct as f64 / n,
            probabilities,
            targets,
        };
        info!(
            "Evaluation: loss = {:.4}, accuracy = {:.2}%, samples = {}",
            pass.loss,
            pass.accuracy * 100.0,
            pass.targets.len()
        );
        Ok(pass)
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.setup.copy_of(&self.model, &self.device)
    }

    fn restore(&mut self, snapshot: Self::Snapshot) {
        self.model = snapshot;
    }
}
