//! Best-model checkpointing and the on-disk model artifact.
//!
//! This module provides:
//! - The best-by-validation-accuracy checkpoint policy
//! - A sink hook that persists each promoted checkpoint
//! - The model artifact (Burn record + JSON metadata carrying the label set)

use std::fs;
use std::path::PathBuf;

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use chrono::Utc;
use dog_core::{Error, ImageDimensions, LabelSet, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{DogDiseaseClassifier, DogDiseaseClassifierConfig};

/// A model snapshot together with the metric it was selected on
#[derive(Debug, Clone)]
pub struct CheckpointState<S> {
    pub snapshot: S,
    pub val_accuracy: f64,
    pub epoch: usize,
}

/// Keeps the single best snapshot by validation accuracy.
///
/// A candidate replaces the current best only when its accuracy is strictly
/// higher; ties and non-finite values never replace it.
#[derive(Debug, Clone)]
pub struct CheckpointPolicy<S> {
    best: Option<CheckpointState<S>>,
}

impl<S> Default for CheckpointPolicy<S> {
    fn default() -> Self {
        Self { best: None }
    }
}

impl<S> CheckpointPolicy<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn improves(&self, val_accuracy: f64) -> bool {
        if !val_accuracy.is_finite() {
            return false;
        }
        match &self.best {
            Some(best) => val_accuracy > best.val_accuracy,
            None => true,
        }
    }

    /// Replace the best checkpoint. Callers check [`Self::improves`] first.
    pub fn promote(&mut self, state: CheckpointState<S>) -> &CheckpointState<S> {
        info!(
            "New best model at epoch {}: validation accuracy {:.2}%",
            state.epoch + 1,
            state.val_accuracy * 100.0
        );
        self.best.insert(state)
    }

    pub fn best(&self) -> Option<&CheckpointState<S>> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<CheckpointState<S>> {
        self.best
    }
}

/// Receives every promoted checkpoint, e.g. to write it to disk.
pub trait CheckpointSink<S> {
    fn persist(&mut self, state: &CheckpointState<S>) -> Result<()>;
}

/// Metadata stored next to the model record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub labels: LabelSet,
    pub image_dims: ImageDimensions,
    pub model: DogDiseaseClassifierConfig,
    pub epoch: usize,
    pub val_accuracy: f64,
    pub created_at: String,
}

/// File locations of a model artifact: `<dir>/<name>.mpk` and `<dir>/<name>.json`
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    dir: PathBuf,
    name: String,
}

impl ModelArtifact {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// Path handed to the recorder; Burn appends the `.mpk` extension.
    pub fn record_path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    pub fn exists(&self) -> bool {
        self.metadata_path().exists() && self.dir.join(format!("{}.mpk", self.name)).exists()
    }

    pub fn save<B: Backend>(
        &self,
        model: &DogDiseaseClassifier<B>,
        metadata: &ArtifactMetadata,
    ) -> Result<()> {
        metadata.labels.ensure_matches_outputs(model.num_classes())?;
        fs::create_dir_all(&self.dir)?;

        model
            .clone()
            .save_file(self.record_path(), &CompactRecorder::new())
            .map_err(|e| Error::Model(format!("Failed to save model: {e:?}")))?;

        fs::write(self.metadata_path(), serde_json::to_string_pretty(metadata)?)?;

        info!("Model artifact saved to {:?}", self.record_path());
        Ok(())
    }

    pub fn load_metadata(&self) -> Result<ArtifactMetadata> {
        let path = self.metadata_path();
        let json = fs::read_to_string(&path)
            .map_err(|e| Error::NotFound(format!("artifact metadata {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Load the model and its metadata, checking labels against the output width.
    pub fn load<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<(DogDiseaseClassifier<B>, ArtifactMetadata)> {
        let metadata = self.load_metadata()?;
        metadata.labels.ensure_matches_outputs(metadata.model.num_classes)?;

        let model = metadata
            .model
            .init::<B>(device)
            .load_file(self.record_path(), &CompactRecorder::new(), device)
            .map_err(|e| Error::Model(format!("Failed to load model: {e:?}")))?;

        metadata.labels.ensure_matches_outputs(model.num_classes())?;

        info!(
            "Loaded model artifact {:?} ({} classes, epoch {}, val accuracy {:.2}%)",
            self.record_path(),
            metadata.labels.count(),
            metadata.epoch + 1,
            metadata.val_accuracy * 100.0
        );
        Ok((model, metadata))
    }
}

/// Checkpoint sink that writes each promoted model as the artifact
pub struct ArtifactWriter {
    artifact: ModelArtifact,
    labels: LabelSet,
    model_config: DogDiseaseClassifierConfig,
}

impl ArtifactWriter {
    pub fn new(
        artifact: ModelArtifact,
        labels: LabelSet,
        model_config: DogDiseaseClassifierConfig,
    ) -> Self {
        Self {
            artifact,
            labels,
            model_config,
        }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }
}

impl<B: Backend> CheckpointSink<DogDiseaseClassifier<B>> for ArtifactWriter {
    fn persist(&mut self, state: &CheckpointState<DogDiseaseClassifier<B>>) -> Result<()> {
        let size = self.model_config.input_size as u32;
        let metadata = ArtifactMetadata {
            labels: self.labels.clone(),
            image_dims: ImageDimensions::square(size),
            model: self.model_config.clone(),
            epoch: state.epoch,
            val_accuracy: state.val_accuracy,
            created_at: Utc::now().to_rfc3339(),
        };
        self.artifact.save(&state.snapshot, &metadata)
    }
}
