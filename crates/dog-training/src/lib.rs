//! Training infrastructure for the dog disease classifier.
//!
//! This crate provides:
//! - The CNN classifier with a freezable feature extractor
//! - The numeric engine (one fit pass, one evaluation pass)
//! - The epoch controller with checkpoint, plateau and early-stopping policies
//! - Model artifacts and the evaluation reporter

pub mod backend;
pub mod checkpoint;
pub mod controller;
pub mod early_stopping;
pub mod engine;
pub mod evaluator;
pub mod lr_schedule;
pub mod model;

pub use checkpoint::{
    ArtifactMetadata, ArtifactWriter, CheckpointPolicy, CheckpointSink, CheckpointState,
    ModelArtifact,
};
pub use controller::{ControllerConfig, ControllerState, TrainingController, TrainingOutcome};
pub use early_stopping::EarlyStopping;
pub use engine::{BurnEngine, EngineOptions, EpochFit, NumericEngine, ValidationPass};
pub use evaluator::{EvaluationReport, EvaluationReporter, ReportOptions};
pub use lr_schedule::{PlateauConfig, ReduceLrOnPlateau};
pub use model::{DogDiseaseClassifier, DogDiseaseClassifierConfig, ModelSetup};

/// Re-export commonly used types
pub mod prelude {
    pub use super::checkpoint::{CheckpointPolicy, CheckpointSink, ModelArtifact};
    pub use super::controller::{ControllerConfig, ControllerState, TrainingController};
    pub use super::engine::{BurnEngine, NumericEngine};
    pub use super::evaluator::{EvaluationReporter, ReportOptions};
    pub use super::model::{DogDiseaseClassifier, DogDiseaseClassifierConfig, ModelSetup};
}
