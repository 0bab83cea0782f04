//! Confidence-gated inference for the dog disease classifier.
//!
//! Raw image bytes go through the shared normalizer, one forward pass and
//! the confidence policy. The model sits behind a [`ModelHandle`] so it can be
//! reloaded while requests are in flight.

pub mod burn_classifier;
pub mod handle;
pub mod policy;
pub mod service;

pub use burn_classifier::{load_model, BurnClassifier};
pub use handle::{LoadedModel, ModelHandle};
pub use policy::{
    round_confidence, ConfidencePolicy, PredictionResult, DEFAULT_LOW_CONFIDENCE_THRESHOLD,
    LOW_CONFIDENCE_ADVISORY,
};
pub use service::InferenceService;
