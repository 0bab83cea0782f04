//! Confidence gating: turn a probability vector into a labelled prediction.

use dog_core::{argmax, Error, LabelSet, Result};
use serde::{Deserialize, Serialize};

/// Attached to predictions whose confidence falls below the threshold.
pub const LOW_CONFIDENCE_ADVISORY: &str = "low confidence: request a clearer image";

/// Confidence in percent below which the advisory is attached.
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f64 = 50.0;

/// Result of a single classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted class name
    #[serde(rename = "prediction")]
    pub label: String,

    #[serde(skip)]
    pub class_id: usize,

    /// Winning probability in percent, rounded to two decimals
    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}

impl PredictionResult {
    pub fn is_low_confidence(&self) -> bool {
        self.advisory.is_some()
    }
}

/// Probability in `[0, 1]` to a percentage with two decimals.
pub fn round_confidence(probability: f32) -> f64 {
    (f64::from(probability) * 10_000.0).round() / 100.0
}

/// Picks the label and decides whether the result needs an advisory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidencePolicy {
    threshold: f64,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LOW_CONFIDENCE_THRESHOLD)
    }
}

impl ConfidencePolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Label the probability vector. The label is always returned; only the
    /// advisory depends on the confidence.
    pub fn apply(&self, probabilities: &[f32], labels: &LabelSet) -> Result<PredictionResult> {
        labels.ensure_matches_outputs(probabilities.len())?;
        let class_id = argmax(probabilities)
            .ok_or_else(|| Error::Model("model produced no finite probability".into()))?;

        let confidence = round_confidence(probabilities[class_id]);
        let advisory = (confidence < self.threshold).then(|| LOW_CONFIDENCE_ADVISORY.to_string());

        Ok(PredictionResult {
            label: labels.label_for(class_id)?.to_string(),
            class_id,
            confidence,
            advisory,
        })
    }
}
