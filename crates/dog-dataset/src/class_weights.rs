//! Inverse-frequency class weights for the training loss.
//!
//! weight(c) = total / (num_classes * count(c)), the "balanced" heuristic.
//! A perfectly balanced dataset gets weight 1.0 for every class, and
//! sum(weight(c) * count(c)) always equals the number of examples.

use dog_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Per-class loss weights, indexed by class id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWeightTable {
    weights: Vec<f64>,
    counts: Vec<usize>,
}

impl ClassWeightTable {
    /// Uniform weights, used when class weighting is disabled.
    pub fn uniform(num_classes: usize) -> Self {
        Self {
            weights: vec![1.0; num_classes],
            counts: vec![0; num_classes],
        }
    }

    pub fn weight(&self, class_id: usize) -> Option<f64> {
        self.weights.get(class_id).copied()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Observed example count per class.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn num_classes(&self) -> usize {
        self.weights.len()
    }

    /// Weights in the precision the loss function takes.
    pub fn as_loss_weights(&self) -> Vec<f32> {
        self.weights.iter().map(|&w| w as f32).collect()
    }
}

/// Compute balanced class weights from the training labels.
///
/// Fails with [`Error::EmptyClass`] if some class has no examples and with
/// [`Error::InvalidArgument`] if a label is not a valid class id.
pub fn compute_weights(labels: &[usize], num_classes: usize) -> Result<ClassWeightTable> {
    if num_classes == 0 {
        return Err(Error::InvalidArgument("num_classes must be positive".into()));
    }

    let mut counts = vec![0usize; num_classes];
    for &label in labels {
        let slot = counts.get_mut(label).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "label {} is outside the {} known classes",
                label, num_classes
            ))
        })?;
        *slot += 1;
    }

    if let Some(class_id) = counts.iter().position(|&c| c == 0) {
        return Err(Error::EmptyClass { class_id });
    }

    let total = labels.len() as f64;
    let weights = counts
        .iter()
        .map(|&count| total / (num_classes as f64 * count as f64))
        .collect();

    Ok(ClassWeightTable { weights, counts })
}
