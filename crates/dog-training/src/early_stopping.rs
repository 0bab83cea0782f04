//! Early stopping on validation accuracy.

use dog_core::PolicyConfig;
use tracing::{debug, warn};

/// Stops the run after `patience` epochs without a validation-accuracy gain.
///
/// Keeps its own best value and counter, independent of the checkpoint and
/// learning-rate policies.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    best: Option<f64>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            best: None,
            wait: 0,
        }
    }

    pub fn from_policies(policies: &PolicyConfig) -> Self {
        Self::new(
            policies.early_stopping_patience,
            policies.early_stopping_min_delta,
        )
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.wait
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Feed one epoch's validation accuracy. Returns `true` when training should stop.
    pub fn step(&mut self, val_accuracy: f64) -> bool {
        let improved = !val_accuracy.is_nan()
            && self
                .best
                .map_or(true, |best| val_accuracy - self.min_delta > best);

        if improved {
            self.best = Some(val_accuracy);
            self.wait = 0;
            return false;
        }

        self.wait += 1;
        debug!(
            "No validation accuracy improvement for {} epoch(s) (best: {:?})",
            self.wait, self.best
        );

        if self.wait >= self.patience {
            warn!(
                "Early stopping triggered after {} epochs without improvement",
                self.wait
            );
            return true;
        }
        false
    }
}
