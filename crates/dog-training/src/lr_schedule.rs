//! Reduce-on-plateau learning rate policy.
//!
//! Monitors the validation loss. After `patience` consecutive epochs without an
//! improvement of at least `min_delta`, the rate is multiplied by `factor`
//! (floored at `min_lr`) and the counter starts over.

use dog_core::PolicyConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Settings for [`ReduceLrOnPlateau`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateauConfig {
    pub factor: f64,
    pub patience: usize,
    pub min_delta: f64,
    pub min_lr: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            factor: 0.5,
            patience: 2,
            min_delta: 1e-4,
            min_lr: 0.0,
        }
    }
}

impl From<&PolicyConfig> for PlateauConfig {
    fn from(policies: &PolicyConfig) -> Self {
        Self {
            factor: policies.lr_factor,
            patience: policies.lr_patience,
            min_delta: policies.lr_min_delta,
            min_lr: policies.min_lr,
        }
    }
}

/// Learning rate scheduler driven by the validation loss
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    config: PlateauConfig,
    current_lr: f64,
    best_metric: Option<f64>,
    patience_counter: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(config: PlateauConfig, initial_lr: f64) -> Self {
        Self {
            config,
            current_lr: initial_lr,
            best_metric: None,
            patience_counter: 0,
        }
    }

    /// Learning rate to use for the next epoch
    pub fn current_lr(&self) -> f64 {
        self.current_lr
    }

    pub fn patience_counter(&self) -> usize {
        self.patience_counter
    }

    pub fn best_metric(&self) -> Option<f64> {
        self.best_metric
    }

    /// Feed one epoch's validation loss. Returns the new rate if it was reduced.
    ///
    /// A NaN loss counts as no improvement.
    pub fn step(&mut self, val_loss: f64) -> Option<f64> {
        let improved = !val_loss.is_nan()
            && match self.best_metric {
                Some(best) => val_loss < best - self.config.min_delta,
                None => true,
            };

        if improved {
            self.best_metric = Some(val_loss);
            self.patience_counter = 0;
            return None;
        }

        self.patience_counter += 1;
        debug!(
            "Validation loss has not improved for {} epoch(s)",
            self.patience_counter
        );

        if self.patience_counter < self.config.patience {
            return None;
        }

        self.patience_counter = 0;
        let new_lr = (self.current_lr * self.config.factor).max(self.config.min_lr);
        if new_lr < self.current_lr {
            warn!(
                "Validation loss plateaued, reducing learning rate {:.3e} -> {:.3e}",
                self.current_lr, new_lr
            );
            self.current_lr = new_lr;
            Some(new_lr)
        } else {
            None
        }
    }
}
