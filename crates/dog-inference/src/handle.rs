//! Shared, swappable reference to the loaded model.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use dog_core::{Classifier, LabelSet, Result};
use tracing::info;

/// A classifier paired with the label set it was trained on
pub struct LoadedModel {
    classifier: Box<dyn Classifier>,
    labels: LabelSet,
    loaded_at: DateTime<Utc>,
}

impl LoadedModel {
    /// Fails when the label count differs from the classifier's output width.
    pub fn new(classifier: Box<dyn Classifier>, labels: LabelSet) -> Result<Self> {
        labels.ensure_matches_outputs(classifier.num_classes())?;
        Ok(Self {
            classifier,
            labels,
            loaded_at: Utc::now(),
        })
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("classes", &self.labels.count())
            .field("input_dims", &self.classifier.input_dims())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Read-mostly handle. Readers clone the `Arc` and keep their model alive
/// for as long as they need it; `swap` only replaces the reference.
#[derive(Debug)]
pub struct ModelHandle {
    current: RwLock<Arc<LoadedModel>>,
}

impl ModelHandle {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            current: RwLock::new(Arc::new(model)),
        }
    }

    pub fn current(&self) -> Arc<LoadedModel> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Install `model` and return the one it replaced.
    pub fn swap(&self, model: LoadedModel) -> Arc<LoadedModel> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *guard, Arc::new(model));
        info!(
            "Swapped model: {} -> {} classes",
            previous.labels.count(),
            guard.labels.count()
        );
        previous
    }
}
