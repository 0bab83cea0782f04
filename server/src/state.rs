//! Application state for the dog disease server

use std::sync::Arc;
use std::time::Instant;

use dog_core::{Result, ServeConfig};
use dog_inference::{InferenceService, LoadedModel};

/// Produces a fresh model from the artifact on disk
pub type ModelLoader = Box<dyn Fn() -> Result<LoadedModel> + Send + Sync>;

/// Shared application state
pub struct AppState {
    pub config: ServeConfig,
    pub service: InferenceService,
    /// Used by `POST /model/reload`
    pub loader: ModelLoader,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServeConfig, service: InferenceService, loader: ModelLoader) -> Self {
        Self {
            config,
            service,
            loader,
            started_at: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
