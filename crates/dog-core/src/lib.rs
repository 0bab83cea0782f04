//! Core types and utilities for dog skin/eye disease classification.
//!
//! This crate provides the label registry, image tensor type, metrics,
//! configuration and error types shared across the workspace.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod types;

pub use classifier::Classifier;
pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use labels::{LabelSet, DOG_DISEASE_CLASSES};
pub use metrics::*;
pub use types::*;

/// Re-export commonly used burn types
pub mod prelude {
    pub use burn::prelude::*;
    pub use crate::classifier::Classifier;
    pub use crate::config::*;
    pub use crate::error::{Error, Result};
    pub use crate::labels::LabelSet;
    pub use crate::metrics::*;
    pub use crate::types::*;
}
