//! Error types for the dog disease classifier.

use thiserror::Error;

/// Main error type shared by every crate in the workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raw bytes could not be decoded into an image
    #[error("Decode error: {0}")]
    Decode(String),

    /// A classification request carried no image bytes
    #[error("Empty input: no image bytes were provided")]
    EmptyInput,

    /// A class index outside the label set was requested
    #[error("Index out of range: {index} (label set has {len} classes)")]
    IndexOutOfRange { index: usize, len: usize },

    /// A class had no examples when computing balance weights
    #[error("Empty class: class {class_id} has no training examples")]
    EmptyClass { class_id: usize },

    /// The numeric engine failed or produced a non-finite loss
    #[error("Training diverged at epoch {epoch}: {cause}")]
    TrainingDivergence { epoch: usize, cause: String },

    /// Label registry length does not match the classifier output width
    #[error("Label mismatch: {labels} labels but model produces {outputs} outputs")]
    LabelMismatch { labels: usize, outputs: usize },

    /// The run ended without a single checkpoint being promoted
    #[error("No checkpoint: no epoch produced a finite validation accuracy")]
    NoCheckpoint,

    /// Model error
    #[error("Model error: {0}")]
    Model(String),

    /// Dataset error
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Training error
    #[error("Training error: {0}")]
    Training(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Stable reason code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "IoError",
            Error::Decode(_) => "DecodeError",
            Error::EmptyInput => "EmptyInputError",
            Error::IndexOutOfRange { .. } => "IndexOutOfRange",
            Error::EmptyClass { .. } => "EmptyClassError",
            Error::TrainingDivergence { .. } => "TrainingDivergence",
            Error::LabelMismatch { .. } => "LabelMismatch",
            Error::NoCheckpoint => "NoCheckpoint",
            Error::Model(_) => "ModelError",
            Error::Dataset(_) => "DatasetError",
            Error::Config(_) => "ConfigError",
            Error::Training(_) => "TrainingError",
            Error::Serialization(_) => "SerializationError",
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::NotFound(_) => "NotFound",
        }
    }

    /// Whether the error was caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::EmptyInput)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Decode(err.to_string())
    }
}

/// Specialized Result type for classifier operations.
pub type Result<T> = std::result::Result<T, Error>;
