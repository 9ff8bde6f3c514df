//! Error types for model loading and inference.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while loading or running a model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// No usable checkpoint or topology in the data directory.
    #[error("Failed to load model from {data_dir}: {reason}")]
    ModelLoad {
        /// Directory that was searched.
        data_dir: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Model class not found in the registry.
    #[error("Model '{0}' not found in registry")]
    UnknownModel(String),

    /// Invalid load arguments.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The class score to differentiate could not be located.
    #[error("Cannot resolve class score: {0}")]
    GradientResolution(String),

    /// Forward or backward pass failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Checkpoint could not be written.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Core error.
    #[error(transparent)]
    Core(#[from] picasso_core::CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Build a [`ModelError::ModelLoad`].
    pub fn load(data_dir: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            data_dir: data_dir.into(),
            reason: reason.into(),
        }
    }
}
