//! Error types for visualizations.

use thiserror::Error;

/// Result type alias for visualization operations.
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors that can occur while configuring or running a visualization.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// A setting value outside the allowed list.
    #[error("Invalid value '{value}' for setting '{setting}' of {visualizer}")]
    InvalidSetting {
        /// Visualizer being configured.
        visualizer: String,
        /// Setting name.
        setting: String,
        /// Rejected value.
        value: String,
    },

    /// Visualizer not found in the registry.
    #[error("Visualization '{0}' not found in registry")]
    UnknownVisualizer(String),

    /// The model lacks a capability the visualizer needs.
    #[error("{visualizer} cannot explain this model: {reason}")]
    IncompatibleModel {
        /// Visualizer that was run.
        visualizer: String,
        /// Missing capability.
        reason: String,
    },

    /// A font file that could not be parsed.
    #[error("Cannot parse font '{0}'")]
    Font(String),

    /// Model error.
    #[error(transparent)]
    Model(#[from] picasso_models::ModelError),

    /// Core error.
    #[error(transparent)]
    Core(#[from] picasso_core::CoreError),

    /// Image encoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
