//! # picasso_models
//!
//! Loaded image models for picasso-rs.
//!
//! This crate provides:
//! - The [`Model`] trait every visualizer works against, plus the dense
//!   [`SegmentationModel`] capability
//! - Burn networks ([`network`]) and their serialisable topologies
//! - Checkpoint discovery, restoration and writing ([`checkpoint`])
//! - Concrete models: [`ImageClassifier`] and [`FcnSegmenter`]
//! - A [`ModelRegistry`] resolving class names to loaders
//!
//! ## Example
//!
//! ```rust,ignore
//! use picasso_models::{default_registry, load_model};
//! use serde_json::json;
//!
//! let registry = default_registry();
//! let model = load_model(&registry, "ImageClassifier", &json!({"data_dir": "data-volume"}))?;
//! let batch = model.preprocess(&images)?;
//! let ranked = model.decode(&model.predict(&batch)?);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
mod classifier;
mod error;
mod model;
pub mod network;
pub mod registry;
mod segmenter;
mod session;
pub mod tensor_io;

pub use classifier::ImageClassifier;
pub use error::{ModelError, Result};
pub use model::{
    DenseDecoding, LoadArgs, LoadableModel, Model, ModelMetadata, ScoreHandle, ScoreNode,
    SegmentationModel,
};
pub use registry::{default_registry, load_model, ModelRegistry};
pub use segmenter::{FcnSegmenter, DEFAULT_DISPLAYED, VOC_CLASS_NAMES};
pub use session::Session;

/// Backend type aliases for convenience
pub mod backend {
    pub use burn_autodiff::Autodiff;
    pub use burn_ndarray::NdArray;

    /// Backend used by the registered models.
    pub type DefaultBackend = Autodiff<NdArray>;
}
