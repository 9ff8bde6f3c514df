//! # picasso_explain
//!
//! Visualizations explaining the predictions of a loaded image model.
//!
//! This crate provides:
//! - [`ClassProbabilities`]: the ranked predictions alone
//! - [`PartialOcclusion`]: occlusion-sensitivity heatmaps
//! - [`SaliencyMaps`]: input-gradient saliency
//! - [`SegmentProbabilities`] and [`SaliencySegMaps`] for dense models
//! - A [`VisualizationRegistry`] creating independent instances by name
//!
//! ## Example
//!
//! ```rust,ignore
//! use picasso_explain::default_registry;
//!
//! let registry = default_registry();
//! let mut vis = registry.create("SaliencyMaps", model)?;
//! vis.update_settings(&[("Transparency".into(), "0.5".into())].into())?;
//! let results = vis.make_visualization(&inputs, "outputs".as_ref())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod class_probabilities;
mod error;
mod occlusion;
pub mod registry;
pub mod render;
mod saliency;
pub mod segmentation;
mod settings;
#[cfg(test)]
mod testing;
mod visualization;

pub use class_probabilities::ClassProbabilities;
pub use error::{ExplainError, Result};
pub use occlusion::{OcclusionGrid, PartialOcclusion, Window, WORKING_SIZE};
pub use registry::{default_registry, default_registry_with_font, VisualizationRegistry};
pub use saliency::{SaliencyMaps, SaliencyRender};
pub use segmentation::{SaliencySegMaps, SegmentProbabilities};
pub use settings::{SettingSpec, VisualizationSettings};
pub use visualization::{Descriptor, LegendEntry, Visualization, VisualizationResult};
