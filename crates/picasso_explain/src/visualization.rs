//! The visualization interface.

use std::collections::BTreeMap;
use std::path::Path;

use picasso_core::{InputImage, RankedPrediction};
use serde::Serialize;

use crate::error::Result;
use crate::settings::{SettingSpec, VisualizationSettings};

/// Static description of a visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    /// Registered name, e.g. `"PartialOcclusion"`.
    pub name: &'static str,
    /// Short human readable description.
    pub description: &'static str,
    /// Paper describing the technique.
    pub reference_link: Option<&'static str>,
    /// Settings schema; empty when the visualization has no settings.
    pub allowed_settings: &'static [SettingSpec],
}

/// A legend entry of a segmentation overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    /// Class name.
    pub name: String,
    /// Overlay colour as `[r, g, b]`.
    pub color: [u8; 3],
}

/// Output of a visualization for one input image.
///
/// Serialised without a tag; each variant carries the fields its front end
/// template expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VisualizationResult {
    /// Ranked class probabilities only.
    ClassProbabilities {
        /// Input image filename.
        input_filename: String,
        /// Whether output images were written.
        has_output: bool,
        /// Whether a processed copy of the input was written.
        has_processed_input: bool,
        /// Top-K predictions.
        predict_probs: Vec<RankedPrediction>,
    },
    /// Occlusion-sensitivity heatmaps.
    PartialOcclusion {
        /// Input image filename.
        input_filename: String,
        /// One heatmap per tracked class, in ranked order.
        result_filenames: Vec<String>,
        /// Top-K predictions of the unoccluded image.
        predict_probs: Vec<RankedPrediction>,
        /// Image illustrating the occlusion grid.
        example_filename: String,
    },
    /// Gradient saliency maps.
    SaliencyMaps {
        /// Input image filename.
        input_filename: String,
        /// Whether output images were written.
        has_output: bool,
        /// Whether a processed copy of the input was written.
        has_processed_input: bool,
        /// Top-K predictions.
        predict_probs: Vec<RankedPrediction>,
        /// One saliency map per tracked class, in ranked order.
        output_filenames: Vec<String>,
    },
    /// Segmentation overlay.
    SegmentProbabilities {
        /// Input image filename.
        input_filename: String,
        /// Overlay image.
        output_filename: String,
        /// Classes ranked by pixel coverage.
        predict_probs: Vec<RankedPrediction>,
        /// Colour of each overlaid class.
        legend: Vec<LegendEntry>,
        /// Display width for a display height of 244.
        width_multiple: f32,
    },
    /// Pixel-localised saliency of segmented classes.
    SaliencySegMaps {
        /// Input image filename.
        input_filename: String,
        /// Mean probability of each class at its sampled pixels.
        predict_probs: Vec<RankedPrediction>,
        /// One image per class.
        gradient_image_names: Vec<String>,
        /// Caption of each image, e.g. `"person: 87.50%"`.
        titles: Vec<String>,
        /// Display width for a display height of 244.
        width_multiple: f32,
    },
}

impl VisualizationResult {
    /// Filename of the input this result explains.
    pub fn input_filename(&self) -> &str {
        match self {
            Self::ClassProbabilities { input_filename, .. }
            | Self::PartialOcclusion { input_filename, .. }
            | Self::SaliencyMaps { input_filename, .. }
            | Self::SegmentProbabilities { input_filename, .. }
            | Self::SaliencySegMaps { input_filename, .. } => input_filename,
        }
    }

    /// Ranked predictions reported with this result.
    pub fn predict_probs(&self) -> &[RankedPrediction] {
        match self {
            Self::ClassProbabilities { predict_probs, .. }
            | Self::PartialOcclusion { predict_probs, .. }
            | Self::SaliencyMaps { predict_probs, .. }
            | Self::SegmentProbabilities { predict_probs, .. }
            | Self::SaliencySegMaps { predict_probs, .. } => predict_probs,
        }
    }

    /// Every artifact filename written for this result.
    pub fn artifacts(&self) -> Vec<&str> {
        match self {
            Self::ClassProbabilities { .. } => Vec::new(),
            Self::PartialOcclusion {
                result_filenames,
                example_filename,
                ..
            } => result_filenames
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(example_filename.as_str()))
                .collect(),
            Self::SaliencyMaps {
                output_filenames, ..
            } => output_filenames.iter().map(String::as_str).collect(),
            Self::SegmentProbabilities {
                output_filename, ..
            } => vec![output_filename.as_str()],
            Self::SaliencySegMaps {
                gradient_image_names,
                ..
            } => gradient_image_names.iter().map(String::as_str).collect(),
        }
    }
}

/// An explanation technique bound to a model.
///
/// Instances are created per caller through the registry and hold their own
/// settings and caches.
pub trait Visualization: Send {
    /// Static description.
    fn descriptor(&self) -> &'static Descriptor;

    /// Current settings.
    fn settings(&self) -> &VisualizationSettings;

    /// Mutable access to the settings.
    fn settings_mut(&mut self) -> &mut VisualizationSettings;

    /// Apply a partial settings update; see [`VisualizationSettings::update`].
    fn update_settings(&mut self, changes: &BTreeMap<String, String>) -> Result<()> {
        self.settings_mut().update(changes)
    }

    /// The settings schema, possibly empty.
    fn settings_schema(&self) -> &'static [SettingSpec] {
        self.descriptor().allowed_settings
    }

    /// Explain each input, writing artifacts under `output_dir`.
    ///
    /// Returns one result per input, in input order.
    fn make_visualization(
        &mut self,
        inputs: &[InputImage],
        output_dir: &Path,
    ) -> Result<Vec<VisualizationResult>>;
}
