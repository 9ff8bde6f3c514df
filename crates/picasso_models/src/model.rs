//! The model interface every visualizer talks to.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use image::DynamicImage;
use ndarray::{Array2, Array3, Array4};
use picasso_core::{decode_top_k, imaging, InputShape, RankedPrediction, DEFAULT_TOP_K};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};

/// Where a model came from.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    /// Registered class name of the model.
    pub model_name: String,
    /// File name of the checkpoint that was loaded.
    pub checkpoint_name: String,
    /// Modification time of that checkpoint.
    pub checkpoint_time: String,
    /// When the model was loaded.
    pub loaded_at: DateTime<Local>,
}

/// Graph node carrying a class score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreNode {
    /// Operand of the terminal softmax/sigmoid (pre-normalisation score).
    TerminalOperand,
    /// The probability output itself.
    Output,
}

/// A resolved scalar class score that gradients can be taken of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScoreHandle {
    /// Index of the class in the network output.
    pub class_index: usize,
    /// `(row, col)` for pixel-localised scores of dense models.
    pub pixel: Option<(usize, usize)>,
    /// Node the score is read from.
    pub node: ScoreNode,
}

/// Arguments accepted by model loaders.
///
/// Parsed from the `model_load_args` JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadArgs {
    /// Directory holding the checkpoint.
    pub data_dir: PathBuf,
    /// Number of ranked classes reported per input.
    #[serde(default = "default_top_probs")]
    pub top_probs: usize,
    /// JSON file with a list of class names.
    #[serde(default)]
    pub labels: Option<PathBuf>,
    /// Raw class names of a dense model.
    #[serde(default)]
    pub class_names: Option<Vec<String>>,
    /// Subset of `class_names` that is displayed.
    #[serde(default)]
    pub custom_classes: Option<Vec<String>>,
}

fn default_top_probs() -> usize {
    DEFAULT_TOP_K
}

impl LoadArgs {
    /// Arguments for `data_dir` with every other field defaulted.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            top_probs: DEFAULT_TOP_K,
            labels: None,
            class_names: None,
            custom_classes: None,
        }
    }

    /// Parse a `model_load_args` object.
    pub fn from_value(value: &Value) -> Result<Self> {
        let args: Self = serde_json::from_value(value.clone())
            .map_err(|e| ModelError::InvalidConfig(e.to_string()))?;
        if args.top_probs == 0 {
            return Err(ModelError::InvalidConfig("top_probs must be positive".to_string()));
        }
        Ok(args)
    }

    /// Read class names from the `labels` file, if one was given.
    pub fn read_labels(&self) -> Result<Option<Vec<String>>> {
        let Some(path) = &self.labels else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(path)?;
        let names = serde_json::from_str(&text)
            .map_err(|e| ModelError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Ok(Some(names))
    }
}

/// A loaded image model.
///
/// Implementations are created once and shared as `Arc<dyn Model>`; every
/// method takes `&self`.
pub trait Model: Send + Sync {
    /// Provenance of the loaded weights.
    fn metadata(&self) -> &ModelMetadata;

    /// Shape of a single preprocessed example.
    fn input_shape(&self) -> InputShape;

    /// Number of classes in the probability output.
    fn num_classes(&self) -> usize;

    /// Number of ranked classes reported by [`Model::decode`].
    fn top_k(&self) -> usize {
        DEFAULT_TOP_K
    }

    /// Display name of a class.
    fn class_name(&self, index: usize) -> String {
        index.to_string()
    }

    /// Turn raw images into a `(N, H, W, C)` batch.
    ///
    /// The default passes raw RGB values through unchanged.
    fn preprocess(&self, images: &[DynamicImage]) -> Result<Array4<f32>> {
        Ok(imaging::raw_rgb_batch(images)?)
    }

    /// Class probabilities, shape `[batch, num_classes]`.
    fn predict(&self, batch: &Array4<f32>) -> Result<Array2<f32>>;

    /// Rank each row of `probabilities`, keeping [`Model::top_k`] classes.
    fn decode(&self, probabilities: &Array2<f32>) -> Vec<Vec<RankedPrediction>> {
        decode_top_k(probabilities.view(), self.top_k(), |i| self.class_name(i))
    }

    /// Locate the scalar score of `class_index`.
    fn resolve_class_score(&self, class_index: usize) -> Result<ScoreHandle>;

    /// Gradient of the score `handle` with respect to one `(H, W, C)` input.
    fn score_gradient(&self, handle: &ScoreHandle, input: &Array3<f32>) -> Result<Array3<f32>>;

    /// Dense prediction capability, if the model has one.
    fn as_segmentation(&self) -> Option<&dyn SegmentationModel> {
        None
    }
}

/// Per-pixel class probabilities restricted to the displayed classes.
#[derive(Debug, Clone)]
pub struct DenseDecoding {
    /// `(N, H, W, K)` probabilities over the `K` displayed classes.
    pub probabilities: Array4<f32>,
    /// Displayed class index to name.
    pub class_names: BTreeMap<usize, String>,
    /// Displayed class index to raw network class index.
    pub raw_index: BTreeMap<usize, usize>,
}

/// Models producing a class score per pixel.
pub trait SegmentationModel: Model {
    /// Raw per-pixel scores, shape `(N, H, W, raw_classes)`.
    fn predict_dense(&self, batch: &Array4<f32>) -> Result<Array4<f32>>;

    /// Normalise raw scores and keep the displayed classes.
    fn decode_dense(&self, scores: &Array4<f32>) -> Result<DenseDecoding>;

    /// Locate the score of raw class `raw_class` at `pixel`.
    fn resolve_pixel_score(&self, raw_class: usize, pixel: (usize, usize)) -> Result<ScoreHandle>;
}

/// Models that can be built from load arguments.
pub trait LoadableModel: Model + Sized {
    /// Load the latest checkpoint in `args.data_dir`.
    fn load(args: &LoadArgs) -> Result<Self>;
}
