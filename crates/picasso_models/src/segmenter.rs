//! Fully convolutional semantic segmenter backed by an [`FcnNet`].
//!
//! The network scores every Pascal VOC class at every pixel. Only a subset of
//! those classes (the displayed classes) is reported by
//! [`SegmentationModel::decode_dense`].

use std::collections::BTreeMap;

use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use chrono::Local;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array2, Array3, Array4, Axis, Zip};
use picasso_core::imaging::{rgb_to_array, stack_examples};
use picasso_core::InputShape;

use crate::checkpoint;
use crate::error::{ModelError, Result};
use crate::model::{
    DenseDecoding, LoadArgs, LoadableModel, Model, ModelMetadata, ScoreHandle, ScoreNode,
    SegmentationModel,
};
use crate::network::{FcnNet, FcnNetConfig};
use crate::session::Session;
use crate::tensor_io::{array4_to_tensor, tensor_to_array2, tensor_to_array4};

/// Pascal VOC class names, indexed by raw network output.
pub const VOC_CLASS_NAMES: [&str; 21] = [
    "background",
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tvmonitor",
];

/// Classes displayed by default.
pub const DEFAULT_DISPLAYED: [&str; 7] = [
    "background",
    "bicycle",
    "bus",
    "car",
    "horse",
    "motorbike",
    "person",
];

/// Input sizes are rounded to a multiple of this.
pub const SIZE_MULTIPLE: u32 = 32;

fn round_to_multiple(size: u32) -> u32 {
    let rounded = (size as f32 / SIZE_MULTIPLE as f32).round() as u32 * SIZE_MULTIPLE;
    rounded.max(SIZE_MULTIPLE)
}

/// A semantic segmentation model.
pub struct FcnSegmenter<B: AutodiffBackend> {
    session: Session<B, FcnNet<B>>,
    topology: FcnNetConfig,
    metadata: ModelMetadata,
    class_names: Vec<String>,
    displayed: Vec<(String, usize)>,
    top_k: usize,
}

impl<B: AutodiffBackend> FcnSegmenter<B> {
    /// Name the segmenter is registered under.
    pub const NAME: &'static str = "FcnSegmenter";

    /// Wrap an already restored network.
    ///
    /// `class_names` defaults to the VOC names for 21-class networks and to
    /// class indices otherwise; `displayed` defaults to [`DEFAULT_DISPLAYED`]
    /// (those present in `class_names`), or every class when none is.
    pub fn from_network(
        topology: FcnNetConfig,
        network: FcnNet<B>,
        metadata: ModelMetadata,
        device: B::Device,
        class_names: Option<Vec<String>>,
        displayed: Option<Vec<String>>,
    ) -> Result<Self> {
        let class_names = match class_names {
            Some(names) => names,
            None if topology.n_classes == VOC_CLASS_NAMES.len() => {
                VOC_CLASS_NAMES.iter().map(|s| s.to_string()).collect()
            }
            None => (0..topology.n_classes).map(|i| i.to_string()).collect(),
        };
        if class_names.len() != topology.n_classes {
            return Err(ModelError::InvalidConfig(format!(
                "{} class names for {} classes",
                class_names.len(),
                topology.n_classes
            )));
        }

        let displayed = match displayed {
            Some(names) => names,
            None => {
                let defaults: Vec<String> = DEFAULT_DISPLAYED
                    .iter()
                    .filter(|name| class_names.iter().any(|c| c.as_str() == **name))
                    .map(|s| s.to_string())
                    .collect();
                if defaults.is_empty() {
                    class_names.clone()
                } else {
                    defaults
                }
            }
        };
        let displayed = displayed
            .into_iter()
            .map(|name| {
                let raw = class_names
                    .iter()
                    .position(|c| *c == name)
                    .ok_or_else(|| ModelError::InvalidConfig(format!("unknown class '{}'", name)))?;
                Ok((name, raw))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            session: Session::new(network, device),
            topology,
            metadata,
            class_names,
            displayed,
            top_k: picasso_core::DEFAULT_TOP_K,
        })
    }

    /// Report `top_k` classes per input.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Displayed class names with their raw indices.
    pub fn displayed(&self) -> &[(String, usize)] {
        &self.displayed
    }

    fn check_raw_class(&self, raw_class: usize) -> Result<()> {
        if raw_class < self.topology.n_classes {
            Ok(())
        } else {
            Err(ModelError::GradientResolution(format!(
                "class {} out of range for {} classes",
                raw_class, self.topology.n_classes
            )))
        }
    }

    fn check_channels(&self, channels: usize) -> Result<()> {
        self.input_shape().check_example(0, 0, channels)?;
        Ok(())
    }
}

impl<B: AutodiffBackend> LoadableModel for FcnSegmenter<B> {
    fn load(args: &LoadArgs) -> Result<Self> {
        let device = B::Device::default();
        let restored =
            checkpoint::restore::<FcnNetConfig, B>(&args.data_dir, args.labels.as_deref(), &device)?;

        let metadata = ModelMetadata {
            model_name: Self::NAME.to_string(),
            checkpoint_name: restored.files.name(),
            checkpoint_time: restored.files.modified_string(),
            loaded_at: Local::now(),
        };
        tracing::info!(
            "Loaded {} from {} (checkpoint {}, modified {})",
            Self::NAME,
            args.data_dir.display(),
            metadata.checkpoint_name,
            metadata.checkpoint_time
        );

        let class_names = match &args.class_names {
            Some(names) => Some(names.clone()),
            None => args.read_labels()?,
        };
        Ok(Self::from_network(
            restored.topology,
            restored.network,
            metadata,
            device,
            class_names,
            args.custom_classes.clone(),
        )?
        .with_top_k(args.top_probs))
    }
}

impl<B: AutodiffBackend> Model for FcnSegmenter<B> {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn input_shape(&self) -> InputShape {
        InputShape::dynamic(self.topology.in_channels)
    }

    fn num_classes(&self) -> usize {
        self.topology.n_classes
    }

    fn top_k(&self) -> usize {
        self.top_k
    }

    fn class_name(&self, index: usize) -> String {
        self.class_names
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }

    /// Raw RGB values, each side resized to the nearest multiple of 32.
    fn preprocess(&self, images: &[DynamicImage]) -> Result<Array4<f32>> {
        let examples: Vec<Array3<f32>> = images
            .iter()
            .map(|img| {
                let width = round_to_multiple(img.width());
                let height = round_to_multiple(img.height());
                let resized = img.resize_exact(width, height, FilterType::Triangle);
                rgb_to_array(&resized.to_rgb8(), 1.0)
            })
            .collect();
        Ok(stack_examples(&examples)?)
    }

    /// Image-level class probabilities: the per-pixel softmax averaged over
    /// all pixels.
    fn predict(&self, batch: &Array4<f32>) -> Result<Array2<f32>> {
        self.input_shape().check_batch(batch)?;

        self.session.infer(|network, device| {
            let x = array4_to_tensor::<B::InnerBackend>(batch, device).permute([0, 3, 1, 2]);
            let probs = softmax(network.forward(x), 1);
            let [n, k, _, _] = probs.dims();
            tensor_to_array2(probs.mean_dim(3).mean_dim(2).reshape([n, k]))
        })
    }

    fn resolve_class_score(&self, class_index: usize) -> Result<ScoreHandle> {
        self.check_raw_class(class_index)?;
        Ok(ScoreHandle {
            class_index,
            pixel: None,
            node: ScoreNode::TerminalOperand,
        })
    }

    /// Gradient of a raw class score.
    ///
    /// Pixel handles differentiate the score at that pixel; class handles the
    /// score summed over every pixel.
    fn score_gradient(&self, handle: &ScoreHandle, input: &Array3<f32>) -> Result<Array3<f32>> {
        let (height, width, channels) = input.dim();
        self.check_channels(channels)?;
        self.check_raw_class(handle.class_index)?;
        let (rows, cols) = match handle.pixel {
            Some((row, col)) if row < height && col < width => (row..row + 1, col..col + 1),
            Some((row, col)) => {
                return Err(ModelError::GradientResolution(format!(
                    "pixel ({}, {}) outside a {}x{} input",
                    row, col, height, width
                )))
            }
            None => (0..height, 0..width),
        };

        let batch = input.view().insert_axis(Axis(0)).to_owned();
        let class = handle.class_index;

        self.session.with_graph(|network, device| {
            let x = array4_to_tensor::<B>(&batch, device).require_grad();
            let scores = network.forward(x.clone().permute([0, 3, 1, 2]));
            let scores = match handle.node {
                ScoreNode::TerminalOperand => scores,
                ScoreNode::Output => softmax(scores, 1),
            };

            let grads = scores.slice([0..1, class..class + 1, rows, cols]).sum().backward();
            let grad = x.grad(&grads).ok_or_else(|| {
                ModelError::GradientResolution("input is not connected to the class score".to_string())
            })?;
            Ok(tensor_to_array4(grad)?.index_axis_move(Axis(0), 0))
        })
    }

    fn as_segmentation(&self) -> Option<&dyn SegmentationModel> {
        Some(self)
    }
}

impl<B: AutodiffBackend> SegmentationModel for FcnSegmenter<B> {
    fn predict_dense(&self, batch: &Array4<f32>) -> Result<Array4<f32>> {
        self.input_shape().check_batch(batch)?;

        self.session.infer(|network, device| {
            let x = array4_to_tensor::<B::InnerBackend>(batch, device).permute([0, 3, 1, 2]);
            tensor_to_array4(network.forward(x).permute([0, 2, 3, 1]))
        })
    }

    fn decode_dense(&self, scores: &Array4<f32>) -> Result<DenseDecoding> {
        let (n, height, width, raw) = scores.dim();
        if raw != self.topology.n_classes {
            return Err(ModelError::Core(picasso_core::CoreError::InvalidShape {
                expected: format!("{} classes per pixel", self.topology.n_classes),
                got: raw.to_string(),
            }));
        }

        let raw_indices: Vec<usize> = self.displayed.iter().map(|(_, raw)| *raw).collect();
        let mut probabilities = Array4::<f32>::zeros((n, height, width, raw_indices.len()));
        Zip::from(probabilities.lanes_mut(Axis(3)))
            .and(scores.lanes(Axis(3)))
            .for_each(|mut out, pixel| {
                let max = pixel.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                let exp: Vec<f32> = pixel.iter().map(|&v| (v - max).exp()).collect();
                let total: f32 = exp.iter().sum();
                for (slot, &raw) in out.iter_mut().zip(&raw_indices) {
                    *slot = exp[raw] / total;
                }
            });

        let class_names: BTreeMap<usize, String> = self
            .displayed
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (i, name.clone()))
            .collect();
        let raw_index: BTreeMap<usize, usize> = raw_indices.into_iter().enumerate().collect();

        Ok(DenseDecoding {
            probabilities,
            class_names,
            raw_index,
        })
    }

    fn resolve_pixel_score(&self, raw_class: usize, pixel: (usize, usize)) -> Result<ScoreHandle> {
        self.check_raw_class(raw_class)?;
        Ok(ScoreHandle {
            class_index: raw_class,
            pixel: Some(pixel),
            node: ScoreNode::TerminalOperand,
        })
    }
}
