//! Convolutional image classifier backed by a [`ConvNet`].

use chrono::Local;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array2, Array3, Array4, Axis};
use picasso_core::imaging::{luma_to_array, rgb_to_array, stack_examples};
use picasso_core::InputShape;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::checkpoint;
use crate::error::{ModelError, Result};
use crate::model::{LoadArgs, LoadableModel, Model, ModelMetadata, ScoreHandle, ScoreNode};
use crate::network::{ConvNet, ConvNetConfig};
use crate::session::Session;
use crate::tensor_io::{array4_to_tensor, tensor_to_array2, tensor_to_array4};

/// An image classifier.
///
/// Single-channel topologies are fed grayscale images, anything else RGB.
/// Images are resized to the topology's size and scaled to `[0, 1]`.
pub struct ImageClassifier<B: AutodiffBackend> {
    session: Session<B, ConvNet<B>>,
    topology: ConvNetConfig,
    metadata: ModelMetadata,
    labels: Option<Vec<String>>,
    top_k: usize,
}

impl<B: AutodiffBackend> ImageClassifier<B> {
    /// Name the classifier is registered under.
    pub const NAME: &'static str = "ImageClassifier";

    /// Wrap an already restored network.
    pub fn from_network(
        topology: ConvNetConfig,
        network: ConvNet<B>,
        metadata: ModelMetadata,
        device: B::Device,
    ) -> Self {
        Self {
            session: Session::new(network, device),
            topology,
            metadata,
            labels: None,
            top_k: picasso_core::DEFAULT_TOP_K,
        }
    }

    /// Use `labels` as class names.
    pub fn with_labels(mut self, labels: Vec<String>) -> Result<Self> {
        if labels.len() != self.topology.n_classes {
            return Err(ModelError::InvalidConfig(format!(
                "{} labels for {} classes",
                labels.len(),
                self.topology.n_classes
            )));
        }
        self.labels = Some(labels);
        Ok(self)
    }

    /// Report `top_k` classes per input.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Topology of the network.
    pub fn topology(&self) -> &ConvNetConfig {
        &self.topology
    }

    fn check_class(&self, class_index: usize) -> Result<()> {
        if class_index < self.topology.n_classes {
            Ok(())
        } else {
            Err(ModelError::GradientResolution(format!(
                "class {} out of range for {} classes",
                class_index, self.topology.n_classes
            )))
        }
    }
}

impl<B: AutodiffBackend> LoadableModel for ImageClassifier<B> {
    fn load(args: &LoadArgs) -> Result<Self> {
        let device = B::Device::default();
        let restored =
            checkpoint::restore::<ConvNetConfig, B>(&args.data_dir, args.labels.as_deref(), &device)?;

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

        let model = Self::from_network(restored.topology, restored.network, metadata, device)
            .with_top_k(args.top_probs);
        match args.read_labels()? {
            Some(labels) => model.with_labels(labels),
            None => Ok(model),
        }
    }
}

impl<B: AutodiffBackend> Model for ImageClassifier<B> {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn input_shape(&self) -> InputShape {
        InputShape::new(self.topology.height, self.topology.width, self.topology.in_channels)
    }

    fn num_classes(&self) -> usize {
        self.topology.n_classes
    }

    fn top_k(&self) -> usize {
        self.top_k
    }

    fn class_name(&self, index: usize) -> String {
        self.labels
            .as_ref()
            .and_then(|labels| labels.get(index).cloned())
            .unwrap_or_else(|| index.to_string())
    }

    fn preprocess(&self, images: &[DynamicImage]) -> Result<Array4<f32>> {
        let (width, height) = (self.topology.width as u32, self.topology.height as u32);
        let examples: Vec<Array3<f32>> = images
            .iter()
            .map(|img| {
                let resized = img.resize_exact(width, height, FilterType::Lanczos3);
                if self.topology.in_channels == 1 {
                    luma_to_array(&resized.to_luma8(), 1.0 / 255.0)
                } else {
                    rgb_to_array(&resized.to_rgb8(), 1.0 / 255.0)
                }
            })
            .collect();
        Ok(stack_examples(&examples)?)
    }

    fn predict(&self, batch: &Array4<f32>) -> Result<Array2<f32>> {
        self.input_shape().check_batch(batch)?;
        let terminal = self.topology.terminal;

        self.session.infer(|network, device| {
            let x = array4_to_tensor::<B::InnerBackend>(batch, device).permute([0, 3, 1, 2]);
            tensor_to_array2(terminal.apply(network.forward_scores(x)))
        })
    }

    fn resolve_class_score(&self, class_index: usize) -> Result<ScoreHandle> {
        self.check_class(class_index)?;
        Ok(ScoreHandle {
            class_index,
            pixel: None,
            node: self.topology.terminal.score_node(),
        })
    }

    fn score_gradient(&self, handle: &ScoreHandle, input: &Array3<f32>) -> Result<Array3<f32>> {
        let (height, width, channels) = input.dim();
        self.input_shape().check_example(height, width, channels)?;
        self.check_class(handle.class_index)?;
        if handle.pixel.is_some() {
            return Err(ModelError::GradientResolution(
                "classifier scores are not pixel-localised".to_string(),
            ));
        }

        let batch = input.view().insert_axis(Axis(0)).to_owned();
        let terminal = self.topology.terminal;
        let class = handle.class_index;

        self.session.with_graph(|network, device| {
            let x = array4_to_tensor::<B>(&batch, device).require_grad();
            let scores = network.forward_scores(x.clone().permute([0, 3, 1, 2]));
            let scores = match handle.node {
                ScoreNode::TerminalOperand => scores,
                ScoreNode::Output => terminal.apply(scores),
            };

            let grads = scores.slice([0..1, class..class + 1]).sum().backward();
            let grad = x.grad(&grads).ok_or_else(|| {
                ModelError::GradientResolution("input is not connected to the class score".to_string())
            })?;
            Ok(tensor_to_array4(grad)?.index_axis_move(Axis(0), 0))
        })
    }
}
