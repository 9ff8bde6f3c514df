//! Fully convolutional segmentation network.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

/// Number of Pascal VOC classes, background included.
pub const VOC_CLASSES: usize = 21;

/// Topology of an [`FcnNet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcnNetConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of raw output classes.
    pub n_classes: usize,
    /// Filters of each `3x3` convolution.
    pub filters: Vec<usize>,
}

impl Default for FcnNetConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            n_classes: VOC_CLASSES,
            filters: vec![16, 32],
        }
    }
}

impl FcnNetConfig {
    /// Create a new config.
    pub fn new(in_channels: usize, n_classes: usize) -> Self {
        Self {
            in_channels,
            n_classes,
            ..Default::default()
        }
    }

    /// Set the convolution filters.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<usize>) -> Self {
        self.filters = filters;
        self
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FcnNet<B> {
        let mut convs = Vec::with_capacity(self.filters.len());
        let mut in_channels = self.in_channels;
        for &filters in &self.filters {
            convs.push(
                Conv2dConfig::new([in_channels, filters], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device),
            );
            in_channels = filters;
        }
        let classifier = Conv2dConfig::new([in_channels, self.n_classes], [1, 1]).init(device);

        FcnNet { convs, classifier }
    }
}

/// Per-pixel classifier keeping the input resolution.
#[derive(Module, Debug)]
pub struct FcnNet<B: Backend> {
    convs: Vec<Conv2d<B>>,
    classifier: Conv2d<B>,
}

impl<B: Backend> FcnNet<B> {
    /// Per-pixel class scores.
    ///
    /// Input `(batch, channels, height, width)`, output
    /// `(batch, n_classes, height, width)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = x;
        for conv in &self.convs {
            out = relu(conv.forward(out));
        }
        self.classifier.forward(out)
    }
}
