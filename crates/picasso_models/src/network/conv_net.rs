//! Convolutional image classifier.
//!
//! A stack of `Conv2d -> ReLU -> MaxPool` blocks followed by global average
//! pooling, a hidden dense layer and a linear head producing class scores.
//! The normalisation applied to those scores is declared by the topology's
//! [`Terminal`] rather than baked into the module, so the pre-normalisation
//! scores stay reachable for gradient extraction.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use super::Terminal;

/// Topology of a [`ConvNet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvNetConfig {
    /// Number of input channels (1 = grayscale, 3 = RGB).
    pub in_channels: usize,
    /// Input height in pixels.
    pub height: usize,
    /// Input width in pixels.
    pub width: usize,
    /// Number of output classes.
    pub n_classes: usize,
    /// Filters of each convolutional block.
    pub filters: Vec<usize>,
    /// Width of the hidden dense layer.
    pub hidden: usize,
    /// Operation turning class scores into probabilities.
    #[serde(default)]
    pub terminal: Terminal,
}

impl Default for ConvNetConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            height: 28,
            width: 28,
            n_classes: 10,
            filters: vec![32, 64],
            hidden: 128,
            terminal: Terminal::Softmax,
        }
    }
}

impl ConvNetConfig {
    /// Create a new config with specified dimensions.
    pub fn new(in_channels: usize, height: usize, width: usize, n_classes: usize) -> Self {
        Self {
            in_channels,
            height,
            width,
            n_classes,
            ..Default::default()
        }
    }

    /// Topology of the MNIST digit classifier.
    pub fn mnist() -> Self {
        Self::default()
    }

    /// Set the filters of the convolutional blocks.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<usize>) -> Self {
        self.filters = filters;
        self
    }

    /// Set the hidden layer width.
    #[must_use]
    pub fn with_hidden(mut self, hidden: usize) -> Self {
        self.hidden = hidden;
        self
    }

    /// Set the terminal operation.
    #[must_use]
    pub fn with_terminal(mut self, terminal: Terminal) -> Self {
        self.terminal = terminal;
        self
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvNet<B> {
        ConvNet::new(self, device)
    }
}

/// Conv2d -> ReLU -> MaxPool(2)
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block.
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self { conv, pool }
    }

    /// Forward pass through the block.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = relu(self.conv.forward(x));
        let [_, _, height, width] = out.dims();
        // Pooling a 1-pixel map would produce an empty tensor.
        if height < 2 || width < 2 {
            out
        } else {
            self.pool.forward(out)
        }
    }
}

/// Convolutional classifier producing class scores.
///
/// # Example
///
/// ```rust,ignore
/// use picasso_models::network::ConvNetConfig;
///
/// let model = ConvNetConfig::mnist().init::<NdArray>(&device);
/// let scores = model.forward_scores(Tensor::zeros([8, 1, 28, 28], &device));
/// // scores shape: [8, 10]
/// ```
#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    gap: AdaptiveAvgPool2d,
    hidden: Linear<B>,
    head: Linear<B>,
}

impl<B: Backend> ConvNet<B> {
    /// Create a new network.
    pub fn new(config: &ConvNetConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(config.filters.len());
        let mut in_channels = config.in_channels;
        for &filters in &config.filters {
            blocks.push(ConvBlock::new(in_channels, filters, device));
            in_channels = filters;
        }

        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let hidden = LinearConfig::new(in_channels, config.hidden).init(device);
        let head = LinearConfig::new(config.hidden, config.n_classes).init(device);

        Self {
            blocks,
            gap,
            hidden,
            head,
        }
    }

    /// Forward pass up to the operand of the terminal operation.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape (batch, channels, height, width)
    ///
    /// # Returns
    ///
    /// Class scores of shape (batch, n_classes)
    pub fn forward_scores(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut out = x;
        for block in &self.blocks {
            out = block.forward(out);
        }

        let out = self.gap.forward(out);
        let [batch, channels, _, _] = out.dims();
        let out = out.reshape([batch, channels]);

        let out = relu(self.hidden.forward(out));
        self.head.forward(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_conv_net_config_default() {
        let config = ConvNetConfig::default();
        assert_eq!(config.in_channels, 1);
        assert_eq!((config.height, config.width), (28, 28));
        assert_eq!(config.n_classes, 10);
        assert_eq!(config.terminal, Terminal::Softmax);
    }

    #[test]
    fn test_conv_net_config_serde() {
        let config = ConvNetConfig::new(3, 32, 32, 5)
            .with_filters(vec![8])
            .with_terminal(Terminal::Sigmoid);
        let json = serde_json::to_string(&config).unwrap();
        let decoded: ConvNetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_conv_net_forward_shape() {
        let device = Default::default();
        let config = ConvNetConfig::new(3, 16, 16, 4)
            .with_filters(vec![4, 8])
            .with_hidden(8);
        let model = config.init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        let scores = model.forward_scores(x);
        assert_eq!(scores.dims(), [2, 4]);
    }
}
