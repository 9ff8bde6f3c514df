//! Burn networks and the topologies that build them.
//!
//! A topology is a serde document describing a network. Checkpoints store it
//! next to (or inside) the weights record so a fresh network can be built and
//! the record restored into it.

mod conv_net;
mod fcn;

pub use conv_net::{ConvBlock, ConvNet, ConvNetConfig};
pub use fcn::{FcnNet, FcnNetConfig, VOC_CLASSES};

use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::{sigmoid, softmax};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::model::ScoreNode;

/// Operation applied to class scores to produce the probability output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    /// Softmax over the class axis.
    #[default]
    Softmax,
    /// Independent sigmoid per class.
    Sigmoid,
    /// Scores are already probabilities.
    Identity,
}

impl Terminal {
    /// Apply the terminal to `[batch, classes]` scores.
    pub fn apply<B: Backend>(self, scores: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::Softmax => softmax(scores, 1),
            Self::Sigmoid => sigmoid(scores),
            Self::Identity => scores,
        }
    }

    /// Graph node whose value is differentiated as the class score.
    ///
    /// Normalising terminals squash gradients, so the score is taken from
    /// their operand.
    pub fn score_node(self) -> ScoreNode {
        match self {
            Self::Softmax | Self::Sigmoid => ScoreNode::TerminalOperand,
            Self::Identity => ScoreNode::Output,
        }
    }
}

/// A serialisable network description.
pub trait Topology: Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync {
    /// Network built from this topology.
    type Network<B: Backend>: Module<B>;

    /// Short architecture name, used in logs and bundles.
    fn arch(&self) -> &'static str;

    /// Build a freshly initialised network.
    fn init_network<B: Backend>(&self, device: &B::Device) -> Self::Network<B>;
}

impl Topology for ConvNetConfig {
    type Network<B: Backend> = ConvNet<B>;

    fn arch(&self) -> &'static str {
        "conv_net"
    }

    fn init_network<B: Backend>(&self, device: &B::Device) -> ConvNet<B> {
        self.init(device)
    }
}

impl Topology for FcnNetConfig {
    type Network<B: Backend> = FcnNet<B>;

    fn arch(&self) -> &'static str {
        "fcn"
    }

    fn init_network<B: Backend>(&self, device: &B::Device) -> FcnNet<B> {
        self.init(device)
    }
}
