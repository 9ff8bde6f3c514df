//! # picasso
//!
//! Visual explanations for trained image models.
//!
//! picasso-rs loads a trained classifier or segmenter from a checkpoint
//! directory and explains its predictions:
//!
//! - **Models**: checkpoint discovery, burn networks, the [`Model`](prelude::Model) interface
//! - **Visualizations**: class probabilities, occlusion sensitivity, saliency
//!   maps and their segmentation counterparts
//! - **Application**: the [`Picasso`] handle tying configuration, model and
//!   visualizers together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use picasso::prelude::*;
//!
//! let app = Picasso::from_env()?;
//! let mut vis = app.visualizer("PartialOcclusion")?;
//! vis.update_settings(&[("Strides".into(), "10".into())].into())?;
//!
//! let inputs = vec![InputImage::open("cat.png")?];
//! for result in vis.make_visualization(&inputs, "outputs".as_ref())? {
//!     println!("{}", serde_json::to_string(&result)?);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod app;

pub use app::{AppState, Picasso, PicassoError, Result};

// Re-export all crates
pub use picasso_core as core;
pub use picasso_explain as explain;
pub use picasso_models as models;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use picasso::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{AppState, Picasso, PicassoError};

    // Core types
    pub use picasso_core::{InputImage, InputShape, PicassoConfig, RankedPrediction};

    // Models
    pub use picasso_models::{
        default_registry as default_models, load_model, FcnSegmenter, ImageClassifier, LoadArgs,
        Model, ModelRegistry, SegmentationModel,
    };

    // Visualizations
    pub use picasso_explain::{
        default_registry as default_visualizations, ClassProbabilities, Descriptor,
        PartialOcclusion, SaliencyMaps, SaliencySegMaps, SegmentProbabilities, Visualization,
        VisualizationRegistry, VisualizationResult,
    };
}
