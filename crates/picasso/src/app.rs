//! The application handle.
//!
//! A [`Picasso`] is built once from a [`PicassoConfig`]: the configured model
//! is loaded immediately and every visualizer is created against it.

use std::sync::Arc;

use picasso_core::PicassoConfig;
use picasso_explain::{Descriptor, Visualization, VisualizationRegistry};
use picasso_models::{load_model, Model, ModelRegistry};
use serde::Serialize;
use thiserror::Error;

/// Result type alias using [`PicassoError`].
pub type Result<T> = std::result::Result<T, PicassoError>;

/// Errors surfaced by the application handle.
#[derive(Error, Debug)]
pub enum PicassoError {
    /// Configuration could not be read.
    #[error(transparent)]
    Core(#[from] picasso_core::CoreError),

    /// The configured model could not be loaded.
    #[error(transparent)]
    Model(#[from] picasso_models::ModelError),

    /// A visualizer could not be created or run.
    #[error(transparent)]
    Explain(#[from] picasso_explain::ExplainError),
}

/// What front ends display about the running application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppState {
    /// Application title.
    pub app_title: String,
    /// Class name of the loaded model.
    pub model_name: String,
    /// File name of the loaded checkpoint.
    pub latest_ckpt_name: String,
    /// Modification time of that checkpoint.
    pub latest_ckpt_time: String,
}

/// A loaded model together with the visualizers that can explain it.
pub struct Picasso {
    config: PicassoConfig,
    model: Arc<dyn Model>,
    visualizations: VisualizationRegistry,
}

impl Picasso {
    /// Load the configured model with the built-in registries.
    ///
    /// Fails when `legend_font` names a file that is not a readable font.
    pub fn from_config(config: PicassoConfig) -> Result<Self> {
        let font = config
            .legend_font
            .as_deref()
            .map(picasso_explain::render::load_font)
            .transpose()?;
        Self::with_registries(
            config,
            &picasso_models::default_registry(),
            picasso_explain::default_registry_with_font(font),
        )
    }

    /// Read the configuration named by `PICASSO_SETTINGS` and load it.
    pub fn from_env() -> Result<Self> {
        Self::from_config(PicassoConfig::from_env()?)
    }

    /// Load the configured model from `models` and explain it with `visualizations`.
    pub fn with_registries(
        config: PicassoConfig,
        models: &ModelRegistry,
        visualizations: VisualizationRegistry,
    ) -> Result<Self> {
        let model = load_model(models, &config.model_cls_name, &config.model_load_args)?;
        tracing::info!(
            "{} ready with {} ({} visualizers)",
            config.app_title,
            config.model_cls_name,
            visualizations.len()
        );
        Ok(Self {
            config,
            model,
            visualizations,
        })
    }

    /// The configuration this handle was built from.
    pub fn config(&self) -> &PicassoConfig {
        &self.config
    }

    /// The shared model.
    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    /// Descriptors of every available visualizer.
    pub fn visualizers(&self) -> Vec<&'static Descriptor> {
        self.visualizations.descriptors()
    }

    /// A fresh visualizer bound to the model.
    pub fn visualizer(&self, name: &str) -> Result<Box<dyn Visualization>> {
        Ok(self.visualizations.create(name, Arc::clone(&self.model))?)
    }

    /// Title, model and checkpoint provenance.
    pub fn app_state(&self) -> AppState {
        let metadata = self.model.metadata();
        AppState {
            app_title: self.config.app_title.clone(),
            model_name: metadata.model_name.clone(),
            latest_ckpt_name: metadata.checkpoint_name.clone(),
            latest_ckpt_time: metadata.checkpoint_time.clone(),
        }
    }
}
