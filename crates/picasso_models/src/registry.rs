//! Model registry for loading models by class name.
//!
//! The registry maps class names to loaders. A loader receives the
//! `model_load_args` JSON object and immediately loads the checkpoint from its
//! `data_dir`.
//!
//! # Example
//!
//! ```rust,ignore
//! use picasso_models::registry::{default_registry, load_model};
//! use serde_json::json;
//!
//! let registry = default_registry();
//! let model = load_model(&registry, "ImageClassifier", &json!({"data_dir": "data-volume"}))?;
//! let probs = model.predict(&model.preprocess(&images)?)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::DefaultBackend;
use crate::classifier::ImageClassifier;
use crate::error::{ModelError, Result};
use crate::model::{LoadArgs, LoadableModel, Model};
use crate::segmenter::FcnSegmenter;

/// Type alias for model loaders.
pub type ModelLoader = Arc<dyn Fn(&LoadArgs) -> Result<Arc<dyn Model>> + Send + Sync>;

/// Registry of loadable model classes.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelLoader>,
}

impl ModelRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader under `name`.
    pub fn register<F>(&mut self, name: &str, loader: F)
    where
        F: Fn(&LoadArgs) -> Result<Arc<dyn Model>> + Send + Sync + 'static,
    {
        self.models.insert(name.to_string(), Arc::new(loader));
    }

    /// Register a [`LoadableModel`] type under `name`.
    pub fn register_model<M: LoadableModel + 'static>(&mut self, name: &str) {
        self.register(name, |args| Ok(Arc::new(M::load(args)?) as Arc<dyn Model>));
    }

    /// Load a model by class name.
    pub fn load(&self, name: &str, args: &Value) -> Result<Arc<dyn Model>> {
        let loader = self
            .models
            .get(name)
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))?;
        let args = LoadArgs::from_value(args)?;
        loader(&args)
    }

    /// List all registered class names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.models.keys().map(|s| s.as_str()).collect()
    }

    /// Check if a class name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }
}

/// Registry with every built-in model on the default backend.
pub fn default_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register_model::<ImageClassifier<DefaultBackend>>(ImageClassifier::<DefaultBackend>::NAME);
    registry.register_model::<FcnSegmenter<DefaultBackend>>(FcnSegmenter::<DefaultBackend>::NAME);
    registry
}

/// Load `class_name` with `args`, warning when the result does not conform.
///
/// A model conforms when it reports the class name it was requested under and
/// a non-degenerate input shape.
pub fn load_model(registry: &ModelRegistry, class_name: &str, args: &Value) -> Result<Arc<dyn Model>> {
    let model = registry.load(class_name, args)?;

    let reported = &model.metadata().model_name;
    if reported != class_name {
        tracing::warn!(
            "Model loaded as '{}' reports its name as '{}'",
            class_name,
            reported
        );
    }
    let shape = model.input_shape();
    if shape.is_degenerate() {
        tracing::warn!("Model '{}' reports a degenerate input shape {}", class_name, shape);
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_registry_lists_models() {
        let registry = default_registry();
        assert_eq!(registry.list(), vec!["FcnSegmenter", "ImageClassifier"]);
        assert!(registry.contains("ImageClassifier"));
        assert!(!registry.contains("imageclassifier"));
    }

    #[test]
    fn test_unknown_model() {
        let registry = default_registry();
        let err = load_model(&registry, "Nope", &json!({"data_dir": "."})).err().unwrap();
        assert!(matches!(err, ModelError::UnknownModel(_)));
    }

    #[test]
    fn test_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let registry = default_registry();
        let err = load_model(&registry, "ImageClassifier", &json!({"data_dir": dir.path()}))
            .err().unwrap();
        assert!(matches!(err, ModelError::ModelLoad { .. }));
    }

    #[test]
    fn test_custom_loader() {
        let mut registry = ModelRegistry::new();
        registry.register("Failing", |args| {
            Err(ModelError::load(&args.data_dir, "always fails"))
        });
        assert_eq!(registry.list(), vec!["Failing"]);
        assert!(registry.load("Failing", &json!({"data_dir": "x"})).is_err());
    }
}
