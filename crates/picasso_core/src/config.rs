//! Application configuration.
//!
//! Configuration is a JSON document. When the `PICASSO_SETTINGS` environment
//! variable names a file, that file is read; any field it omits falls back to
//! the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CoreError, Result};

/// Environment variable naming a configuration file.
pub const SETTINGS_ENV: &str = "PICASSO_SETTINGS";

/// Title displayed by front ends.
pub const APP_TITLE: &str = "Picasso Visualizer";

/// Which model to load and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PicassoConfig {
    /// Name displayed by front ends.
    pub app_title: String,
    /// Registered model class to instantiate.
    pub model_cls_name: String,
    /// Arguments passed to the model's loader (`data_dir`, `top_probs`, ...).
    pub model_load_args: Value,
    /// Font for class names in segmentation legends; swatches only when unset.
    pub legend_font: Option<PathBuf>,
}

impl Default for PicassoConfig {
    fn default() -> Self {
        Self {
            app_title: APP_TITLE.to_string(),
            model_cls_name: "ImageClassifier".to_string(),
            model_load_args: json!({ "data_dir": "data-volume" }),
            legend_font: None,
        }
    }
}

impl PicassoConfig {
    /// Read a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Parse a configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Read the file named by `PICASSO_SETTINGS`, or use the defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(SETTINGS_ENV) {
            Some(path) => {
                tracing::debug!("Reading settings from {:?}", path);
                Self::from_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Set the model class.
    #[must_use]
    pub fn with_model(mut self, class_name: impl Into<String>, load_args: Value) -> Self {
        self.model_cls_name = class_name.into();
        self.model_load_args = load_args;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PicassoConfig::default();
        assert_eq!(config.app_title, APP_TITLE);
        assert_eq!(config.model_cls_name, "ImageClassifier");
        assert_eq!(config.model_load_args["data_dir"], "data-volume");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = PicassoConfig::from_json(r#"{"model_cls_name": "FcnSegmenter"}"#).unwrap();
        assert_eq!(config.model_cls_name, "FcnSegmenter");
        assert_eq!(config.app_title, APP_TITLE);
        assert!(config.legend_font.is_none());
    }

    #[test]
    fn test_legend_font_path() {
        let config =
            PicassoConfig::from_json(r#"{"legend_font": "/fonts/DejaVuSans.ttf"}"#).unwrap();
        assert_eq!(config.legend_font, Some(PathBuf::from("/fonts/DejaVuSans.ttf")));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"app_title": "Demo", "model_load_args": {"data_dir": "/models/mnist", "top_probs": 3}}"#,
        )
        .unwrap();

        let config = PicassoConfig::from_file(&path).unwrap();
        assert_eq!(config.app_title, "Demo");
        assert_eq!(config.model_load_args["top_probs"], 3);
    }

    #[test]
    fn test_invalid_json() {
        let result = PicassoConfig::from_json("{not json");
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
