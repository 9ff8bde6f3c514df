//! User-tunable visualization settings.
//!
//! Every visualizer declares an ordered schema of settings, each with a fixed
//! list of allowed string values. The first allowed value is the default.
//! Stored values are always members of their allowed list.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ExplainError, Result};

/// One tunable setting and the values it may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettingSpec {
    /// Setting name, e.g. `"Window"`.
    pub name: &'static str,
    /// Allowed values; the first one is the default.
    pub allowed: &'static [&'static str],
}

impl SettingSpec {
    /// Declare a setting.
    pub const fn new(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self { name, allowed }
    }

    /// The first allowed value.
    pub fn default_value(&self) -> &'static str {
        self.allowed.first().copied().unwrap_or_default()
    }

    fn find(&self, value: &str) -> Option<&'static str> {
        self.allowed.iter().copied().find(|allowed| *allowed == value)
    }
}

/// Current values of a visualizer's settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualizationSettings {
    visualizer: &'static str,
    schema: &'static [SettingSpec],
    values: Vec<&'static str>,
}

impl VisualizationSettings {
    /// Settings of `visualizer`, each at its default.
    pub fn new(visualizer: &'static str, schema: &'static [SettingSpec]) -> Self {
        Self {
            visualizer,
            schema,
            values: schema.iter().map(SettingSpec::default_value).collect(),
        }
    }

    /// The schema these settings follow.
    pub fn schema(&self) -> &'static [SettingSpec] {
        self.schema
    }

    /// Apply a partial update.
    ///
    /// Keys outside the schema are ignored. If any value is not allowed,
    /// nothing is changed.
    pub fn update(&mut self, changes: &BTreeMap<String, String>) -> Result<()> {
        let mut next = self.values.clone();
        for (key, value) in changes {
            let Some(index) = self.schema.iter().position(|spec| spec.name == key.as_str()) else {
                tracing::debug!("{} ignores unknown setting '{}'", self.visualizer, key);
                continue;
            };
            next[index] = self.schema[index].find(value).ok_or_else(|| ExplainError::InvalidSetting {
                visualizer: self.visualizer.to_string(),
                setting: key.clone(),
                value: value.clone(),
            })?;
        }
        self.values = next;
        Ok(())
    }

    /// Current value of `name`.
    pub fn get(&self, name: &str) -> Option<&'static str> {
        self.schema
            .iter()
            .position(|spec| spec.name == name)
            .map(|index| self.values[index])
    }

    /// Current value of `name` parsed as `T`.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T> {
        let value = self.get(name).unwrap_or_default();
        value.parse().map_err(|_| ExplainError::InvalidSetting {
            visualizer: self.visualizer.to_string(),
            setting: name.to_string(),
            value: value.to_string(),
        })
    }

    /// Current values by setting name.
    pub fn as_map(&self) -> BTreeMap<String, String> {
        self.schema
            .iter()
            .zip(&self.values)
            .map(|(spec, value)| (spec.name.to_string(), value.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &[SettingSpec] = &[
        SettingSpec::new("Window", &["0.50", "0.40"]),
        SettingSpec::new("Occlusion", &["grey", "black", "white"]),
    ];

    fn changes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_are_first_values() {
        let settings = VisualizationSettings::new("Test", SCHEMA);
        assert_eq!(settings.get("Window"), Some("0.50"));
        assert_eq!(settings.get("Occlusion"), Some("grey"));
        assert_eq!(settings.parse::<f32>("Window").unwrap(), 0.5);
    }

    #[test]
    fn test_update_allowed_value() {
        let mut settings = VisualizationSettings::new("Test", SCHEMA);
        settings.update(&changes(&[("Occlusion", "white")])).unwrap();
        assert_eq!(settings.get("Occlusion"), Some("white"));
        assert_eq!(settings.get("Window"), Some("0.50"));
    }

    #[test]
    fn test_update_is_atomic() {
        let mut settings = VisualizationSettings::new("Test", SCHEMA);
        let err = settings
            .update(&changes(&[("Occlusion", "black"), ("Window", "0.33")]))
            .unwrap_err();
        match err {
            ExplainError::InvalidSetting { setting, value, .. } => {
                assert_eq!(setting, "Window");
                assert_eq!(value, "0.33");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(settings.get("Occlusion"), Some("grey"));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let mut settings = VisualizationSettings::new("Test", SCHEMA);
        settings.update(&changes(&[("Colour", "red")])).unwrap();
        assert_eq!(settings.as_map(), changes(&[("Window", "0.50"), ("Occlusion", "grey")]));
    }

    #[test]
    fn test_empty_schema() {
        let mut settings = VisualizationSettings::new("Empty", &[]);
        settings.update(&changes(&[("Anything", "goes")])).unwrap();
        assert!(settings.as_map().is_empty());
        assert!(settings.get("Anything").is_none());
    }
}
