//! Visualizer registry.
//!
//! Names are matched exactly. Every [`VisualizationRegistry::create`] call
//! builds a fresh instance, so settings and caches are never shared between
//! callers.

use std::collections::BTreeMap;
use std::sync::Arc;

use ab_glyph::FontArc;
use picasso_models::Model;

use crate::class_probabilities::{self, ClassProbabilities};
use crate::error::{ExplainError, Result};
use crate::occlusion::{self, PartialOcclusion};
use crate::saliency::{self, SaliencyMaps};
use crate::segmentation::{
    SaliencySegMaps, SegmentProbabilities, SALIENCY_SEG_MAPS, SEGMENT_PROBABILITIES,
};
use crate::visualization::{Descriptor, Visualization};

/// Type alias for visualizer constructors.
pub type VisualizationConstructor =
    Arc<dyn Fn(Arc<dyn Model>) -> Box<dyn Visualization> + Send + Sync>;

struct Entry {
    descriptor: &'static Descriptor,
    constructor: VisualizationConstructor,
}

/// Registry of visualization techniques.
#[derive(Default)]
pub struct VisualizationRegistry {
    entries: BTreeMap<&'static str, Entry>,
}

impl VisualizationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a visualizer under its descriptor's name.
    pub fn register<F>(&mut self, descriptor: &'static Descriptor, constructor: F)
    where
        F: Fn(Arc<dyn Model>) -> Box<dyn Visualization> + Send + Sync + 'static,
    {
        self.entries.insert(
            descriptor.name,
            Entry {
                descriptor,
                constructor: Arc::new(constructor),
            },
        );
    }

    /// Names of every registered visualizer, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Descriptors of every registered visualizer, sorted by name.
    pub fn descriptors(&self) -> Vec<&'static Descriptor> {
        self.entries.values().map(|e| e.descriptor).collect()
    }

    /// Descriptor of `name`.
    pub fn get(&self, name: &str) -> Result<&'static Descriptor> {
        self.entries
            .get(name)
            .map(|e| e.descriptor)
            .ok_or_else(|| ExplainError::UnknownVisualizer(name.to_string()))
    }

    /// Instantiate `name` for `model` with default settings.
    pub fn create(&self, name: &str, model: Arc<dyn Model>) -> Result<Box<dyn Visualization>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ExplainError::UnknownVisualizer(name.to_string()))?;
        tracing::debug!("Creating visualizer {}", name);
        Ok((entry.constructor)(model))
    }

    /// Number of registered visualizers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no visualizer is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry with the five built-in visualizers.
pub fn default_registry() -> VisualizationRegistry {
    default_registry_with_font(None)
}

/// Every built-in visualizer, with `font` used for segmentation legend labels.
pub fn default_registry_with_font(font: Option<FontArc>) -> VisualizationRegistry {
    let mut registry = VisualizationRegistry::new();
    registry.register(&class_probabilities::DESCRIPTOR, |m| {
        Box::new(ClassProbabilities::new(m))
    });
    registry.register(&occlusion::DESCRIPTOR, |m| Box::new(PartialOcclusion::new(m)));
    registry.register(&saliency::DESCRIPTOR, |m| Box::new(SaliencyMaps::new(m)));
    registry.register(&SEGMENT_PROBABILITIES, move |m| {
        Box::new(SegmentProbabilities::new(m).with_font(font.clone()))
    });
    registry.register(&SALIENCY_SEG_MAPS, |m| Box::new(SaliencySegMaps::new(m)));
    registry
}
