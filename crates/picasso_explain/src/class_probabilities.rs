//! Top class probabilities of each input.

use std::path::Path;
use std::sync::Arc;

use picasso_core::InputImage;
use picasso_models::Model;

use crate::error::Result;
use crate::settings::VisualizationSettings;
use crate::visualization::{Descriptor, Visualization, VisualizationResult};

/// Descriptor of [`ClassProbabilities`].
pub static DESCRIPTOR: Descriptor = Descriptor {
    name: "ClassProbabilities",
    description: "Predict class probabilities from new examples",
    reference_link: None,
    allowed_settings: &[],
};

/// Reports the model's ranked predictions; writes no images.
pub struct ClassProbabilities {
    model: Arc<dyn Model>,
    settings: VisualizationSettings,
}

impl ClassProbabilities {
    /// Create a visualizer for `model`.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            settings: VisualizationSettings::new(DESCRIPTOR.name, DESCRIPTOR.allowed_settings),
        }
    }
}

impl Visualization for ClassProbabilities {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    fn settings(&self) -> &VisualizationSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut VisualizationSettings {
        &mut self.settings
    }

    fn make_visualization(
        &mut self,
        inputs: &[InputImage],
        _output_dir: &Path,
    ) -> Result<Vec<VisualizationResult>> {
        inputs
            .iter()
            .map(|input| {
                let batch = self.model.preprocess(std::slice::from_ref(&input.data))?;
                let probabilities = self.model.predict(&batch)?;
                let predict_probs = self
                    .model
                    .decode(&probabilities)
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                Ok(VisualizationResult::ClassProbabilities {
                    input_filename: input.filename.clone(),
                    has_output: false,
                    has_processed_input: false,
                    predict_probs,
                })
            })
            .collect()
    }
}
