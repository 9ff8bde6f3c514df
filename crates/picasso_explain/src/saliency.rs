//! Gradient saliency maps.
//!
//! The derivative of a class score with respect to each input pixel shows
//! which pixels the classification is most sensitive to.
//!
//! Reference: Simonyan et al., "Deep Inside Convolutional Networks"
//! (<https://arxiv.org/pdf/1312.6034>).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use image::imageops::FilterType;
use ndarray::Axis;
use picasso_core::{ranked_indices, InputImage};
use picasso_models::{Model, ScoreHandle};

use crate::error::Result;
use crate::render::{self, Colormap};
use crate::settings::{SettingSpec, VisualizationSettings};
use crate::visualization::{Descriptor, Visualization, VisualizationResult};

const SETTINGS: &[SettingSpec] = &[SettingSpec::new("Transparency", &["0.0", "0.25", "0.5", "0.75"])];

/// Descriptor of [`SaliencyMaps`].
pub static DESCRIPTOR: Descriptor = Descriptor {
    name: "SaliencyMaps",
    description: "See maximal derivatives of class with respect to input",
    reference_link: Some("https://arxiv.org/pdf/1312.6034"),
    allowed_settings: SETTINGS,
};

/// How a saliency map is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaliencyRender {
    /// The heatmap alone.
    Heatmap,
    /// The input at `Transparency` blended over the heatmap.
    Overlay,
}

/// Gradient saliency visualizer.
pub struct SaliencyMaps {
    model: Arc<dyn Model>,
    settings: VisualizationSettings,
    scores: HashMap<usize, ScoreHandle>,
}

impl SaliencyMaps {
    /// Create a visualizer for `model` with default settings.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            settings: VisualizationSettings::new(DESCRIPTOR.name, SETTINGS),
            scores: HashMap::new(),
        }
    }

    /// Rendering chosen by the current transparency.
    pub fn render_mode(&self) -> Result<SaliencyRender> {
        let transparency: f32 = self.settings.parse("Transparency")?;
        Ok(if transparency > 0.0 {
            SaliencyRender::Overlay
        } else {
            SaliencyRender::Heatmap
        })
    }

    /// Number of memoised class scores.
    pub fn cached_scores(&self) -> usize {
        self.scores.len()
    }

    fn score(&mut self, class_index: usize) -> Result<ScoreHandle> {
        if let Some(handle) = self.scores.get(&class_index) {
            return Ok(*handle);
        }
        let handle = self.model.resolve_class_score(class_index)?;
        self.scores.insert(class_index, handle);
        Ok(handle)
    }

    fn explain(&mut self, input: &InputImage, output_dir: &Path) -> Result<VisualizationResult> {
        let transparency: f32 = self.settings.parse("Transparency")?;
        let mode = self.render_mode()?;

        let batch = self.model.preprocess(std::slice::from_ref(&input.data))?;
        let probabilities = self.model.predict(&batch)?;
        let predict_probs = self
            .model
            .decode(&probabilities)
            .into_iter()
            .next()
            .unwrap_or_default();
        let example = batch.index_axis(Axis(0), 0).to_owned();
        let (height, width, _) = example.dim();

        let original = match mode {
            SaliencyRender::Overlay => Some(
                input
                    .data
                    .resize_exact(width as u32, height as u32, FilterType::Triangle)
                    .to_rgb8(),
            ),
            SaliencyRender::Heatmap => None,
        };

        let stem = input.stem();
        let mut output_filenames = Vec::with_capacity(predict_probs.len());
        for (rank, class_index) in ranked_indices(&predict_probs).into_iter().enumerate() {
            let handle = self.score(class_index)?;
            let gradient = self.model.score_gradient(&handle, &example)?;
            let saliency = render::normalize(render::max_abs_channel(&gradient).view());

            let heatmap = render::heatmap(saliency.view(), 0.0, 1.0, Colormap::Inferno);
            let image = match &original {
                Some(original) => render::blend(original, transparency, &heatmap),
                None => heatmap,
            };
            output_filenames.push(render::save_png(
                &image,
                output_dir,
                render::artifact_name(stem, &format!("saliency{}", rank)),
            )?);
        }

        Ok(VisualizationResult::SaliencyMaps {
            input_filename: input.filename.clone(),
            has_output: true,
            has_processed_input: false,
            predict_probs,
            output_filenames,
        })
    }
}

impl Visualization for SaliencyMaps {
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
        output_dir: &Path,
    ) -> Result<Vec<VisualizationResult>> {
        inputs.iter().map(|input| self.explain(input, output_dir)).collect()
    }
}
