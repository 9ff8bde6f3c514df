//! Segmentation overlay with a class legend.

use std::path::Path;
use std::sync::Arc;

use ab_glyph::FontArc;
use ndarray::{Array1, Axis};
use picasso_core::{rank_row, InputImage};
use picasso_models::Model;

use super::{
    argmax_labels, class_color, dense_model, relevant_classes, width_multiple, OVERLAY_OPACITY,
};
use crate::error::Result;
use crate::render;
use crate::settings::VisualizationSettings;
use crate::visualization::{Descriptor, LegendEntry, Visualization, VisualizationResult};

/// Descriptor of [`SegmentProbabilities`].
pub static DESCRIPTOR: Descriptor = Descriptor {
    name: "SegmentProbabilities",
    description: "Visualize segmented picture",
    reference_link: None,
    allowed_settings: &[],
};

/// Colours every pixel by its most probable displayed class.
pub struct SegmentProbabilities {
    model: Arc<dyn Model>,
    settings: VisualizationSettings,
    font: Option<FontArc>,
}

impl SegmentProbabilities {
    /// Create a visualizer for `model`.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            settings: VisualizationSettings::new(DESCRIPTOR.name, DESCRIPTOR.allowed_settings),
            font: None,
        }
    }

    /// Write class names next to the legend swatches.
    #[must_use]
    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        self.font = font;
        self
    }

    fn explain(&self, input: &InputImage, output_dir: &Path) -> Result<VisualizationResult> {
        let dense = dense_model(self.model.as_ref(), DESCRIPTOR.name)?;

        let batch = self.model.preprocess(std::slice::from_ref(&input.data))?;
        let decoded = dense.decode_dense(&dense.predict_dense(&batch)?)?;
        let probabilities = decoded.probabilities.index_axis(Axis(0), 0);
        let (height, width, n_classes) = probabilities.dim();

        let labels = argmax_labels(probabilities);
        let classes = relevant_classes(&labels, n_classes);
        let name = |class: usize| {
            decoded
                .class_names
                .get(&class)
                .cloned()
                .unwrap_or_else(|| class.to_string())
        };

        let mut image = render::array_to_rgb(&batch.index_axis(Axis(0), 0).to_owned());
        let mut legend = Vec::with_capacity(classes.len());
        for &(class, _) in &classes {
            let mask = labels.mapv(|label| label == class);
            render::overlay_mask(&mut image, mask.view(), class_color(class), OVERLAY_OPACITY);
            legend.push(LegendEntry {
                name: name(class),
                color: class_color(class),
            });
        }
        let image = render::append_legend(&image, &legend, self.font.as_ref());
        let output_filename =
            render::save_png(&image, output_dir, render::artifact_name(input.stem(), "segments"))?;

        let total = (height * width).max(1) as f32;
        let mut coverage = Array1::<f32>::zeros(n_classes);
        for &label in &labels {
            coverage[label] += 1.0 / total;
        }
        let predict_probs = rank_row(coverage.view(), self.model.top_k(), name)
            .into_iter()
            .filter(|p| p.probability > 0.0)
            .collect();

        Ok(VisualizationResult::SegmentProbabilities {
            input_filename: input.filename.clone(),
            output_filename,
            predict_probs,
            legend,
            width_multiple: width_multiple(height, width),
        })
    }
}

impl Visualization for SegmentProbabilities {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubModel, StubSegmenter};
    use crate::ExplainError;

    #[test]
    fn test_overlay_and_legend() {
        let dir = tempfile::tempdir().unwrap();
        let mut vis = SegmentProbabilities::new(Arc::new(StubSegmenter::new()));
        let inputs = vec![StubSegmenter::input("street.png", 40, 20)];

        let results = vis.make_visualization(&inputs, dir.path()).unwrap();
        match &results[0] {
            VisualizationResult::SegmentProbabilities {
                output_filename,
                predict_probs,
                legend,
                width_multiple,
                ..
            } => {
                // Background covers 400 pixels and is left out.
                let names: Vec<&str> = legend.iter().map(|e| e.name.as_str()).collect();
                assert_eq!(names, vec!["cat", "dog"]);
                assert_eq!(legend[0].color, class_color(1));

                assert_eq!(predict_probs[0].name, "background");
                assert_eq!(predict_probs[0].prob, "0.500");
                assert_eq!(predict_probs.len(), 3);
                assert_eq!(*width_multiple, 488.0);

                let img = image::open(dir.path().join(output_filename)).unwrap().to_rgb8();
                assert_eq!(img.height(), 20);
                assert!(img.width() > 40);
                // Red input under a green overlay.
                let p = img.get_pixel(0, 0);
                assert!(p[1] > 100 && p[0] > 100);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_requires_dense_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut vis = SegmentProbabilities::new(Arc::new(StubModel::new(3)));
        let err = vis
            .make_visualization(&[StubModel::input("a.png", 8, 8)], dir.path())
            .unwrap_err();
        assert!(matches!(err, ExplainError::IncompatibleModel { .. }));
    }
}
