//! Saliency of segmented regions.
//!
//! For each displayed class a few of its pixels are sampled, and the input
//! gradients of the class score at those pixels are summed. The most salient
//! pixels are scattered over a faded copy of the input with the class region
//! highlighted.

use std::path::Path;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use ndarray::{Array2, Axis};
use picasso_core::{InputImage, RankedPrediction};
use picasso_models::Model;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{argmax_labels, dense_model, relevant_classes, width_multiple, OVERLAY_OPACITY};
use crate::error::Result;
use crate::render::{self, Colormap};
use crate::settings::VisualizationSettings;
use crate::visualization::{Descriptor, Visualization, VisualizationResult};

/// Descriptor of [`SaliencySegMaps`].
pub static DESCRIPTOR: Descriptor = Descriptor {
    name: "SaliencySegMaps",
    description: "Saliency maps for segmentation",
    reference_link: None,
    allowed_settings: &[],
};

/// Pixels sampled per class, with replacement.
pub const SAMPLES_PER_CLASS: usize = 5;

/// Most salient pixels drawn per class.
pub const SCATTER_PIXELS: usize = 1000;

/// Rank of the value the colour scale saturates at.
const SATURATION_RANK: usize = 200;

/// Weight of the input when faded towards white.
const FADE_ALPHA: f32 = 185.0 / 255.0;

const REGION_COLOR: [u8; 3] = [0, 255, 0];
const SAMPLE_COLOR: Rgb<u8> = Rgb([0, 255, 255]);

/// Gradient saliency of sampled pixels of each segmented class.
pub struct SaliencySegMaps {
    model: Arc<dyn Model>,
    settings: VisualizationSettings,
    seed: u64,
}

impl SaliencySegMaps {
    /// Create a visualizer for `model`.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            settings: VisualizationSettings::new(DESCRIPTOR.name, DESCRIPTOR.allowed_settings),
            seed: 0,
        }
    }

    /// Seed the pixel sampler.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn explain(
        &self,
        input: &InputImage,
        output_dir: &Path,
        rng: &mut ChaCha8Rng,
    ) -> Result<VisualizationResult> {
        let dense = dense_model(self.model.as_ref(), DESCRIPTOR.name)?;

        let batch = self.model.preprocess(std::slice::from_ref(&input.data))?;
        let decoded = dense.decode_dense(&dense.predict_dense(&batch)?)?;
        let probabilities = decoded.probabilities.index_axis(Axis(0), 0);
        let (height, width, n_classes) = probabilities.dim();
        let example = batch.index_axis(Axis(0), 0).to_owned();

        let labels = argmax_labels(probabilities);
        let faded = render::blend(
            &render::array_to_rgb(&example),
            FADE_ALPHA,
            &RgbImage::from_pixel(width as u32, height as u32, Rgb([255, 255, 255])),
        );

        let stem = input.stem();
        let mut predict_probs = Vec::new();
        let mut gradient_image_names = Vec::new();
        let mut titles = Vec::new();
        for (class, _) in relevant_classes(&labels, n_classes) {
            let name = decoded
                .class_names
                .get(&class)
                .cloned()
                .unwrap_or_else(|| class.to_string());
            let raw = decoded.raw_index.get(&class).copied().unwrap_or(class);

            let pixels: Vec<(usize, usize)> = labels
                .indexed_iter()
                .filter(|&(_, &label)| label == class)
                .map(|(pixel, _)| pixel)
                .collect();
            let samples: Vec<(usize, usize)> = (0..SAMPLES_PER_CLASS)
                .map(|_| pixels[rng.gen_range(0..pixels.len())])
                .collect();

            let mut saliency = Array2::<f32>::zeros((height, width));
            for &pixel in &samples {
                let handle = dense.resolve_pixel_score(raw, pixel)?;
                let gradient = self.model.score_gradient(&handle, &example)?;
                saliency += &render::max_abs_channel(&gradient);
            }

            let mut image = faded.clone();
            let mask = labels.mapv(|label| label == class);
            render::overlay_mask(&mut image, mask.view(), REGION_COLOR, OVERLAY_OPACITY);
            scatter_salient(&mut image, &saliency);
            render::mark_points(&mut image, &samples, 1, SAMPLE_COLOR);

            let probability = samples
                .iter()
                .map(|&(y, x)| probabilities[[y, x, class]])
                .sum::<f32>()
                / samples.len() as f32;
            titles.push(format!("{}: {:.2}%", name, probability * 100.0));
            gradient_image_names.push(render::save_png(
                &image,
                output_dir,
                render::artifact_name(stem, &format!("segsaliency{}", class)),
            )?);
            predict_probs.push(RankedPrediction::new(class, name, probability));
        }
        predict_probs.sort_by(|a, b| b.probability.total_cmp(&a.probability));

        Ok(VisualizationResult::SaliencySegMaps {
            input_filename: input.filename.clone(),
            predict_probs,
            gradient_image_names,
            titles,
            width_multiple: width_multiple(height, width),
        })
    }
}

/// Colour the [`SCATTER_PIXELS`] most salient pixels on a red scale.
///
/// The scale runs from the smallest drawn value to the value ranked
/// [`SATURATION_RANK`], so a few extreme pixels do not wash out the rest.
fn scatter_salient(image: &mut RgbImage, saliency: &Array2<f32>) {
    let mut ranked: Vec<((usize, usize), f32)> =
        saliency.indexed_iter().map(|(pixel, &v)| (pixel, v)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(SCATTER_PIXELS);

    let (Some(&(_, vmax)), Some(&(_, vmin))) =
        (ranked.get(SATURATION_RANK).or(ranked.last()), ranked.last())
    else {
        return;
    };
    let range = vmax - vmin;
    for ((y, x), v) in ranked {
        let t = if range > f32::EPSILON { (v - vmin) / range } else { 1.0 };
        image.put_pixel(x as u32, y as u32, Colormap::Reds.color(t));
    }
}

impl Visualization for SaliencySegMaps {
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
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        inputs
            .iter()
            .map(|input| self.explain(input, output_dir, &mut rng))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubModel, StubSegmenter};
    use crate::ExplainError;

    fn run(vis: &mut SaliencySegMaps, dir: &Path) -> VisualizationResult {
        let inputs = vec![StubSegmenter::input("street.png", 40, 20)];
        vis.make_visualization(&inputs, dir).unwrap().remove(0)
    }

    #[test]
    fn test_one_map_per_class() {
        let dir = tempfile::tempdir().unwrap();
        let mut vis = SaliencySegMaps::new(Arc::new(StubSegmenter::new()));

        match run(&mut vis, dir.path()) {
            VisualizationResult::SaliencySegMaps {
                predict_probs,
                gradient_image_names,
                titles,
                width_multiple,
                ..
            } => {
                assert_eq!(gradient_image_names.len(), 2);
                assert_eq!(titles.len(), 2);
                assert!(titles[0].starts_with("cat: 92.0"));
                assert!(titles[1].starts_with("dog: 92.0"));
                assert_eq!(predict_probs.len(), 2);
                assert!(predict_probs.windows(2).all(|w| w[0].probability >= w[1].probability));
                assert_eq!(width_multiple, 488.0);

                for name in &gradient_image_names {
                    let img = image::open(dir.path().join(name)).unwrap();
                    assert_eq!((img.width(), img.height()), (40, 20));
                }
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_sampling_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let model: Arc<dyn Model> = Arc::new(StubSegmenter::new());
        let mut a = SaliencySegMaps::new(model.clone()).with_seed(7);
        let mut b = SaliencySegMaps::new(model).with_seed(7);

        let (a, b) = (run(&mut a, dir.path()), run(&mut b, dir.path()));
        let load = |r: &VisualizationResult| -> Vec<RgbImage> {
            r.artifacts()
                .iter()
                .map(|name| image::open(dir.path().join(name)).unwrap().to_rgb8())
                .collect()
        };
        assert_eq!(load(&a), load(&b));
    }

    #[test]
    fn test_scatter_saturates_at_rank() {
        let mut img = RgbImage::new(20, 20);
        let saliency = Array2::from_shape_fn((20, 20), |(y, x)| (y * 20 + x) as f32);
        scatter_salient(&mut img, &saliency);
        // The top 201 values share the darkest colour.
        assert_eq!(img.get_pixel(19, 19), &Colormap::Reds.color(1.0));
        assert_eq!(img.get_pixel(0, 10), &Colormap::Reds.color(1.0));
        assert_eq!(img.get_pixel(0, 0), &Colormap::Reds.color(0.0));
    }

    #[test]
    fn test_scatter_tolerates_nan() {
        let mut img = RgbImage::new(20, 20);
        let mut saliency = Array2::from_shape_fn((20, 20), |(y, x)| (y * 20 + x) as f32);
        saliency[[5, 5]] = f32::NAN;
        scatter_salient(&mut img, &saliency);
        assert_eq!(img.get_pixel(19, 19), &Colormap::Reds.color(1.0));
        assert_eq!(img.get_pixel(0, 0), &Colormap::Reds.color(0.0));
    }

    #[test]
    fn test_requires_dense_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut vis = SaliencySegMaps::new(Arc::new(StubModel::new(3)));
        let err = vis
            .make_visualization(&[StubModel::input("a.png", 8, 8)], dir.path())
            .unwrap_err();
        assert!(matches!(err, ExplainError::IncompatibleModel { .. }));
    }
}
