//! Deterministic stand-in models for visualizer tests.

use std::collections::BTreeMap;

use chrono::Local;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{s, Array2, Array3, Array4, Axis};
use picasso_core::imaging::{rgb_to_array, stack_examples};
use picasso_core::{InputImage, InputShape};
use picasso_models::{
    DenseDecoding, Model, ModelError, ModelMetadata, ScoreHandle, ScoreNode, SegmentationModel,
};

pub(crate) fn changes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn metadata(name: &str) -> ModelMetadata {
    ModelMetadata {
        model_name: name.to_string(),
        checkpoint_name: "stub.mpk".to_string(),
        checkpoint_time: String::new(),
        loaded_at: Local::now(),
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

/// Classifier over 8x8 RGB inputs whose class `k` logit is `(k + 1) * mean`.
pub(crate) struct StubModel {
    metadata: ModelMetadata,
    n_classes: usize,
}

impl StubModel {
    pub(crate) fn new(n_classes: usize) -> Self {
        Self {
            metadata: metadata("StubModel"),
            n_classes,
        }
    }

    /// A `width x height` colour gradient.
    pub(crate) fn input(filename: &str, width: u32, height: u32) -> InputImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        });
        InputImage::new(filename, DynamicImage::ImageRgb8(img))
    }
}

impl Model for StubModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn input_shape(&self) -> InputShape {
        InputShape::new(8, 8, 3)
    }

    fn num_classes(&self) -> usize {
        self.n_classes
    }

    fn class_name(&self, index: usize) -> String {
        format!("class{}", index)
    }

    fn preprocess(&self, images: &[DynamicImage]) -> picasso_models::Result<Array4<f32>> {
        let examples: Vec<Array3<f32>> = images
            .iter()
            .map(|img| rgb_to_array(&img.resize_exact(8, 8, FilterType::Triangle).to_rgb8(), 1.0 / 255.0))
            .collect();
        Ok(stack_examples(&examples)?)
    }

    fn predict(&self, batch: &Array4<f32>) -> picasso_models::Result<Array2<f32>> {
        self.input_shape().check_batch(batch)?;
        let mut out = Array2::zeros((batch.dim().0, self.n_classes));
        for (example, mut row) in batch.outer_iter().zip(out.outer_iter_mut()) {
            let mean = example.mean().unwrap_or(0.0);
            let logits: Vec<f32> = (0..self.n_classes).map(|k| (k + 1) as f32 * mean).collect();
            for (slot, p) in row.iter_mut().zip(softmax(&logits)) {
                *slot = p;
            }
        }
        Ok(out)
    }

    fn resolve_class_score(&self, class_index: usize) -> picasso_models::Result<ScoreHandle> {
        if class_index >= self.n_classes {
            return Err(ModelError::GradientResolution(format!("class {}", class_index)));
        }
        Ok(ScoreHandle {
            class_index,
            pixel: None,
            node: ScoreNode::TerminalOperand,
        })
    }

    fn score_gradient(
        &self,
        handle: &ScoreHandle,
        input: &Array3<f32>,
    ) -> picasso_models::Result<Array3<f32>> {
        let scale = (handle.class_index + 1) as f32;
        Ok(input.mapv(|v| v * scale))
    }
}

/// Raw classes of [`StubSegmenter`]; `sky` is never displayed.
const SEG_CLASSES: [&str; 4] = ["background", "cat", "sky", "dog"];

/// Segmenter labelling red pixels `cat` and blue pixels `dog`.
pub(crate) struct StubSegmenter {
    metadata: ModelMetadata,
}

impl StubSegmenter {
    pub(crate) fn new() -> Self {
        Self {
            metadata: metadata("StubSegmenter"),
        }
    }

    /// A black image with a red block in the top-left quarter and a blue
    /// block in the bottom-right quarter.
    pub(crate) fn input(filename: &str, width: u32, height: u32) -> InputImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            if x < width / 2 && y < height / 2 {
                Rgb([255, 0, 0])
            } else if x >= width / 2 && y >= height / 2 {
                Rgb([0, 0, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        InputImage::new(filename, DynamicImage::ImageRgb8(img))
    }
}

impl Model for StubSegmenter {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn input_shape(&self) -> InputShape {
        InputShape::dynamic(3)
    }

    fn num_classes(&self) -> usize {
        SEG_CLASSES.len()
    }

    fn class_name(&self, index: usize) -> String {
        SEG_CLASSES.get(index).map_or_else(|| index.to_string(), |s| s.to_string())
    }

    fn predict(&self, batch: &Array4<f32>) -> picasso_models::Result<Array2<f32>> {
        let dense = self.predict_dense(batch)?;
        let probs = dense.map_axis(Axis(3), |pixel| {
            let logits: Vec<f32> = pixel.to_vec();
            softmax(&logits)
        });
        let mut out = Array2::zeros((batch.dim().0, SEG_CLASSES.len()));
        for (b, mut row) in out.outer_iter_mut().enumerate() {
            let pixels = probs.index_axis(Axis(0), b);
            let count = pixels.len().max(1) as f32;
            for p in pixels.iter() {
                for (slot, v) in row.iter_mut().zip(p) {
                    *slot += v / count;
                }
            }
        }
        Ok(out)
    }

    fn resolve_class_score(&self, class_index: usize) -> picasso_models::Result<ScoreHandle> {
        self.resolve_pixel_score(class_index, (0, 0)).map(|h| ScoreHandle { pixel: None, ..h })
    }

    /// One-hot at the scored pixel, scaled by the class index plus one.
    fn score_gradient(
        &self,
        handle: &ScoreHandle,
        input: &Array3<f32>,
    ) -> picasso_models::Result<Array3<f32>> {
        let mut grad = Array3::zeros(input.raw_dim());
        if let Some((row, col)) = handle.pixel {
            let (height, width, _) = input.dim();
            if row >= height || col >= width {
                return Err(ModelError::GradientResolution("pixel out of bounds".to_string()));
            }
            grad.slice_mut(s![row, col, ..])
                .fill((handle.class_index + 1) as f32);
        }
        Ok(grad)
    }

    fn as_segmentation(&self) -> Option<&dyn SegmentationModel> {
        Some(self)
    }
}

impl SegmentationModel for StubSegmenter {
    fn predict_dense(&self, batch: &Array4<f32>) -> picasso_models::Result<Array4<f32>> {
        self.input_shape().check_batch(batch)?;
        let (n, height, width, _) = batch.dim();
        Ok(Array4::from_shape_fn((n, height, width, SEG_CLASSES.len()), |(b, y, x, k)| {
            let (r, blue) = (batch[[b, y, x, 0]] / 255.0, batch[[b, y, x, 2]] / 255.0);
            match k {
                0 => 1.0,
                1 => 4.0 * r,
                3 => 4.0 * blue,
                _ => 0.0,
            }
        }))
    }

    fn decode_dense(&self, scores: &Array4<f32>) -> picasso_models::Result<DenseDecoding> {
        let raw = [0usize, 1, 3];
        let (n, height, width, _) = scores.dim();
        let mut probabilities = Array4::zeros((n, height, width, raw.len()));
        for b in 0..n {
            for y in 0..height {
                for x in 0..width {
                    let pixel: Vec<f32> = (0..SEG_CLASSES.len()).map(|k| scores[[b, y, x, k]]).collect();
                    let p = softmax(&pixel);
                    for (i, &r) in raw.iter().enumerate() {
                        probabilities[[b, y, x, i]] = p[r];
                    }
                }
            }
        }
        Ok(DenseDecoding {
            probabilities,
            class_names: raw
                .iter()
                .enumerate()
                .map(|(i, &r)| (i, SEG_CLASSES[r].to_string()))
                .collect(),
            raw_index: raw.iter().copied().enumerate().collect(),
        })
    }

    fn resolve_pixel_score(
        &self,
        raw_class: usize,
        pixel: (usize, usize),
    ) -> picasso_models::Result<ScoreHandle> {
        if raw_class >= SEG_CLASSES.len() {
            return Err(ModelError::GradientResolution(format!("class {}", raw_class)));
        }
        Ok(ScoreHandle {
            class_index: raw_class,
            pixel: Some(pixel),
            node: ScoreNode::TerminalOperand,
        })
    }
}
