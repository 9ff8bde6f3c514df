//! Visualizations for dense (per-pixel) models.

mod probabilities;
mod saliency;

pub use probabilities::{SegmentProbabilities, DESCRIPTOR as SEGMENT_PROBABILITIES};
pub use saliency::{SaliencySegMaps, DESCRIPTOR as SALIENCY_SEG_MAPS};

use ndarray::{Array2, ArrayView3, Axis};
use picasso_models::{Model, SegmentationModel};

use crate::error::{ExplainError, Result};

/// Displayed class index of the background.
pub const BACKGROUND: usize = 0;

/// Background is only shown when it covers fewer pixels than this.
pub const BACKGROUND_MAX_PIXELS: usize = 100;

/// Overlay colours indexed by displayed class; the background is grey.
pub const PALETTE: [[u8; 3]; 7] = [
    [128, 128, 128],
    [0, 255, 0],
    [255, 0, 0],
    [0, 0, 255],
    [0, 255, 255],
    [255, 0, 127],
    [255, 255, 102],
];

/// Opacity of class overlays.
pub const OVERLAY_OPACITY: u8 = 122;

/// Display height the width multiple refers to.
const DISPLAY_HEIGHT: f32 = 244.0;

/// Colour of displayed class `class`.
pub fn class_color(class: usize) -> [u8; 3] {
    PALETTE[class % PALETTE.len()]
}

pub(crate) fn dense_model<'a>(
    model: &'a dyn Model,
    visualizer: &str,
) -> Result<&'a dyn SegmentationModel> {
    model.as_segmentation().ok_or_else(|| ExplainError::IncompatibleModel {
        visualizer: visualizer.to_string(),
        reason: "model has no per-pixel output".to_string(),
    })
}

/// Most probable class of every pixel of an `(H, W, K)` array.
pub fn argmax_labels(probabilities: ArrayView3<'_, f32>) -> Array2<usize> {
    probabilities.map_axis(Axis(2), |pixel| {
        pixel
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
            .0
    })
}

/// Classes worth showing with their pixel counts, in class order.
///
/// A class needs at least one pixel; the background is only kept while it
/// covers fewer than [`BACKGROUND_MAX_PIXELS`] pixels.
pub fn relevant_classes(labels: &Array2<usize>, n_classes: usize) -> Vec<(usize, usize)> {
    let mut counts = vec![0usize; n_classes];
    for &label in labels {
        if let Some(count) = counts.get_mut(label) {
            *count += 1;
        }
    }
    counts
        .into_iter()
        .enumerate()
        .filter(|&(class, count)| {
            count > 0 && (class != BACKGROUND || count < BACKGROUND_MAX_PIXELS)
        })
        .collect()
}

/// Display width for an image shown [`DISPLAY_HEIGHT`] pixels tall.
pub fn width_multiple(height: usize, width: usize) -> f32 {
    DISPLAY_HEIGHT * width as f32 / height.max(1) as f32
}
