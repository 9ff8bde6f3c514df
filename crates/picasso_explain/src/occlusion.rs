//! Occlusion-sensitivity maps.
//!
//! Blocks out a window of the image at every point of a regular grid and
//! records how the probability of each top class changes. Regions where the
//! probability drops are important to the classification.
//!
//! Reference: Zeiler & Fergus, "Visualizing and Understanding Convolutional
//! Networks" (<https://arxiv.org/abs/1311.2901>).

use std::path::Path;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array2;
use picasso_core::{ranked_indices, CoreError, InputImage};
use picasso_models::Model;
use rayon::prelude::*;

use crate::error::{ExplainError, Result};
use crate::render::{self, Colormap};
use crate::settings::{SettingSpec, VisualizationSettings};
use crate::visualization::{Descriptor, Visualization, VisualizationResult};

const SETTINGS: &[SettingSpec] = &[
    SettingSpec::new("Window", &["0.50", "0.40", "0.30", "0.20", "0.10", "0.05"]),
    SettingSpec::new("Strides", &["2", "5", "10", "20", "30"]),
    SettingSpec::new("Occlusion", &["grey", "black", "white"]),
];

/// Descriptor of [`PartialOcclusion`].
pub static DESCRIPTOR: Descriptor = Descriptor {
    name: "PartialOcclusion",
    description: "Partially occlude image to determine regions important to classification",
    reference_link: Some("https://arxiv.org/abs/1311.2901"),
    allowed_settings: SETTINGS,
};

/// Default working resolution `(width, height)`.
pub const WORKING_SIZE: (u32, u32) = (244, 244);

/// Fill value of the window drawn on the example image.
const EXAMPLE_FILL: u8 = 100;

/// Grid mark half-size as a fraction of the image size.
const GRID_FRACTION: f32 = 0.01;

/// A clipped occlusion window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// First row.
    pub top: usize,
    /// First column.
    pub left: usize,
    /// Rows covered.
    pub height: usize,
    /// Columns covered.
    pub width: usize,
}

/// Window centers laid out on a `strides x strides` grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcclusionGrid {
    image_height: usize,
    image_width: usize,
    /// Window size `(height, width)` in pixels.
    pub window: (usize, usize),
    /// Half window `(vertical, horizontal)`.
    pub pad: (usize, usize),
    /// Row of each center.
    pub centers_vertical: Vec<usize>,
    /// Column of each center.
    pub centers_horizontal: Vec<usize>,
}

fn linspace(start: usize, end: usize, count: usize) -> Vec<usize> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..count)
            .map(|i| {
                let t = i as f64 / (count - 1) as f64;
                (start as f64 + (end as f64 - start as f64) * t) as usize
            })
            .collect(),
    }
}

impl OcclusionGrid {
    /// Grid for a `height x width` image.
    ///
    /// The window covers `fraction` of each side (at least one pixel) and
    /// `strides` centers run from one half window to `size - half window`.
    pub fn new(height: usize, width: usize, fraction: f32, strides: usize) -> Self {
        let window_height = ((fraction * height as f32).round() as usize).max(1);
        let window_width = ((fraction * width as f32).round() as usize).max(1);
        let (pad_v, pad_h) = (window_height / 2, window_width / 2);

        Self {
            image_height: height,
            image_width: width,
            window: (window_height, window_width),
            pad: (pad_v, pad_h),
            centers_vertical: linspace(pad_v, height.saturating_sub(pad_v), strides),
            centers_horizontal: linspace(pad_h, width.saturating_sub(pad_h), strides),
        }
    }

    fn clipped(&self, center: (usize, usize), pad: (usize, usize), size: (usize, usize)) -> Window {
        let top = center.0.saturating_sub(pad.0).min(self.image_height.saturating_sub(1));
        let left = center.1.saturating_sub(pad.1).min(self.image_width.saturating_sub(1));
        Window {
            top,
            left,
            height: size.0.min(self.image_height - top),
            width: size.1.min(self.image_width - left),
        }
    }

    /// Every occlusion window: vertical centers outer, horizontal inner.
    pub fn windows(&self) -> Vec<Window> {
        self.centers_vertical
            .iter()
            .flat_map(|&cv| {
                self.centers_horizontal
                    .iter()
                    .map(move |&ch| self.clipped((cv, ch), self.pad, self.window))
            })
            .collect()
    }

    /// Window at the second center on each axis, or the first when there is one.
    pub fn example_window(&self) -> Option<Window> {
        let cv = self.centers_vertical.get(1).or(self.centers_vertical.first())?;
        let ch = self.centers_horizontal.get(1).or(self.centers_horizontal.first())?;
        Some(self.clipped((*cv, *ch), self.pad, self.window))
    }

    /// Small marks centered on every grid point.
    pub fn grid_marks(&self) -> Vec<Window> {
        let half = |size: usize| ((GRID_FRACTION * size as f32).round() as usize).max(1);
        let pad = (half(self.image_height), half(self.image_width));
        let size = (2 * pad.0, 2 * pad.1);
        self.centers_vertical
            .iter()
            .flat_map(|&cv| {
                self.centers_horizontal
                    .iter()
                    .map(move |&ch| self.clipped((cv, ch), pad, size))
            })
            .collect()
    }
}

/// Occlusion-sensitivity visualizer.
pub struct PartialOcclusion {
    model: Arc<dyn Model>,
    settings: VisualizationSettings,
    working_size: Option<(u32, u32)>,
}

impl PartialOcclusion {
    /// Create a visualizer for `model` with default settings.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            settings: VisualizationSettings::new(DESCRIPTOR.name, SETTINGS),
            working_size: Some(WORKING_SIZE),
        }
    }

    /// Resize inputs to `(width, height)` before occluding, or keep their
    /// size with `None`.
    #[must_use]
    pub fn with_working_size(mut self, size: Option<(u32, u32)>) -> Self {
        self.working_size = size;
        self
    }

    fn fill_value(&self) -> u8 {
        match self.settings.get("Occlusion") {
            Some("black") => 0,
            Some("white") => 255,
            _ => 128,
        }
    }

    /// Grid over a `width x height` working image under the current settings.
    fn grid(&self, width: u32, height: u32) -> Result<OcclusionGrid> {
        let fraction: f32 = self.settings.parse("Window")?;
        let strides: usize = self.settings.parse("Strides")?;
        Ok(OcclusionGrid::new(height as usize, width as usize, fraction, strides))
    }

    /// Probability of each `tracked` class with every window of `grid`
    /// occluded, as one `rows x columns` map per class. Rows follow the
    /// vertical centers and columns the horizontal ones.
    fn occlusion_maps(
        &self,
        working: &RgbImage,
        grid: &OcclusionGrid,
        tracked: &[usize],
    ) -> Result<Vec<Array2<f32>>> {
        let fill = Rgb([self.fill_value(); 3]);
        let occluded: Vec<DynamicImage> = grid
            .windows()
            .into_par_iter()
            .map(|w| {
                let mut copy = working.clone();
                render::fill_rect(&mut copy, w.top, w.left, w.height, w.width, fill);
                DynamicImage::ImageRgb8(copy)
            })
            .collect();

        // One forward pass over every occluded copy; the probabilities are
        // read directly, without re-ranking.
        let occluded_batch = self.model.preprocess(&occluded)?;
        let occluded_probs = self.model.predict(&occluded_batch)?;

        let shape = (grid.centers_vertical.len(), grid.centers_horizontal.len());
        tracked
            .iter()
            .map(|&class| {
                Array2::from_shape_vec(shape, occluded_probs.column(class).to_vec())
                    .map_err(|e| ExplainError::from(CoreError::InvalidInput(e.to_string())))
            })
            .collect()
    }

    fn explain(&self, input: &InputImage, output_dir: &Path) -> Result<VisualizationResult> {
        let batch = self.model.preprocess(std::slice::from_ref(&input.data))?;
        let probabilities = self.model.predict(&batch)?;
        let predict_probs = self
            .model
            .decode(&probabilities)
            .into_iter()
            .next()
            .unwrap_or_default();
        let tracked = ranked_indices(&predict_probs);

        let working = match self.working_size {
            Some((width, height)) => input.data.resize_exact(width, height, FilterType::Lanczos3),
            None => input.data.clone(),
        }
        .to_rgb8();
        let (width, height) = working.dimensions();
        let grid = self.grid(width, height)?;
        tracing::debug!(
            "Occluding {} with {}x{} windows of {:?}",
            input.filename,
            grid.centers_vertical.len(),
            grid.centers_horizontal.len(),
            grid.window
        );
        let maps = self.occlusion_maps(&working, &grid, &tracked)?;

        let stem = input.stem();
        let mut result_filenames = Vec::with_capacity(maps.len());
        for (rank, cells) in maps.iter().enumerate() {
            let map = render::heatmap(cells.view(), 0.0, 1.0, Colormap::Viridis);
            let map = render::upscale_nearest(&map, width, height);
            result_filenames.push(render::save_png(
                &map,
                output_dir,
                render::artifact_name(stem, &format!("occlusion{}", rank)),
            )?);
        }

        let example = example_image(&working, &grid);
        let example_filename =
            render::save_png(&example, output_dir, render::artifact_name(stem, "example"))?;

        Ok(VisualizationResult::PartialOcclusion {
            input_filename: input.filename.clone(),
            result_filenames,
            predict_probs,
            example_filename,
        })
    }
}

/// Draw one representative occlusion and the grid of window centers.
fn example_image(working: &RgbImage, grid: &OcclusionGrid) -> RgbImage {
    let mut example = working.clone();
    if let Some(w) = grid.example_window() {
        render::fill_rect(&mut example, w.top, w.left, w.height, w.width, Rgb([EXAMPLE_FILL; 3]));
    }
    for mark in grid.grid_marks() {
        render::fill_rect(&mut example, mark.top, mark.left, mark.height, mark.width, Rgb([0; 3]));
    }
    example
}

impl Visualization for PartialOcclusion {
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
