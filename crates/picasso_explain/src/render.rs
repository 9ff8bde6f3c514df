//! Rendering helpers shared by the visualizers.
//!
//! Colour maps are piecewise-linear approximations of the matplotlib maps of
//! the same name, sampled at nine evenly spaced stops.

use std::path::Path;

use ab_glyph::FontArc;
use chrono::Local;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::Rng;

use crate::error::{ExplainError, Result};
use crate::visualization::LegendEntry;

/// Largest legend label height in pixels.
const LEGEND_FONT_SCALE: f32 = 16.0;

/// Gap around legend labels.
const LEGEND_LABEL_PAD: u32 = 4;

const LEGEND_TEXT: Rgb<u8> = Rgb([0, 0, 0]);

const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 44, 122],
    [59, 81, 139],
    [44, 113, 142],
    [33, 144, 141],
    [39, 173, 129],
    [92, 200, 99],
    [170, 220, 50],
    [253, 231, 37],
];

const INFERNO: [[u8; 3]; 9] = [
    [0, 0, 4],
    [31, 12, 72],
    [85, 15, 109],
    [136, 34, 106],
    [186, 54, 85],
    [227, 89, 51],
    [249, 140, 10],
    [249, 201, 50],
    [252, 255, 164],
];

const REDS: [[u8; 3]; 9] = [
    [255, 245, 240],
    [254, 224, 210],
    [252, 187, 161],
    [252, 146, 114],
    [251, 106, 74],
    [239, 59, 44],
    [203, 24, 29],
    [165, 15, 21],
    [103, 0, 13],
];

/// A sequential colour map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    /// Perceptually uniform blue-green-yellow.
    Viridis,
    /// Black-red-yellow.
    Inferno,
    /// White to dark red.
    Reds,
}

impl Colormap {
    fn stops(self) -> &'static [[u8; 3]; 9] {
        match self {
            Self::Viridis => &VIRIDIS,
            Self::Inferno => &INFERNO,
            Self::Reds => &REDS,
        }
    }

    /// Colour at `t`, clamped to `[0, 1]`. NaN maps to the lowest colour.
    pub fn color(self, t: f32) -> Rgb<u8> {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let pos = t * (stops.len() - 1) as f32;
        let lower = (pos.floor() as usize).min(stops.len() - 2);
        let frac = pos - lower as f32;

        let (a, b) = (stops[lower], stops[lower + 1]);
        Rgb(std::array::from_fn(|c| {
            (a[c] as f32 + (b[c] as f32 - a[c] as f32) * frac).round() as u8
        }))
    }
}

/// Rescale values linearly to `[0, 1]`; constant inputs become zeros.
pub fn normalize(values: ArrayView2<'_, f32>) -> Array2<f32> {
    let min = values.fold(f32::INFINITY, |m, &v| m.min(v));
    let max = values.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let range = max - min;
    if range > 1e-12 {
        values.mapv(|v| (v - min) / range)
    } else {
        Array2::zeros(values.raw_dim())
    }
}

/// Collapse `(H, W, C)` gradients to `(H, W)` by the largest magnitude per pixel.
pub fn max_abs_channel(gradient: &Array3<f32>) -> Array2<f32> {
    gradient.map_axis(Axis(2), |pixel| pixel.fold(0.0f32, |m, &v| m.max(v.abs())))
}

/// Colour `values` with `cmap`, mapping `vmin..=vmax` onto the full map.
pub fn heatmap(values: ArrayView2<'_, f32>, vmin: f32, vmax: f32, cmap: Colormap) -> RgbImage {
    let (height, width) = values.dim();
    let range = vmax - vmin;
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let v = values[[y as usize, x as usize]];
        let t = if range.abs() > f32::EPSILON {
            (v - vmin) / range
        } else {
            0.0
        };
        cmap.color(t)
    })
}

/// Resize with nearest-neighbour sampling, keeping blocky grid cells.
pub fn upscale_nearest(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    image::imageops::resize(img, width, height, FilterType::Nearest)
}

/// Per-pixel `base * alpha + top * (1 - alpha)`. Both images must share a size.
pub fn blend(base: &RgbImage, alpha: f32, top: &RgbImage) -> RgbImage {
    let alpha = alpha.clamp(0.0, 1.0);
    RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let (b, t) = (base.get_pixel(x, y), top.get_pixel(x, y));
        Rgb(std::array::from_fn(|c| {
            (b[c] as f32 * alpha + t[c] as f32 * (1.0 - alpha)).round() as u8
        }))
    })
}

/// Paint `color` with opacity `opacity / 255` wherever `mask` is set.
pub fn overlay_mask(img: &mut RgbImage, mask: ArrayView2<'_, bool>, color: [u8; 3], opacity: u8) {
    let a = opacity as f32 / 255.0;
    for ((y, x), &on) in mask.indexed_iter() {
        if !on || x as u32 >= img.width() || y as u32 >= img.height() {
            continue;
        }
        let pixel = img.get_pixel_mut(x as u32, y as u32);
        for c in 0..3 {
            pixel[c] = (color[c] as f32 * a + pixel[c] as f32 * (1.0 - a)).round() as u8;
        }
    }
}

/// Convert an `(H, W, C)` array of `0..=255` values to an RGB image.
///
/// Single-channel arrays are replicated to grey.
pub fn array_to_rgb(array: &Array3<f32>) -> RgbImage {
    let (height, width, channels) = array.dim();
    let value = |y: usize, x: usize, c: usize| array[[y, x, c.min(channels.saturating_sub(1))]];
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb(std::array::from_fn(|c| value(y, x, c).round().clamp(0.0, 255.0) as u8))
    })
}

/// Fill the clipped rectangle `(top, left, height, width)` with `color`.
pub fn fill_rect(img: &mut RgbImage, top: usize, left: usize, height: usize, width: usize, color: Rgb<u8>) {
    let bottom = (top + height).min(img.height() as usize);
    let right = (left + width).min(img.width() as usize);
    if top >= bottom || left >= right {
        return;
    }
    let rect = Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32);
    draw_filled_rect_mut(img, rect, color);
}

/// Mark `(row, col)` points with small filled circles.
pub fn mark_points(img: &mut RgbImage, points: &[(usize, usize)], radius: i32, color: Rgb<u8>) {
    for &(row, col) in points {
        draw_filled_circle_mut(img, (col as i32, row as i32), radius, color);
    }
}

/// Read a TrueType or OpenType font for legend labels.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
        .map_err(|_| ExplainError::Font(path.display().to_string()))?;
    tracing::info!("Loaded legend font: {}", path.display());
    Ok(font)
}

/// Append a vertical strip of colour swatches to the right of `img`.
///
/// With a `font`, every swatch is followed by its class name; without one
/// the strip holds the swatches only.
pub fn append_legend(img: &RgbImage, entries: &[LegendEntry], font: Option<&FontArc>) -> RgbImage {
    let swatch_width = (img.width() / 20).max(8);
    let swatch = (img.height() as usize / entries.len().max(1)).max(1);
    let scale = (swatch as f32 * 0.8).clamp(1.0, LEGEND_FONT_SCALE);

    let label_width = match font {
        Some(font) if !entries.is_empty() => {
            let widest = entries
                .iter()
                .map(|entry| text_size(scale, font, &entry.name).0)
                .max()
                .unwrap_or(0);
            widest + 2 * LEGEND_LABEL_PAD
        }
        _ => 0,
    };

    let strip = swatch_width + label_width;
    let mut out = RgbImage::from_pixel(img.width() + strip, img.height(), Rgb([255, 255, 255]));
    image::imageops::replace(&mut out, img, 0, 0);

    for (i, entry) in entries.iter().enumerate() {
        fill_rect(
            &mut out,
            i * swatch,
            img.width() as usize,
            swatch,
            swatch_width as usize,
            Rgb(entry.color),
        );
        if let Some(font) = font {
            let x = (img.width() + swatch_width + LEGEND_LABEL_PAD) as i32;
            let y = (i * swatch) as i32 + ((swatch as f32 - scale) / 2.0).max(0.0) as i32;
            draw_text_mut(&mut out, LEGEND_TEXT, x, y, scale, font, &entry.name);
        }
    }
    out
}

/// A collision resistant PNG filename built from `stem` and `tag`.
pub fn artifact_name(stem: &str, tag: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!(
        "{}-{}-{}-{:08x}.png",
        stem,
        tag,
        Local::now().format("%Y%m%d%H%M%S%6f"),
        suffix
    )
}

/// Write `img` as PNG to `output_dir/name` and return `name`.
pub fn save_png(img: &RgbImage, output_dir: &Path, name: String) -> Result<String> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(&name);
    img.save_with_format(&path, image::ImageFormat::Png)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(name)
}
