//! Colour-mapped rendering of a temperature matrix.

use image::{Rgba, RgbaImage};
use ndarray::ArrayView2;
use serde_derive::*;

use super::{palette::Colormap, value_range};
use crate::error::{Error, Result};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HeatmapOptions {
    pub colormap: Colormap,
    /// Values mapped to the ends of the colormap. Defaults
    /// to the finite range of the matrix.
    pub range: Option<(f64, f64)>,
    /// Each matrix cell becomes a `scale x scale` block.
    pub scale: u32,
}

impl Default for HeatmapOptions {
    fn default() -> Self {
        HeatmapOptions {
            colormap: Colormap::default(),
            range: None,
            scale: 1,
        }
    }
}

/// Render `m` with rows top to bottom. Missing pixels are
/// transparent.
pub fn render_heatmap(m: ArrayView2<'_, f64>, opts: &HeatmapOptions) -> Result<RgbaImage> {
    if opts.scale == 0 {
        return Err(Error::invalid("heatmap scale must be at least 1"));
    }
    if let Some((lo, hi)) = opts.range {
        if !(lo <= hi) {
            return Err(Error::invalid(format!("heatmap range [{}, {}] is empty", lo, hi)));
        }
    }
    let (rows, cols) = m.dim();
    let (lo, hi) = opts.range.or_else(|| value_range(m.iter())).unwrap_or((0., 1.));
    let span = hi - lo;

    let scale = opts.scale;
    let mut img = RgbaImage::from_pixel(cols as u32 * scale, rows as u32 * scale, TRANSPARENT);
    for ((r, c), v) in m.indexed_iter() {
        if !v.is_finite() {
            continue;
        }
        let t = if span > 0. { (v - lo) / span } else { 0.5 };
        let color = opts.colormap.rgba(t);
        for dy in 0..scale {
            for dx in 0..scale {
                img.put_pixel(c as u32 * scale + dx, r as u32 * scale + dy, color);
            }
        }
    }
    Ok(img)
}
