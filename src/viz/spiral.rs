//! Phyllotaxis layout: records placed along a sunflower
//! spiral, one golden angle apart.

use std::f64::consts::PI;

use image::{Rgba, RgbaImage};
use serde_derive::*;

use super::{
    canvas,
    montage::{cell_size, render_tiles},
    palette::Colormap,
};
use crate::{
    error::{Error, Result},
    record::{RecordSet, Selector},
};

/// `pi * (3 - sqrt(5))`, about 137.5 degrees.
pub fn golden_angle() -> f64 {
    PI * (3. - 5f64.sqrt())
}

/// Centres of `n` points; point `i` lies at radius
/// `spacing * sqrt(i)` and angle `i * golden_angle()`.
pub fn phyllotaxis(n: usize, spacing: f64) -> Vec<(f64, f64)> {
    let angle = golden_angle();
    (0..n)
        .map(|i| {
            let r = spacing * (i as f64).sqrt();
            let theta = i as f64 * angle;
            (r * theta.cos(), r * theta.sin())
        })
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SpiralOptions {
    /// Radial scale in output pixels. Defaults to the
    /// largest tile dimension.
    pub spacing: Option<f64>,
    pub colormap: Colormap,
    pub range: Option<(f64, f64)>,
    pub selector: Selector,
    pub scale: u32,
    pub padding: u32,
    pub background: [u8; 4],
}

impl Default for SpiralOptions {
    fn default() -> Self {
        SpiralOptions {
            spacing: None,
            colormap: Colormap::default(),
            range: None,
            selector: Selector::Processed,
            scale: 1,
            padding: 2,
            background: [0, 0, 0, 0],
        }
    }
}

/// Place the cropped records of `set` on a spiral, first
/// record in the centre.
pub fn render_spiral(set: &RecordSet, opts: &SpiralOptions) -> Result<RgbaImage> {
    if let Some(spacing) = opts.spacing {
        if !(spacing > 0.) {
            return Err(Error::invalid(format!("spiral spacing must be positive, got {}", spacing)));
        }
    }
    let tiles: Vec<RgbaImage> = render_tiles(set, opts.selector, opts.colormap, opts.range, opts.scale)?
        .into_iter()
        .flatten()
        .collect();
    let (cell_w, cell_h) = cell_size(&tiles);
    let spacing = opts.spacing.unwrap_or_else(|| cell_w.max(cell_h) as f64);
    let centres = phyllotaxis(tiles.len(), spacing);

    // top-left corners relative to the spiral origin
    let corners: Vec<(f64, f64)> = tiles
        .iter()
        .zip(&centres)
        .map(|(t, (x, y))| (x - t.width() as f64 / 2., y - t.height() as f64 / 2.))
        .collect();
    let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let max_x = tiles
        .iter()
        .zip(&corners)
        .map(|(t, c)| c.0 + t.width() as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let max_y = tiles
        .iter()
        .zip(&corners)
        .map(|(t, c)| c.1 + t.height() as f64)
        .fold(f64::NEG_INFINITY, f64::max);

    let pad = opts.padding as f64;
    let width = (max_x - min_x + 2. * pad).ceil().max(1.) as u32;
    let height = (max_y - min_y + 2. * pad).ceil().max(1.) as u32;
    let mut out = canvas::blank(width, height, Rgba(opts.background));
    for (tile, (x, y)) in tiles.iter().zip(&corners) {
        canvas::paste(
            &mut out,
            tile,
            (x - min_x + pad).round() as i64,
            (y - min_y + pad).round() as i64,
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ThermalRecord, MISSING};
    use ndarray::{array, Array2};

    #[test]
    fn points_follow_the_golden_angle() {
        let pts = phyllotaxis(4, 2.);
        assert_eq!(pts[0], (0., 0.));
        let (x, y) = pts[1];
        assert!(((x * x + y * y).sqrt() - 2.).abs() < 1e-12);
        assert!((y.atan2(x) - golden_angle()).abs() < 1e-12);
        let (x, y) = pts[3];
        assert!(((x * x + y * y).sqrt() - 2. * 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn radii_grow_monotonically() {
        let radii: Vec<f64> = phyllotaxis(50, 1.)
            .iter()
            .map(|(x, y)| (x * x + y * y).sqrt())
            .collect();
        assert!(radii.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn renders_every_record_with_valid_pixels() -> Result<()> {
        let mut set = RecordSet::new();
        for i in 0..5 {
            let m = Array2::from_elem((3, 3), 30. + i as f64);
            set.insert(format!("r{}", i), ThermalRecord::from_matrix(m, "r")?);
        }
        set.insert("blank", ThermalRecord::from_matrix(array![[MISSING]], "blank")?);

        let opts = SpiralOptions {
            padding: 0,
            ..SpiralOptions::default()
        };
        let img = render_spiral(&set, &opts)?;
        let opaque = img.pixels().filter(|p| p[3] > 0).count();
        // tiles may overlap, but never more than fully
        assert!(opaque >= 9 && opaque <= 5 * 9, "opaque {}", opaque);
        assert!(img.width() > 3 && img.height() > 3);
        Ok(())
    }

    #[test]
    fn rejects_non_positive_spacing() -> Result<()> {
        let mut set = RecordSet::new();
        set.insert("a", ThermalRecord::from_matrix(array![[1.]], "a")?);
        let opts = SpiralOptions {
            spacing: Some(0.),
            ..SpiralOptions::default()
        };
        assert!(render_spiral(&set, &opts).is_err());
        Ok(())
    }
}
