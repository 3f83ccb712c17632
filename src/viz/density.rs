//! Kernel density curves of pixel temperatures, with the
//! usual landmarks marked.

use std::str::FromStr;

use image::{Rgba, RgbaImage};
use serde_derive::*;

use super::{canvas, value_range};
use crate::{
    density::{gaussian_kde, Density, DEFAULT_GRID},
    error::{Error, Result},
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Landmark {
    Peak,
    Min,
    Max,
}

impl FromStr for Landmark {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "peak" => Ok(Landmark::Peak),
            "min" => Ok(Landmark::Min),
            "max" => Ok(Landmark::Max),
            _ => Err(Error::invalid(format!("unknown landmark `{}`", s))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DensityPlotOptions {
    pub grid: usize,
    pub landmarks: Vec<Landmark>,
}

impl Default for DensityPlotOptions {
    fn default() -> Self {
        DensityPlotOptions {
            grid: DEFAULT_GRID,
            landmarks: vec![Landmark::Peak],
        }
    }
}

/// A landmark located on the curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub landmark: Landmark,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DensityPlot {
    pub curve: Density,
    pub markers: Vec<Marker>,
}

/// Estimate the density of the valid `values` and locate the
/// requested landmarks. `min` and `max` are the extreme
/// observed values.
pub fn density_plot(values: &[f64], opts: &DensityPlotOptions) -> Result<DensityPlot> {
    let curve = gaussian_kde(values, opts.grid)
        .ok_or_else(|| Error::EmptyInput("no valid values to estimate a density from".into()))?;
    let (lo, hi) = value_range(values).unwrap_or((f64::NAN, f64::NAN));
    let markers = opts
        .landmarks
        .iter()
        .map(|&landmark| {
            let (x, y) = match landmark {
                Landmark::Peak => curve.peak(),
                Landmark::Min => (lo, curve.value_at(lo)),
                Landmark::Max => (hi, curve.value_at(hi)),
            };
            Marker { landmark, x, y }
        })
        .collect();
    Ok(DensityPlot { curve, markers })
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RenderDensityOptions {
    pub width: u32,
    pub height: u32,
    /// Blank border around the plot area.
    pub margin: u32,
    pub line: [u8; 4],
    pub marker: [u8; 4],
    pub background: [u8; 4],
}

impl Default for RenderDensityOptions {
    fn default() -> Self {
        RenderDensityOptions {
            width: 480,
            height: 320,
            margin: 20,
            line: [0x3C, 0x54, 0x88, 255],
            marker: [0xE6, 0x4B, 0x35, 255],
            background: [255, 255, 255, 255],
        }
    }
}

/// Draw the curve as a polyline over a baseline, with a
/// vertical rule and dot at every marker.
pub fn render_density(plot: &DensityPlot, opts: &RenderDensityOptions) -> Result<RgbaImage> {
    if opts.width <= 2 * opts.margin || opts.height <= 2 * opts.margin {
        return Err(Error::invalid("plot area is empty; enlarge the image or shrink the margin"));
    }
    let curve = &plot.curve;
    let n = curve.x.len();
    if n == 0 {
        return Err(Error::EmptyInput("density curve has no points".into()));
    }
    let (x0, x1) = (curve.x[0], curve.x[n - 1]);
    let y_max = curve.y.iter().cloned().fold(0., f64::max);

    let m = opts.margin as f64;
    let (w, h) = ((opts.width - 2 * opts.margin) as f64, (opts.height - 2 * opts.margin) as f64);
    let px = |x: f64| {
        if x1 > x0 {
            m + (x - x0) / (x1 - x0) * w
        } else {
            m + w / 2.
        }
    };
    let py = |y: f64| if y_max > 0. { m + h - y / y_max * h } else { m + h };

    let mut img = canvas::blank(opts.width, opts.height, Rgba(opts.background));
    let axis = Rgba([0, 0, 0, 255]);
    canvas::line(&mut img, m, m + h, m + w, m + h, axis);
    canvas::line(&mut img, m, m, m, m + h, axis);

    let line = Rgba(opts.line);
    for i in 1..n {
        canvas::line(
            &mut img,
            px(curve.x[i - 1]),
            py(curve.y[i - 1]),
            px(curve.x[i]),
            py(curve.y[i]),
            line,
        );
    }
    let marker = Rgba(opts.marker);
    for mk in &plot.markers {
        if !mk.x.is_finite() {
            continue;
        }
        canvas::line(&mut img, px(mk.x), m + h, px(mk.x), py(mk.y), marker);
        canvas::dot(&mut img, px(mk.x), py(mk.y), 3., marker);
    }
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<f64> {
        let mut v: Vec<f64> = (0..40).map(|i| 34. + (i % 8) as f64 * 0.25).collect();
        v.push(f64::NAN);
        v.push(30.);
        v
    }

    #[test]
    fn landmarks_are_located() -> Result<()> {
        let opts = DensityPlotOptions {
            grid: 256,
            landmarks: vec![Landmark::Min, Landmark::Peak, Landmark::Max],
        };
        let plot = density_plot(&sample(), &opts)?;
        assert_eq!(plot.markers.len(), 3);
        assert_eq!(plot.markers[0].x, 30.);
        assert_eq!(plot.markers[2].x, 35.75);
        let peak = plot.markers[1];
        assert!(peak.x > 34. && peak.x < 36., "peak at {}", peak.x);
        assert!(peak.y >= plot.markers[0].y && peak.y >= plot.markers[2].y);
        Ok(())
    }

    #[test]
    fn empty_values_are_an_error() {
        assert!(matches!(
            density_plot(&[f64::NAN], &DensityPlotOptions::default()),
            Err(Error::EmptyInput(_))
        ));
    }

    #[test]
    fn renders_curve_and_markers() -> Result<()> {
        let plot = density_plot(&sample(), &DensityPlotOptions::default())?;
        let opts = RenderDensityOptions::default();
        let img = render_density(&plot, &opts)?;
        assert_eq!(img.dimensions(), (opts.width, opts.height));
        assert!(img.pixels().any(|p| *p == Rgba(opts.line)));
        assert!(img.pixels().any(|p| *p == Rgba(opts.marker)));

        let tiny = RenderDensityOptions {
            width: 30,
            ..RenderDensityOptions::default()
        };
        assert!(render_density(&plot, &tiny).is_err());
        Ok(())
    }
}
