//! Separating the subject from the background.
//!
//! [`segment_roi`] chains the classic steps: rescale to
//! `[0, 1]`, pick a global threshold with Otsu's method,
//! clean the binary mask with a disc-shaped opening and
//! closing, then keep only the largest connected component.
//! [`filter_threshold`] is the simple alternative that
//! keeps pixels inside a fixed temperature range.
//!
//! Both write their result into the record's processed
//! matrix (background becomes [`MISSING`]) and drop stale
//! statistics.

use std::{collections::VecDeque, str::FromStr};

use ndarray::{Array2, ArrayView2, Zip};
use serde_derive::*;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    record::{Selector, ThermalRecord, MISSING},
};

/// Histogram resolution used by Otsu's method.
pub const OTSU_BINS: usize = 256;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    Otsu,
}

impl FromStr for ThresholdMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "otsu" => Ok(ThresholdMethod::Otsu),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Four,
    Eight,
}

impl FromStr for Connectivity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "4" | "four" => Ok(Connectivity::Four),
            "8" | "eight" => Ok(Connectivity::Eight),
            _ => Err(Error::invalid(format!("connectivity must be 4 or 8, got `{}`", s))),
        }
    }
}

impl Connectivity {
    fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &[(-1, 0), (1, 0), (0, -1), (0, 1)],
            Connectivity::Eight => &[
                (-1, -1),
                (-1, 0),
                (-1, 1),
                (0, -1),
                (0, 1),
                (1, -1),
                (1, 0),
                (1, 1),
            ],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SegmentOptions {
    pub method: ThresholdMethod,
    /// Apply opening then closing to the thresholded mask.
    pub morphology: bool,
    /// Diameter of the disc structuring element (odd).
    pub kernel_size: usize,
    pub keep_largest: bool,
    pub connectivity: Connectivity,
    /// Matrix to segment. Segmenting `Processed` composes
    /// with earlier masking.
    pub selector: Selector,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        SegmentOptions {
            method: ThresholdMethod::Otsu,
            morphology: true,
            kernel_size: 5,
            keep_largest: true,
            connectivity: Connectivity::Eight,
            selector: Selector::Processed,
        }
    }
}

/// What a segmentation run found.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SegmentReport {
    /// Threshold on the normalized `[0, 1]` scale.
    pub threshold: f64,
    pub components: usize,
    pub retained_pixels: usize,
}

/// Rescale finite values linearly to `[0, 1]`. Missing
/// pixels stay missing; a constant image maps to zeros.
pub fn normalize(m: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    let (lo, hi) = m
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return Err(Error::EmptyInput(
            "all pixels of the selected matrix are missing".into(),
        ));
    }
    let range = hi - lo;
    Ok(m.mapv(|v| {
        if !v.is_finite() {
            MISSING
        } else if range > 0. {
            (v - lo) / range
        } else {
            0.
        }
    }))
}

/// Otsu's threshold for values in `[0, 1]`.
///
/// Returns the upper edge of the last background bin, which
/// is the lower edge of the first foreground bin, so
/// foreground is `value >= threshold` (see
/// [`threshold_mask`]). Non-finite values are ignored. Ties
/// keep the lowest bin.
pub fn otsu_threshold<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut histogram = [0usize; OTSU_BINS];
    let mut total = 0usize;
    for &v in values.into_iter().filter(|v| v.is_finite()) {
        let bin = ((v.max(0.).min(1.)) * OTSU_BINS as f64) as usize;
        histogram[bin.min(OTSU_BINS - 1)] += 1;
        total += 1;
    }

    let total = total as f64;
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut weight_bg = 0.;
    let mut sum_bg = 0.;
    let mut best = (0., 0usize);
    for (t, &count) in histogram.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0. {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0. {
            break;
        }
        sum_bg += t as f64 * count as f64;

        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_total - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between > best.0 {
            best = (between, t);
        }
    }

    (best.1 + 1) as f64 / OTSU_BINS as f64
}

/// Foreground mask of normalized values against an
/// [`otsu_threshold`] result. Missing pixels are background.
pub fn threshold_mask(normalized: ArrayView2<'_, f64>, threshold: f64) -> Array2<bool> {
    normalized.mapv(|v| v.is_finite() && v >= threshold)
}

/// Offsets covered by a disc of the given diameter.
pub fn disc(diameter: usize) -> Result<Vec<(isize, isize)>> {
    if diameter == 0 || diameter % 2 == 0 {
        return Err(Error::invalid(format!(
            "structuring element size must be odd and positive, got {}",
            diameter
        )));
    }
    let r = (diameter / 2) as isize;
    let limit = (diameter as f64 / 2.).powi(2);
    let mut offsets = vec![];
    for dy in -r..=r {
        for dx in -r..=r {
            if ((dx * dx + dy * dy) as f64) <= limit {
                offsets.push((dy, dx));
            }
        }
    }
    Ok(offsets)
}

// Neighbours outside the image are ignored.
fn morph(mask: &Array2<bool>, element: &[(isize, isize)], erode: bool) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mut neighbours = element.iter().filter_map(|&(dy, dx)| {
            let y = r as isize + dy;
            let x = c as isize + dx;
            if y < 0 || x < 0 || y >= rows as isize || x >= cols as isize {
                None
            } else {
                Some(mask[(y as usize, x as usize)])
            }
        });
        if erode {
            neighbours.all(|v| v)
        } else {
            neighbours.any(|v| v)
        }
    })
}

pub fn erode(mask: &Array2<bool>, element: &[(isize, isize)]) -> Array2<bool> {
    morph(mask, element, true)
}

pub fn dilate(mask: &Array2<bool>, element: &[(isize, isize)]) -> Array2<bool> {
    morph(mask, element, false)
}

/// Erosion then dilation: removes specks smaller than the
/// element.
pub fn open(mask: &Array2<bool>, element: &[(isize, isize)]) -> Array2<bool> {
    dilate(&erode(mask, element), element)
}

/// Dilation then erosion: fills holes smaller than the
/// element.
pub fn close(mask: &Array2<bool>, element: &[(isize, isize)]) -> Array2<bool> {
    erode(&dilate(mask, element), element)
}

/// Connected regions of a binary mask.
#[derive(Debug, Clone)]
pub struct Labels {
    /// 0 for background, `1..=count` for regions, numbered
    /// in raster order of their first pixel.
    pub map: Array2<usize>,
    /// `sizes[i]` is the pixel count of label `i + 1`.
    pub sizes: Vec<usize>,
}

impl Labels {
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    /// Label with the most pixels; the lowest label wins a
    /// tie.
    pub fn largest(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (i, &size) in self.sizes.iter().enumerate() {
            if best.map_or(true, |(_, s)| size > s) {
                best = Some((i + 1, size));
            }
        }
        best.map(|(label, _)| label)
    }

    pub fn mask_of(&self, label: usize) -> Array2<bool> {
        self.map.mapv(|l| l == label)
    }
}

pub fn label_components(mask: &Array2<bool>, connectivity: Connectivity) -> Labels {
    let (rows, cols) = mask.dim();
    let mut map = Array2::<usize>::zeros((rows, cols));
    let mut sizes = vec![];
    let mut queue = VecDeque::new();

    for r in 0..rows {
        for c in 0..cols {
            if !mask[(r, c)] || map[(r, c)] != 0 {
                continue;
            }
            let label = sizes.len() + 1;
            let mut size = 0;
            map[(r, c)] = label;
            queue.push_back((r, c));
            while let Some((y, x)) = queue.pop_front() {
                size += 1;
                for &(dy, dx) in connectivity.offsets() {
                    let ny = y as isize + dy;
                    let nx = x as isize + dx;
                    if ny < 0 || nx < 0 || ny >= rows as isize || nx >= cols as isize {
                        continue;
                    }
                    let (ny, nx) = (ny as usize, nx as usize);
                    if mask[(ny, nx)] && map[(ny, nx)] == 0 {
                        map[(ny, nx)] = label;
                        queue.push_back((ny, nx));
                    }
                }
            }
            sizes.push(size);
        }
    }
    Labels { map, sizes }
}

/// Keep only the largest region of `mask`. Returns an
/// all-false mask when there are no regions.
pub fn largest_component(mask: &Array2<bool>, connectivity: Connectivity) -> (Array2<bool>, usize) {
    let labels = label_components(mask, connectivity);
    match labels.largest() {
        Some(label) => (labels.mask_of(label), labels.count()),
        None => (Array2::from_elem(mask.dim(), false), 0),
    }
}

/// Segment the subject with Otsu thresholding and
/// morphological cleanup.
pub fn segment_roi(record: &mut ThermalRecord, opts: &SegmentOptions) -> Result<SegmentReport> {
    let element = if opts.morphology {
        Some(disc(opts.kernel_size)?)
    } else {
        None
    };

    let source = record.selected(opts.selector).to_owned();
    let normalized = normalize(source.view())?;
    let threshold = match opts.method {
        ThresholdMethod::Otsu => otsu_threshold(normalized.iter()),
    };
    let mut mask = threshold_mask(normalized.view(), threshold);

    if let Some(element) = &element {
        mask = close(&open(&mask, element), element);
        // the cleanup may not grow into missing pixels
        Zip::from(&mut mask)
            .and(&normalized)
            .for_each(|m, v| *m = *m && v.is_finite());
    }

    let labels = label_components(&mask, opts.connectivity);
    let components = labels.count();
    if opts.keep_largest {
        if let Some(label) = labels.largest() {
            mask = labels.mask_of(label);
        }
    }
    if components == 0 {
        warn!(
            file = record.filename(),
            "no foreground components found; masking the whole image"
        );
    }

    let processed = Zip::from(&source)
        .and(&mask)
        .map_collect(|&v, &keep| if keep { v } else { MISSING });
    let retained_pixels = mask.iter().filter(|m| **m).count();
    record.set_processed(processed)?;

    debug!(
        file = record.filename(),
        threshold, components, retained_pixels, "segmented"
    );
    Ok(SegmentReport {
        threshold,
        components,
        retained_pixels,
    })
}

/// Keep pixels whose value lies in `[min, max]`; use
/// infinities for open bounds.
pub fn filter_threshold(
    record: &mut ThermalRecord,
    min: f64,
    max: f64,
    selector: Selector,
) -> Result<usize> {
    if min.is_nan() || max.is_nan() || min > max {
        return Err(Error::invalid(format!(
            "threshold range [{}, {}] is empty or undefined",
            min, max
        )));
    }
    let filtered = record
        .selected(selector)
        .mapv(|v| if v >= min && v <= max { v } else { MISSING });
    let kept = filtered.iter().filter(|v| v.is_finite()).count();
    if kept == 0 {
        warn!(file = record.filename(), min, max, "threshold filter removed every pixel");
    }
    record.set_processed(filtered)?;
    Ok(kept)
}
