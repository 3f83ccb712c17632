//! Grouped comparison charts: per-group summaries and a
//! bar or box chart with the individual values overlaid.

use std::str::FromStr;

use image::{Rgb, Rgba, RgbaImage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_derive::*;
use statrs::statistics::Statistics;

use super::{canvas, palette::Palette};
use crate::{
    error::{Error, Result},
    stats::quantile_sorted,
    table::{Cell, Table},
};

/// Label of the group formed by rows with a missing group.
pub const MISSING_GROUP: &str = "NA";

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub group: String,
    /// Valid values in row order.
    pub values: Vec<f64>,
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub se: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Most extreme values within 1.5 IQR of the quartiles.
    pub whisker_low: f64,
    pub whisker_high: f64,
    pub outliers: Vec<f64>,
}

impl GroupSummary {
    fn new(group: String, values: Vec<f64>) -> Self {
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let mean = if n > 0 { sorted.iter().mean() } else { f64::NAN };
        let sd = if n > 1 { sorted.iter().std_dev() } else { f64::NAN };
        let (q1, median, q3) = (
            quantile_sorted(&sorted, 0.25),
            quantile_sorted(&sorted, 0.5),
            quantile_sorted(&sorted, 0.75),
        );
        let reach = 1.5 * (q3 - q1);
        let inside = |v: &&f64| **v >= q1 - reach && **v <= q3 + reach;
        let whisker_low = sorted.iter().find(inside).copied().unwrap_or(f64::NAN);
        let whisker_high = sorted.iter().rev().find(inside).copied().unwrap_or(f64::NAN);
        let outliers = sorted
            .iter()
            .filter(|v| !inside(v))
            .copied()
            .collect();
        GroupSummary {
            group,
            values,
            n,
            mean,
            sd,
            se: sd / (n as f64).sqrt(),
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
            outliers,
        }
    }
}

/// Summarize `value_col` per distinct `group_col` value, in
/// order of first appearance. Missing values are skipped.
pub fn group_summaries(table: &Table, group_col: &str, value_col: &str) -> Result<Vec<GroupSummary>> {
    let group_idx = table.column_index(group_col)?;
    let value_idx = table.column_index(value_col)?;
    if !table.is_numeric_column(value_idx) {
        return Err(Error::SchemaMismatch(format!(
            "column `{}` is not numeric",
            value_col
        )));
    }

    let mut groups: Vec<(String, Vec<f64>)> = vec![];
    for row in table.rows() {
        let key = row[group_idx].key().unwrap_or_else(|| MISSING_GROUP.to_string());
        let pos = match groups.iter().position(|(g, _)| *g == key) {
            Some(pos) => pos,
            None => {
                groups.push((key, vec![]));
                groups.len() - 1
            }
        };
        if let Cell::Number(v) = row[value_idx] {
            groups[pos].1.push(v);
        }
    }
    Ok(groups
        .into_iter()
        .map(|(g, values)| GroupSummary::new(g, values))
        .collect())
}

/// `n` horizontal offsets uniform in `[-width / 2, width / 2]`,
/// reproducible for a given `seed`.
pub fn jitter(n: usize, width: f64, seed: u64) -> Vec<f64> {
    let half = width.abs() / 2.;
    if half == 0. {
        return vec![0.; n];
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.random_range(-half..=half)).collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Mean with a one-sd error bar.
    Bar,
    Box,
}

impl FromStr for ChartKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bar" => Ok(ChartKind::Bar),
            "box" => Ok(ChartKind::Box),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ComparisonOptions {
    pub kind: ChartKind,
    pub palette: Palette,
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    /// Overlay the individual values.
    pub points: bool,
    /// Jitter spread as a fraction of a group's slot.
    pub jitter: f64,
    pub seed: u64,
    pub background: [u8; 4],
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        ComparisonOptions {
            kind: ChartKind::Bar,
            palette: Palette::Npg,
            width: 480,
            height: 320,
            margin: 20,
            points: true,
            jitter: 0.3,
            seed: 42,
            background: [255, 255, 255, 255],
        }
    }
}

fn shade(c: Rgb<u8>, alpha: u8) -> Rgba<u8> {
    Rgba([c[0], c[1], c[2], alpha])
}

fn darken(c: Rgb<u8>) -> Rgba<u8> {
    Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 255])
}

/// Vertical extent covering every drawn element.
fn value_extent(summaries: &[GroupSummary], kind: ChartKind) -> Option<(f64, f64)> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for s in summaries {
        let mut take = |v: f64| {
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        };
        s.values.iter().for_each(|v| take(*v));
        if kind == ChartKind::Bar && s.sd.is_finite() {
            take(s.mean - s.sd);
            take(s.mean + s.sd);
        }
    }
    if lo > hi {
        return None;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1. };
    Some((lo - pad, hi + pad))
}

/// One slot per group, left to right, coloured from
/// `opts.palette`.
pub fn render_comparison(summaries: &[GroupSummary], opts: &ComparisonOptions) -> Result<RgbaImage> {
    if opts.width <= 2 * opts.margin || opts.height <= 2 * opts.margin {
        return Err(Error::invalid("chart area is empty; enlarge the image or shrink the margin"));
    }
    let (lo, hi) = value_extent(summaries, opts.kind)
        .ok_or_else(|| Error::EmptyInput("no group has valid values".into()))?;

    let m = opts.margin as f64;
    let w = (opts.width - 2 * opts.margin) as f64;
    let h = (opts.height - 2 * opts.margin) as f64;
    let py = |v: f64| m + h - (v - lo) / (hi - lo) * h;
    let slot = w / summaries.len() as f64;
    let half_box = slot * 0.3;

    let mut img = canvas::blank(opts.width, opts.height, Rgba(opts.background));
    let axis = Rgba([0, 0, 0, 255]);
    canvas::line(&mut img, m, m + h, m + w, m + h, axis);
    canvas::line(&mut img, m, m, m, m + h, axis);

    let colors = opts.palette.colors(summaries.len());
    for (i, (s, color)) in summaries.iter().zip(colors).enumerate() {
        if s.n == 0 {
            continue;
        }
        let cx = m + slot * (i as f64 + 0.5);
        let (left, right) = (cx - half_box, cx + half_box);
        let edge = darken(color);
        match opts.kind {
            ChartKind::Bar => {
                canvas::fill_rect(&mut img, left, py(s.mean), right, m + h, shade(color, 160));
                canvas::stroke_rect(&mut img, left, py(s.mean), right, m + h, edge);
                if s.sd.is_finite() {
                    canvas::line(&mut img, cx, py(s.mean - s.sd), cx, py(s.mean + s.sd), edge);
                    for v in &[s.mean - s.sd, s.mean + s.sd] {
                        canvas::line(&mut img, cx - half_box / 2., py(*v), cx + half_box / 2., py(*v), edge);
                    }
                }
            }
            ChartKind::Box => {
                canvas::fill_rect(&mut img, left, py(s.q3), right, py(s.q1), shade(color, 160));
                canvas::stroke_rect(&mut img, left, py(s.q3), right, py(s.q1), edge);
                canvas::line(&mut img, left, py(s.median), right, py(s.median), edge);
                canvas::line(&mut img, cx, py(s.q3), cx, py(s.whisker_high), edge);
                canvas::line(&mut img, cx, py(s.q1), cx, py(s.whisker_low), edge);
            }
        }
        if opts.points {
            let offsets = jitter(s.values.len(), opts.jitter * slot, opts.seed.wrapping_add(i as u64));
            for (v, dx) in s.values.iter().zip(offsets) {
                canvas::dot(&mut img, cx + dx, py(*v), 2., edge);
            }
        }
    }
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn table() -> Table {
        Table::read_csv(Cursor::new(
            "group,mean\nctrl,36\ntreat,34\nctrl,38\nctrl,NA\ntreat,35\n,30\nctrl,37\nctrl,60\n",
        ))
        .expect("csv")
    }

    #[test]
    fn summaries_per_group() -> Result<()> {
        let groups = group_summaries(&table(), "group", "mean")?;
        let names: Vec<_> = groups.iter().map(|g| g.group.as_str()).collect();
        assert_eq!(names, vec!["ctrl", "treat", MISSING_GROUP]);

        let ctrl = &groups[0];
        assert_eq!(ctrl.values, vec![36., 38., 37., 60.]);
        assert_eq!(ctrl.n, 4);
        assert_eq!(ctrl.median, 37.5);
        // q1 = 36.75, q3 = 43.5, upper fence 53.625
        assert_eq!(ctrl.whisker_high, 38.);
        assert_eq!(ctrl.whisker_low, 36.);
        assert_eq!(ctrl.outliers, vec![60.]);
        assert!((ctrl.se - ctrl.sd / 2.).abs() < 1e-12);

        let na = &groups[2];
        assert_eq!(na.n, 1);
        assert!(na.sd.is_nan());
        Ok(())
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        assert!(matches!(
            group_summaries(&table(), "mean", "group"),
            Err(Error::SchemaMismatch(_))
        ));
        assert!(matches!(
            group_summaries(&table(), "sex", "mean"),
            Err(Error::MissingColumn(_))
        ));
    }

    #[test]
    fn jitter_is_seeded_and_bounded() {
        let a = jitter(50, 0.4, 7);
        assert_eq!(a, jitter(50, 0.4, 7));
        assert_ne!(a, jitter(50, 0.4, 8));
        assert!(a.iter().all(|d| d.abs() <= 0.2));
        assert_eq!(jitter(3, 0., 1), vec![0.; 3]);
    }

    #[test]
    fn both_chart_kinds_render() -> Result<()> {
        let groups = group_summaries(&table(), "group", "mean")?;
        for kind in &[ChartKind::Bar, ChartKind::Box] {
            let opts = ComparisonOptions {
                kind: *kind,
                ..ComparisonOptions::default()
            };
            let img = render_comparison(&groups, &opts)?;
            assert_eq!(img.dimensions(), (480, 320));
            let first = Palette::Npg.colors(1)[0];
            assert!(img.pixels().any(|p| p[0] != 255 || p[1] != 255 || p[2] != 255));
            assert!(img.pixels().any(|p| *p == darken(first)));
        }
        Ok(())
    }

    #[test]
    fn empty_groups_cannot_be_drawn() {
        assert!(render_comparison(&[], &ComparisonOptions::default()).is_err());
    }
}
