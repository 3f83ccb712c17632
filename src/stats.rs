//! Summary statistics over the valid pixels of a record.
//!
//! Every run produces the same metrics in the same order
//! (see [`METRIC_NAMES`]). The standard deviation is the
//! sample one (`n - 1`), quantiles interpolate linearly
//! between order statistics, and `peak_density` is the mode
//! of a Gaussian kernel density estimate.

use serde_derive::*;
use statrs::statistics::Statistics;
use tracing::warn;

use crate::{
    density::{gaussian_kde, DEFAULT_GRID},
    record::{Metrics, Selector, ThermalRecord},
};

pub const METRIC_NAMES: [&str; 11] = [
    "min",
    "max",
    "mean",
    "median",
    "sd",
    "q25",
    "q75",
    "iqr",
    "cv",
    "peak_density",
    "n_pixels",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StatsOptions {
    pub selector: Selector,
    /// Number of points the density is evaluated at.
    pub density_grid: usize,
}

impl Default for StatsOptions {
    fn default() -> Self {
        StatsOptions {
            selector: Selector::Processed,
            density_grid: DEFAULT_GRID,
        }
    }
}

/// Quantile `p` of sorted values, interpolating linearly
/// between the two closest order statistics. NaN when empty.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * p.max(0.).min(1.);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Summarize the finite values among `values`.
pub fn summarize<I>(values: I, density_grid: usize) -> Metrics
where
    I: IntoIterator<Item = f64>,
{
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut metrics = Metrics::new();
    let n = sorted.len();
    if n == 0 {
        for name in METRIC_NAMES.iter() {
            metrics.insert(*name, f64::NAN);
        }
        metrics.insert("n_pixels", 0.);
        return metrics;
    }

    let mean = sorted.iter().mean();
    let sd = if n > 1 { sorted.iter().std_dev() } else { f64::NAN };
    let q25 = quantile_sorted(&sorted, 0.25);
    let q75 = quantile_sorted(&sorted, 0.75);
    let peak = gaussian_kde(&sorted, density_grid)
        .map(|d| d.mode())
        .unwrap_or(f64::NAN);

    metrics.insert("min", sorted[0]);
    metrics.insert("max", sorted[n - 1]);
    metrics.insert("mean", mean);
    metrics.insert("median", quantile_sorted(&sorted, 0.5));
    metrics.insert("sd", sd);
    metrics.insert("q25", q25);
    metrics.insert("q75", q75);
    metrics.insert("iqr", q75 - q25);
    metrics.insert("cv", sd / mean);
    metrics.insert("peak_density", peak);
    metrics.insert("n_pixels", n as f64);
    metrics
}

/// Compute statistics over the selected matrix and store
/// them on the record, replacing earlier results.
pub fn compute_stats<'a>(record: &'a mut ThermalRecord, opts: &StatsOptions) -> &'a Metrics {
    let metrics = summarize(
        record.selected(opts.selector).iter().copied(),
        opts.density_grid,
    );
    if metrics.get("n_pixels") == Some(0.) {
        warn!(
            file = record.filename(),
            "no valid pixels; all statistics are missing"
        );
    }
    record.set_statistics(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MISSING;
    use ndarray::{array, Array2};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn quantiles_interpolate() {
        let v = [1., 2., 3., 4.];
        assert!(close(quantile_sorted(&v, 0.5), 2.5));
        assert!(close(quantile_sorted(&v, 0.25), 1.75));
        assert!(close(quantile_sorted(&v, 0.75), 3.25));
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn summary_of_known_values() {
        let m = summarize(vec![2., 4., 4., 4., 5., 5., 7., 9.], DEFAULT_GRID);
        assert!(close(m.get("min").unwrap(), 2.));
        assert!(close(m.get("max").unwrap(), 9.));
        assert!(close(m.get("mean").unwrap(), 5.));
        assert!(close(m.get("median").unwrap(), 4.5));
        // sample sd of this set is sqrt(32 / 7)
        assert!(close(m.get("sd").unwrap(), (32f64 / 7.).sqrt()));
        assert!(close(m.get("iqr").unwrap(), m.get("q75").unwrap() - m.get("q25").unwrap()));
        assert!(close(m.get("cv").unwrap(), (32f64 / 7.).sqrt() / 5.));
        assert_eq!(m.get("n_pixels"), Some(8.));
        let peak = m.get("peak_density").unwrap();
        assert!(peak > 3. && peak < 6., "peak {}", peak);
    }

    #[test]
    fn metric_order_is_fixed() {
        let m = summarize(vec![1., 2., 3.], 64);
        assert_eq!(m.names().collect::<Vec<_>>(), METRIC_NAMES.to_vec());
        let empty = summarize(vec![], 64);
        assert_eq!(empty.names().collect::<Vec<_>>(), METRIC_NAMES.to_vec());
    }

    #[test]
    fn all_missing_gives_missing_metrics() -> crate::Result<()> {
        let mut rec = ThermalRecord::from_matrix(array![[1., 2.]], "a")?;
        rec.set_processed(array![[MISSING, MISSING]])?;
        let m = compute_stats(&mut rec, &StatsOptions::default()).clone();
        for (name, value) in m.iter() {
            if name == "n_pixels" {
                assert_eq!(value, 0.);
            } else {
                assert!(value.is_nan(), "{} = {}", name, value);
            }
        }
        Ok(())
    }

    #[test]
    fn corner_outlier_before_masking() -> crate::Result<()> {
        let mut raw = Array2::from_elem((4, 4), 30.0);
        raw[(0, 0)] = 10.0;
        let mut rec = ThermalRecord::from_matrix(raw, "a")?;
        let opts = StatsOptions {
            selector: Selector::Raw,
            ..StatsOptions::default()
        };
        let m = compute_stats(&mut rec, &opts);
        assert_eq!(m.get("min"), Some(10.0));
        assert_eq!(m.get("max"), Some(30.0));
        Ok(())
    }

    #[test]
    fn recomputing_replaces_statistics() -> crate::Result<()> {
        let mut rec = ThermalRecord::from_matrix(array![[1., 2.], [3., 4.]], "a")?;
        let mut custom = Metrics::new();
        custom.insert("custom", 1.);
        rec.set_statistics(custom);
        compute_stats(&mut rec, &StatsOptions::default());
        let stats = rec.statistics().expect("stats");
        assert_eq!(stats.get("custom"), None);
        assert_eq!(stats.get("mean"), Some(2.5));
        Ok(())
    }

    #[test]
    fn single_value_has_missing_sd() {
        let m = summarize(vec![f64::NAN, 3.], 16);
        assert_eq!(m.get("mean"), Some(3.));
        assert!(m.get("sd").unwrap().is_nan());
        assert!(m.get("cv").unwrap().is_nan());
    }
}
