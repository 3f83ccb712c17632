//! Gaussian kernel density estimation.
//!
//! The bandwidth follows Silverman's rule of thumb
//! (`0.9 * min(sd, IQR / 1.34) * n^(-1/5)`), and the density
//! is evaluated on an evenly spaced grid reaching three
//! bandwidths past the data on either side.

use std::f64::consts::PI;

use statrs::statistics::Statistics;

use crate::stats::quantile_sorted;

/// Grid size used unless the caller asks otherwise.
pub const DEFAULT_GRID: usize = 512;

const CUT: f64 = 3.;

#[derive(Debug, Clone, PartialEq)]
pub struct Density {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub bandwidth: f64,
}

impl Density {
    /// Location of the highest density; the first grid
    /// point wins a tie. NaN for an empty curve.
    pub fn mode(&self) -> f64 {
        let n = self.x.len().min(self.y.len());
        if n == 0 {
            return f64::NAN;
        }
        let mut best = 0;
        for (i, y) in self.y[..n].iter().enumerate() {
            if *y > self.y[best] {
                best = i;
            }
        }
        self.x[best]
    }

    pub fn peak(&self) -> (f64, f64) {
        let mode = self.mode();
        match self.x.iter().position(|x| *x == mode) {
            Some(idx) => (mode, self.y[idx]),
            None => (f64::NAN, f64::NAN),
        }
    }

    /// Density interpolated linearly at `at`; zero outside
    /// the grid.
    pub fn value_at(&self, at: f64) -> f64 {
        let n = self.x.len().min(self.y.len());
        if n == 0 || at < self.x[0] || at > self.x[n - 1] {
            return 0.;
        }
        if n == 1 {
            return self.y[0];
        }
        let step = (self.x[n - 1] - self.x[0]) / (n - 1) as f64;
        if step == 0. {
            return self.y[0];
        }
        let pos = (at - self.x[0]) / step;
        let i = (pos.floor() as usize).min(n - 2);
        let frac = pos - i as f64;
        self.y[i] * (1. - frac) + self.y[i + 1] * frac
    }
}

/// Silverman's rule-of-thumb bandwidth for sorted values.
pub fn silverman_bandwidth(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    let sd = if n > 1 { sorted.iter().std_dev() } else { 0. };
    let iqr = quantile_sorted(sorted, 0.75) - quantile_sorted(sorted, 0.25);

    let mut lo = sd.min(iqr / 1.34);
    if !(lo > 0.) {
        lo = if sd > 0. {
            sd
        } else if sorted.first().map_or(false, |v| v.abs() > 0.) {
            sorted[0].abs()
        } else {
            1.
        };
    }
    0.9 * lo * (n as f64).powf(-0.2)
}

/// Estimate the density of the finite values in `values`.
/// Returns `None` when there are none.
pub fn gaussian_kde(values: &[f64], grid: usize) -> Option<Density> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() || grid == 0 {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let h = silverman_bandwidth(&sorted);
    let from = sorted[0] - CUT * h;
    let to = sorted[sorted.len() - 1] + CUT * h;
    let step = if grid > 1 {
        (to - from) / (grid - 1) as f64
    } else {
        0.
    };

    let norm = 1. / (sorted.len() as f64 * h * (2. * PI).sqrt());
    let x: Vec<f64> = (0..grid).map(|i| from + step * i as f64).collect();
    let y = x
        .iter()
        .map(|&at| {
            let sum: f64 = sorted
                .iter()
                .map(|v| {
                    let u = (at - v) / h;
                    (-0.5 * u * u).exp()
                })
                .sum();
            sum * norm
        })
        .collect();

    Some(Density { x, y, bandwidth: h })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidth_matches_rule_of_thumb() {
        let sorted: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        // sd = 3.02765, IQR = 4.5 -> min(3.02765, 3.35821)
        let expected = 0.9 * 3.0276503540974917 * 10f64.powf(-0.2);
        assert!((silverman_bandwidth(&sorted) - expected).abs() < 1e-9);
    }

    #[test]
    fn bandwidth_falls_back_for_constant_data() {
        let h = silverman_bandwidth(&[5., 5., 5., 5.]);
        assert!((h - 0.9 * 5. * 4f64.powf(-0.2)).abs() < 1e-12);
    }

    #[test]
    fn mode_of_bimodal_sample_is_the_heavier_peak() {
        let mut values = vec![30.; 20];
        values.extend(vec![36.; 80]);
        values.extend((0..10).map(|i| 35.5 + i as f64 * 0.1));
        let kde = gaussian_kde(&values, DEFAULT_GRID).expect("density");
        assert!((kde.mode() - 36.).abs() < 0.3, "mode {}", kde.mode());
    }

    #[test]
    fn density_integrates_to_one() {
        let values: Vec<f64> = (0..50).map(|i| (i as f64 * 0.37).sin() * 3. + 30.).collect();
        let kde = gaussian_kde(&values, DEFAULT_GRID).expect("density");
        let step = kde.x[1] - kde.x[0];
        let area: f64 = kde.y.iter().sum::<f64>() * step;
        assert!((area - 1.).abs() < 0.01, "area {}", area);
    }

    #[test]
    fn ignores_missing_and_handles_empty() {
        assert!(gaussian_kde(&[f64::NAN, f64::NAN], DEFAULT_GRID).is_none());
        let kde = gaussian_kde(&[f64::NAN, 4.0], 64).expect("density");
        assert!((kde.mode() - 4.0).abs() < kde.x[1] - kde.x[0]);
    }

    #[test]
    fn empty_curve_has_no_mode() {
        let d = Density {
            x: vec![],
            y: vec![],
            bandwidth: 1.,
        };
        assert!(d.mode().is_nan());
        assert!(d.peak().0.is_nan());

        let ragged = Density {
            x: vec![0., 1.],
            y: vec![],
            bandwidth: 1.,
        };
        assert!(ragged.mode().is_nan());
        assert_eq!(ragged.value_at(0.5), 0.);
    }

    #[test]
    fn value_at_interpolates() {
        let d = Density {
            x: vec![0., 1., 2.],
            y: vec![0., 1., 0.],
            bandwidth: 1.,
        };
        assert_eq!(d.value_at(0.5), 0.5);
        assert_eq!(d.value_at(3.), 0.);
        assert_eq!(d.peak(), (1., 1.));
    }
}
