//! The thermal image record and named collections of
//! records.
//!
//! A [`ThermalRecord`] owns two matrices of equal shape:
//! the `raw` temperatures as imported, and the `processed`
//! matrix that masking operations rewrite. Masked pixels
//! hold [`MISSING`] (a NaN). Any change to `processed`
//! drops previously computed [`Metrics`], so statistics
//! attached to a record always describe its current
//! content.

use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use serde_derive::*;

use crate::error::{Error, Result};

/// Marker stored in masked (background) pixels.
pub const MISSING: f64 = f64::NAN;

/// Which matrix of a record an operation reads from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    Raw,
    Processed,
}

impl Default for Selector {
    fn default() -> Self {
        Selector::Processed
    }
}

impl std::str::FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Selector::Raw),
            "processed" => Ok(Selector::Processed),
            _ => Err(Error::invalid(format!("unknown matrix selector `{}`", s))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordMeta {
    pub filename: String,
    pub source_path: Option<PathBuf>,
    pub rows: usize,
    pub cols: usize,
}

/// Named metric values in a fixed order. NaN stands for a
/// metric that could not be computed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Metrics(Vec<(String, f64)>);

impl Metrics {
    pub fn new() -> Self {
        Metrics(vec![])
    }

    /// Set `name` to `value`, keeping the position of an
    /// existing entry.
    pub fn insert<S: Into<String>>(&mut self, name: S, value: f64) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ThermalRecord {
    raw: Array2<f64>,
    processed: Array2<f64>,
    meta: RecordMeta,
    statistics: Option<Metrics>,
}

impl ThermalRecord {
    /// Wrap an in-memory temperature matrix. `processed`
    /// starts out as a copy of `raw`.
    pub fn from_matrix<S: Into<String>>(raw: Array2<f64>, filename: S) -> Result<Self> {
        let (rows, cols) = raw.dim();
        if rows == 0 || cols == 0 {
            return Err(Error::invalid(format!(
                "temperature matrix must be non-empty, got {}x{}",
                rows, cols
            )));
        }
        Ok(ThermalRecord {
            processed: raw.clone(),
            raw,
            meta: RecordMeta {
                filename: filename.into(),
                source_path: None,
                rows,
                cols,
            },
            statistics: None,
        })
    }

    pub fn with_source_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.meta.source_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn raw(&self) -> ArrayView2<'_, f64> {
        self.raw.view()
    }

    pub fn processed(&self) -> ArrayView2<'_, f64> {
        self.processed.view()
    }

    pub fn selected(&self, selector: Selector) -> ArrayView2<'_, f64> {
        match selector {
            Selector::Raw => self.raw.view(),
            Selector::Processed => self.processed.view(),
        }
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn filename(&self) -> &str {
        &self.meta.filename
    }

    pub fn dim(&self) -> (usize, usize) {
        self.raw.dim()
    }

    pub fn statistics(&self) -> Option<&Metrics> {
        self.statistics.as_ref()
    }

    /// Replace the processed matrix. Clears statistics.
    pub fn set_processed(&mut self, processed: Array2<f64>) -> Result<()> {
        if processed.dim() != self.raw.dim() {
            return Err(Error::invalid(format!(
                "processed matrix is {:?}, record is {:?}",
                processed.dim(),
                self.raw.dim()
            )));
        }
        self.processed = processed;
        self.statistics = None;
        Ok(())
    }

    /// Undo all masking.
    pub fn reset_processed(&mut self) {
        self.processed = self.raw.clone();
        self.statistics = None;
    }

    /// Attach statistics, replacing whatever was there.
    pub fn set_statistics(&mut self, metrics: Metrics) -> &Metrics {
        self.statistics.insert(metrics)
    }

    pub fn clear_statistics(&mut self) {
        self.statistics = None;
    }

    /// Number of non-missing pixels in the selected matrix.
    pub fn valid_pixels(&self, selector: Selector) -> usize {
        self.selected(selector).iter().filter(|v| v.is_finite()).count()
    }

    /// Check the structural invariants of a record, e.g.
    /// after restoring one from disk.
    pub fn validate(&self) -> Result<()> {
        if self.raw.dim() != self.processed.dim() {
            return Err(Error::invalid(format!(
                "raw is {:?} but processed is {:?}",
                self.raw.dim(),
                self.processed.dim()
            )));
        }
        if self.raw.dim() != (self.meta.rows, self.meta.cols) {
            return Err(Error::invalid(format!(
                "metadata says {}x{} but matrix is {:?}",
                self.meta.rows,
                self.meta.cols,
                self.raw.dim()
            )));
        }
        Ok(())
    }
}

/// Turn a matrix produced outside this crate (already
/// masked, NaN for background) into a record whose raw and
/// processed content are both that matrix.
pub fn into_processed_record<S: Into<String>>(
    matrix: Array2<f64>,
    filename: S,
) -> Result<ThermalRecord> {
    if matrix.iter().all(|v| !v.is_finite()) {
        tracing::warn!("converted matrix contains no valid pixels");
    }
    ThermalRecord::from_matrix(matrix, filename)
}

/// An ordered collection of records keyed by name
/// (typically the file name).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RecordSet {
    entries: Vec<(String, ThermalRecord)>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` under `name`. An existing entry with
    /// the same name is replaced in place.
    pub fn insert<S: Into<String>>(&mut self, name: S, record: ThermalRecord) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = record,
            None => self.entries.push((name, record)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ThermalRecord> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ThermalRecord> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ThermalRecord)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<(String, ThermalRecord)> {
        &mut self.entries
    }

    pub fn into_entries(self) -> Vec<(String, ThermalRecord)> {
        self.entries
    }
}

impl std::iter::FromIterator<(String, ThermalRecord)> for RecordSet {
    fn from_iter<I: IntoIterator<Item = (String, ThermalRecord)>>(iter: I) -> Self {
        let mut set = RecordSet::new();
        for (name, record) in iter {
            set.insert(name, record);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn processed_starts_as_raw() -> Result<()> {
        let rec = ThermalRecord::from_matrix(array![[1., 2.], [3., 4.]], "a.raw")?;
        assert_eq!(rec.raw(), rec.processed());
        assert_eq!(rec.meta().rows, 2);
        assert!(rec.statistics().is_none());
        Ok(())
    }

    #[test]
    fn empty_matrix_rejected() {
        let err = ThermalRecord::from_matrix(Array2::<f64>::zeros((0, 3)), "x").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn set_processed_clears_statistics() -> Result<()> {
        let mut rec = ThermalRecord::from_matrix(array![[1., 2.], [3., 4.]], "a")?;
        let mut m = Metrics::new();
        m.insert("mean", 2.5);
        rec.set_statistics(m);
        rec.set_processed(array![[1., MISSING], [3., 4.]])?;
        assert!(rec.statistics().is_none());
        assert_eq!(rec.valid_pixels(Selector::Processed), 3);
        assert_eq!(rec.valid_pixels(Selector::Raw), 4);
        Ok(())
    }

    #[test]
    fn set_processed_checks_shape() -> Result<()> {
        let mut rec = ThermalRecord::from_matrix(array![[1., 2.], [3., 4.]], "a")?;
        assert!(rec.set_processed(Array2::zeros((3, 2))).is_err());
        Ok(())
    }

    #[test]
    fn metrics_insert_keeps_order() {
        let mut m = Metrics::new();
        m.insert("min", 1.);
        m.insert("max", 2.);
        m.insert("min", 0.5);
        assert_eq!(m.names().collect::<Vec<_>>(), vec!["min", "max"]);
        assert_eq!(m.get("min"), Some(0.5));
        assert_eq!(m.get("sd"), None);
    }

    #[test]
    fn record_set_replaces_by_name() -> Result<()> {
        let mut set = RecordSet::new();
        set.insert("a", ThermalRecord::from_matrix(array![[1.]], "a")?);
        set.insert("b", ThermalRecord::from_matrix(array![[2.]], "b")?);
        set.insert("a", ThermalRecord::from_matrix(array![[3.]], "a")?);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(set.get("a").map(|r| r.raw()[(0, 0)]), Some(3.));
        Ok(())
    }
}
