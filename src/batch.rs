//! Directory scans and operations applied over a whole
//! [`RecordSet`].
//!
//! Per-record work runs on rayon's thread pool. A record
//! that fails is logged and left out; the batch itself only
//! fails when its inputs are unusable.

use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use rayon::prelude::*;
use regex::Regex;
use serde_derive::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    error::{Error, Result},
    radiometric::{read_flir, FlirOptions},
    raw::{read_raw, RawOptions},
    record::{RecordSet, Selector, ThermalRecord},
    segment::{filter_threshold, segment_roi, SegmentOptions},
    stats::{compute_stats, StatsOptions},
    table::{Cell, Table},
};

/// File name pattern used when none is configured.
pub const DEFAULT_PATTERN: &str = r"(?i)\.raw$";

/// Name of the identifier column in compiled tables.
pub const ID_COLUMN: &str = "id";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImportFormat {
    Raw(RawOptions),
    Flir(FlirOptions),
}

impl Default for ImportFormat {
    fn default() -> Self {
        ImportFormat::Raw(RawOptions::default())
    }
}

impl ImportFormat {
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<ThermalRecord> {
        match self {
            ImportFormat::Raw(opts) => read_raw(path, opts),
            ImportFormat::Flir(opts) => read_flir(path, opts),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BatchOptions {
    /// Regex matched against file names.
    pub pattern: String,
    pub recursive: bool,
    pub format: ImportFormat,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            pattern: DEFAULT_PATTERN.to_string(),
            recursive: false,
            format: ImportFormat::default(),
        }
    }
}

/// List the files under `dir` whose name matches `pattern`,
/// sorted by path.
pub fn scan_dir<P: AsRef<Path>>(dir: P, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::DirectoryNotFound(dir.to_path_buf()));
    }
    let re = Regex::new(pattern)?;

    let mut walker = WalkDir::new(dir).min_depth(1).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }
    let mut paths: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| re.is_match(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect();
    paths.sort();
    debug!(dir = %dir.display(), found = paths.len(), "scanned directory");
    Ok(paths)
}

/// Import `paths` in parallel. Records are keyed by file
/// name in the order of `paths`; failures are skipped.
pub fn import_paths(
    paths: &[PathBuf],
    format: &ImportFormat,
    progress: Option<&ProgressBar>,
) -> RecordSet {
    let results: Vec<(String, Result<ThermalRecord>)> = paths
        .par_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let res = format.read(path);
            if let Some(bar) = progress {
                bar.inc(1);
            }
            (name, res)
        })
        .collect();

    let mut set = RecordSet::new();
    for (name, res) in results {
        match res {
            Ok(record) => {
                if set.get(&name).is_some() {
                    warn!(file = %name, "duplicate file name; later file replaces earlier one");
                }
                set.insert(name, record);
            }
            Err(err) => warn!(file = %name, "skipping file: {}", err),
        }
    }
    set
}

/// Scan `dir` and import every matching file.
pub fn read_batch<P: AsRef<Path>>(dir: P, opts: &BatchOptions) -> Result<RecordSet> {
    let paths = scan_dir(dir, &opts.pattern, opts.recursive)?;
    let set = import_paths(&paths, &opts.format, None);
    info!(found = paths.len(), imported = set.len(), "batch import done");
    Ok(set)
}

/// Segment every record. Returns the number of records
/// segmented; the others keep their previous content.
pub fn segment_batch(set: &mut RecordSet, opts: &SegmentOptions) -> usize {
    set.entries_mut()
        .par_iter_mut()
        .map(|(name, record)| match segment_roi(record, opts) {
            Ok(_) => 1,
            Err(err) => {
                warn!(record = %name, "segmentation failed: {}", err);
                0
            }
        })
        .sum()
}

/// Apply [`filter_threshold`] to every record. Returns the
/// number of records filtered.
pub fn filter_batch(set: &mut RecordSet, min: f64, max: f64, selector: Selector) -> Result<usize> {
    if min.is_nan() || max.is_nan() || min > max {
        return Err(Error::invalid(format!(
            "threshold range [{}, {}] is empty or undefined",
            min, max
        )));
    }
    Ok(set
        .entries_mut()
        .par_iter_mut()
        .map(|(name, record)| match filter_threshold(record, min, max, selector) {
            Ok(_) => 1,
            Err(err) => {
                warn!(record = %name, "threshold filter failed: {}", err);
                0
            }
        })
        .sum())
}

pub fn compute_stats_batch(set: &mut RecordSet, opts: &StatsOptions) {
    set.entries_mut().par_iter_mut().for_each(|(_, record)| {
        compute_stats(record, opts);
    });
}

/// Flatten the statistics of every record into a table with
/// one row per record.
///
/// Metric columns are the union of all metric names: the
/// first record's order, then unseen names as they appear.
/// Cells for metrics a record lacks are missing.
pub fn compile_batch_stats(set: &RecordSet) -> Result<Table> {
    let mut with_stats = vec![];
    for (name, record) in set.iter() {
        match record.statistics() {
            Some(stats) => {
                let id = if record.filename().is_empty() {
                    name
                } else {
                    record.filename()
                };
                with_stats.push((id, stats));
            }
            None => warn!(record = %name, "no statistics computed; left out of table"),
        }
    }
    if with_stats.is_empty() {
        return Err(Error::EmptyInput(
            "no record in the collection has statistics".into(),
        ));
    }

    let mut metrics: Vec<&str> = vec![];
    for (_, stats) in &with_stats {
        for name in stats.names() {
            if !metrics.contains(&name) {
                metrics.push(name);
            }
        }
    }

    let mut table = Table::new(std::iter::once(ID_COLUMN).chain(metrics.iter().copied()));
    for (id, stats) in with_stats {
        let mut row = Vec::with_capacity(metrics.len() + 1);
        row.push(Cell::from(id));
        row.extend(
            metrics
                .iter()
                .map(|m| stats.get(m).map_or(Cell::Missing, Cell::number)),
        );
        table.push_row(row)?;
    }
    Ok(table)
}
