//! Library to segment, summarize and compare thermal images
//! of animals.
//!
//! The typical pipeline reads a folder of sensor dumps (or
//! radiometric JPEGs), separates each subject from the
//! background, computes temperature statistics over the
//! subject, and flattens them into a table that can be
//! joined with clinical data and collapsed per subject.
//!
//! 1. Import: [`raw::read_raw`] decodes headerless `f32`
//! grids; [`radiometric::read_flir`] converts FLIR R-JPEGs to
//! Celsius using the camera's [calibration
//! parameters][temperature::ThermalSettings].
//! [`batch::read_batch`] does either for a whole directory.
//!
//! 2. Masking: [`segment::segment_roi`] (Otsu threshold,
//! morphological cleanup, largest component) or the simpler
//! [`segment::filter_threshold`]. Both rewrite the
//! record's processed matrix and drop its statistics.
//!
//! 3. Statistics: [`stats::compute_stats`] fills a record's
//! [`Metrics`], [`batch::compile_batch_stats`] turns a
//! collection into a [`Table`].
//!
//! 4. Tables: [`merge::merge_clinical`] and
//! [`aggregate::aggregate_replicates`].
//!
//! 5. Output: [`checkpoint`] persists records between runs,
//! and [`viz`] renders heatmaps, montages, spirals and
//! charts.
//!
//! ```rust
//! # fn run() -> biotherm::Result<()> {
//! use biotherm::{
//!     batch::{compile_batch_stats, compute_stats_batch, read_batch, segment_batch, BatchOptions},
//!     segment::SegmentOptions,
//!     stats::StatsOptions,
//! };
//!
//! let mut records = read_batch("frames/", &BatchOptions::default())?;
//! segment_batch(&mut records, &SegmentOptions::default());
//! compute_stats_batch(&mut records, &StatsOptions::default());
//! let table = compile_batch_stats(&records)?;
//! table.write_csv(std::io::stdout())?;
//! # Ok(())
//! # }
//! ```
//!
//! Recoverable problems (a file that fails to import, an
//! image with nothing left after masking) are reported as
//! [`tracing`] warnings and never abort a batch.

pub mod error;
pub mod record;

pub(crate) mod flir;
pub mod radiometric;
pub mod raw;
pub mod temperature;

pub mod density;
pub mod segment;
pub mod stats;

pub mod aggregate;
pub mod batch;
pub mod checkpoint;
pub mod merge;
pub mod table;

pub mod cli;
pub mod config;
pub mod viz;

pub use crate::error::{Error, Result};
pub use crate::record::{Metrics, RecordSet, Selector, ThermalRecord, MISSING};
pub use crate::table::{Cell, Table};
