//! Raw sensor dumps: a headerless grid of little-endian
//! `f32` temperatures, row-major, `width * height` values.
//!
//! Sensors write the grid sideways, so by default it is
//! rotated 90 degrees counter-clockwise after reading.

use std::{
    fs::{read, File},
    io::{BufWriter, Cursor, Write},
    path::Path,
};

use byteordered::ByteOrdered;
use ndarray::{Array2, ArrayView2};
use serde_derive::*;

use crate::{
    error::{Error, Result},
    record::ThermalRecord,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RawOptions {
    pub width: usize,
    pub height: usize,
    pub rotate: bool,
}

impl Default for RawOptions {
    fn default() -> Self {
        RawOptions {
            width: 160,
            height: 120,
            rotate: true,
        }
    }
}

impl RawOptions {
    fn expected_len(&self) -> usize {
        4 * self.width * self.height
    }
}

/// Read a raw sensor dump from `path` into a record named
/// after the file.
pub fn read_raw<P: AsRef<Path>>(path: P, opts: &RawOptions) -> Result<ThermalRecord> {
    let path = path.as_ref();
    let bytes = read(path).map_err(|e| Error::from_io_at(e, path))?;
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(read_raw_bytes(&bytes, opts, filename)?.with_source_path(path))
}

pub fn read_raw_bytes<S: Into<String>>(
    bytes: &[u8],
    opts: &RawOptions,
    filename: S,
) -> Result<ThermalRecord> {
    let grid = decode_grid(bytes, opts)?;
    let grid = if opts.rotate { rotate_ccw(grid.view()) } else { grid };
    ThermalRecord::from_matrix(grid, filename)
}

fn decode_grid(bytes: &[u8], opts: &RawOptions) -> Result<Array2<f64>> {
    if opts.width == 0 || opts.height == 0 {
        return Err(Error::invalid("raw grid dimensions must be positive"));
    }
    if bytes.len() != opts.expected_len() {
        return Err(Error::invalid(format!(
            "raw sensor file is {} bytes, expected {} for {}x{} f32 values",
            bytes.len(),
            opts.expected_len(),
            opts.width,
            opts.height
        )));
    }

    let mut rdr = ByteOrdered::le(Cursor::new(bytes));
    let mut values = Vec::with_capacity(opts.width * opts.height);
    for _ in 0..opts.width * opts.height {
        values.push(rdr.read_f32()? as f64);
    }
    Array2::from_shape_vec((opts.height, opts.width), values)
        .map_err(|e| Error::invalid(e.to_string()))
}

/// Rotate a matrix 90 degrees counter-clockwise: the last
/// column becomes the first row.
pub fn rotate_ccw(m: ArrayView2<'_, f64>) -> Array2<f64> {
    let (rows, cols) = m.dim();
    Array2::from_shape_fn((cols, rows), |(i, j)| m[(j, cols - 1 - i)])
}

/// Encode a matrix as a raw sensor dump (row-major, LE f32).
pub fn encode_raw(m: ArrayView2<'_, f64>) -> Result<Vec<u8>> {
    let mut out = ByteOrdered::le(Vec::with_capacity(4 * m.len()));
    for v in m.iter() {
        out.write_f32(*v as f32)?;
    }
    Ok(out.into_inner())
}

pub fn write_raw<P: AsRef<Path>>(path: P, m: ArrayView2<'_, f64>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    writer.write_all(&encode_raw(m)?)?;
    writer.flush()?;
    Ok(())
}
