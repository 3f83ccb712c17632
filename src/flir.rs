//! Reader for the FFF container FLIR cameras embed in the
//! APP1 segments of their radiometric JPEGs.
//!
//! Only the two records needed to compute temperatures are
//! decoded: the raw sensor image (16-bit, either stored
//! directly or as a PNG) and the camera calibration block.
//! Offsets follow the FLIR tag tables of [ExifTool].
//!
//! [ExifTool]: //exiftool.org
use std::io::{Cursor, Read};

use anyhow::{anyhow, ensure, Context, Result};
use bincode::{DefaultOptions, Options};
use img_parts::jpeg::{markers, Jpeg};
use ndarray::Array2;
use serde::Deserialize;
use serde_derive::*;

const RECORD_RAW_DATA: u16 = 0x01;
const RECORD_CAMERA_INFO: u16 = 0x20;
const RAW_SUBTYPE_PNG: u16 = 3;

/// The reassembled FFF blob and its record directory.
#[derive(Debug)]
pub struct FffContainer {
    data: Vec<u8>,
    records: Vec<RecordEntry>,
}

impl FffContainer {
    pub fn from_jpeg(image: &Jpeg) -> Result<Self> {
        let data = reassemble_app1_chunks(image)?;
        let records = read_directory(&data)?;
        Ok(FffContainer { data, records })
    }

    /// Raw sensor counts, or `None` if the container has no
    /// raw data record.
    pub fn raw_counts(&self) -> Result<Option<Array2<f64>>> {
        match self.records.iter().find(|r| r.ty == RECORD_RAW_DATA) {
            Some(r) => r.decode_raw(&self.data).map(Some),
            None => Ok(None),
        }
    }

    pub fn camera_params(&self) -> Result<Option<FlirCameraParams>> {
        match self.records.iter().find(|r| r.ty == RECORD_CAMERA_INFO) {
            Some(r) => r.decode_camera(&self.data).map(Some),
            None => Ok(None),
        }
    }
}

/// FLIR data is split over several APP1 segments, each
/// starting with `"FLIR\0"`, a reserved byte, its own index
/// and the index of the last segment.
fn reassemble_app1_chunks(image: &Jpeg) -> Result<Vec<u8>> {
    let mut chunks: Vec<Option<Vec<u8>>> = vec![];

    for segment in image.segments_by_marker(markers::APP1) {
        let contents = segment.contents();
        if contents.len() < 8 || &contents[0..5] != b"FLIR\0" {
            continue;
        }
        let idx = contents[6] as usize;
        let total = contents[7] as usize + 1;

        if chunks.is_empty() {
            chunks.resize(total, None);
        }
        ensure!(
            chunks.len() == total,
            "inconsistent FLIR segment count: {} != {}",
            chunks.len(),
            total
        );
        let slot = chunks
            .get_mut(idx)
            .ok_or_else(|| anyhow!("FLIR segment index {} out of bounds", idx))?;
        ensure!(slot.is_none(), "duplicate FLIR segment {}", idx);
        *slot = Some(contents[8..].to_vec());
    }

    ensure!(!chunks.is_empty(), "no FLIR segments in image");
    let mut data = vec![];
    for (idx, chunk) in chunks.into_iter().enumerate() {
        let chunk = chunk.ok_or_else(|| anyhow!("FLIR segment {} missing", idx))?;
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

// 0x00 "FFF\0", 0x04 creator[16], 0x14 version, 0x18 dir offset,
// 0x1c dir entries. Version 100..200 means little endian.
fn read_directory(data: &[u8]) -> Result<Vec<RecordEntry>> {
    #[derive(Debug, Deserialize)]
    struct Preamble {
        magic: [u8; 4],
        _creator: [u8; 16],
        version: u32,
    }
    #[derive(Debug, Deserialize)]
    struct DirInfo {
        offset: u32,
        entries: u32,
    }

    let pre: Preamble = decode(true, data)?;
    ensure!(&pre.magic == b"FFF\0", "missing FFF signature");
    let le = (100..200).contains(&pre.version);

    let info: DirInfo = decode(le, data.get(0x18..).unwrap_or_default())?;
    let mut dir = data
        .get(info.offset as usize..)
        .ok_or_else(|| anyhow!("FFF directory offset past end of data"))?;
    (0..info.entries)
        .map(|i| decode(le, &mut dir).with_context(|| format!("FFF directory entry {}", i)))
        .collect()
}

// 0x00 type, 0x02 subtype, 0x04 version, 0x08 id, 0x0c offset,
// 0x10 length, 0x14 parent, 0x18 object number, 0x1c checksum
#[derive(Debug, Deserialize)]
struct RecordEntry {
    ty: u16,
    sub_type: u16,
    _version: u32,
    _id: u32,
    offset: u32,
    length: u32,
    _parent: u32,
    _obj_num: u32,
    _checksum: u32,
}

impl RecordEntry {
    fn body<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.offset as usize;
        data.get(start..start + self.length as usize)
            .ok_or_else(|| anyhow!("FFF record runs past end of data"))
    }

    // the first u16 of a record is 2 when it is little endian
    fn body_is_le(body: &[u8]) -> Result<bool> {
        Ok(decode::<u16, _>(true, body)? == 2)
    }

    fn decode_raw(&self, data: &[u8]) -> Result<Array2<f64>> {
        let body = self.body(data)?;
        ensure!(body.len() > 0x20, "raw data record too short: {} bytes", body.len());

        if self.sub_type == RAW_SUBTYPE_PNG {
            return decode_png_counts(&body[0x20..]);
        }

        let le = Self::body_is_le(body)?;
        let (width, height): (u16, u16) = decode(le, &body[2..])?;
        let (width, height) = (width as usize, height as usize);
        let expected = 0x20 + 2 * width * height;
        ensure!(
            body.len() >= expected,
            "raw data record is {} bytes, expected {}",
            body.len(),
            expected
        );

        let mut pixels = &body[0x20..expected];
        let mut counts = Vec::with_capacity(width * height);
        for _ in 0..width * height {
            counts.push(decode::<u16, _>(le, &mut pixels)? as f64);
        }
        Ok(Array2::from_shape_vec((height, width), counts)?)
    }

    fn decode_camera(&self, data: &[u8]) -> Result<FlirCameraParams> {
        let body = self.body(data)?;
        ensure!(
            body.len() >= 0x384,
            "camera info record is {} bytes, expected at least {}",
            body.len(),
            0x384
        );
        let le = Self::body_is_le(body)?;
        Ok(FlirCameraParams {
            temperature_params: decode(le, &body[0x20..])?,
            extra_params: decode(le, &body[0x308..])?,
        })
    }
}

/// Some cameras store the raw image as a 16-bit PNG whose
/// samples are byte-swapped.
pub(crate) fn decode_png_counts(bytes: &[u8]) -> Result<Array2<f64>> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let (info, mut reader) = decoder.read_info()?;
    ensure!(
        info.bit_depth == png::BitDepth::Sixteen && info.color_type == png::ColorType::Grayscale,
        "unsupported raw PNG layout: {:?} {:?}",
        info.color_type,
        info.bit_depth
    );
    let mut buf = vec![0; info.buffer_size()];
    reader.next_frame(&mut buf)?;

    let (width, height) = (info.width as usize, info.height as usize);
    let counts = buf
        .chunks_exact(2)
        .take(width * height)
        .map(|b| u16::from_le_bytes([b[0], b[1]]) as f64)
        .collect();
    Ok(Array2::from_shape_vec((height, width), counts)?)
}

#[derive(Debug, Deserialize)]
pub struct FlirCameraParams {
    pub(crate) temperature_params: FlirTemperatureParams,
    pub(crate) extra_params: FlirExtraParams,
}

/// Calibration block at offset 0x20 of the camera record.
/// Temperatures are in Kelvin.
#[derive(Debug, Deserialize)]
pub struct FlirTemperatureParams {
    pub(crate) emissivity: f32,
    pub(crate) object_distance: f32,
    pub(crate) reflected_apparent_temperature: f32,
    pub(crate) atmospheric_temperature: f32,
    pub(crate) ir_window_temperature: f32,
    pub(crate) ir_window_transmission: f32,
    _reserved_0: u32,
    pub(crate) relative_humidity: f32,
    _reserved_1: [u32; 6],
    pub(crate) planck_r1: f32,
    pub(crate) planck_b: f32,
    pub(crate) planck_f: f32,
    _reserved_2: [u32; 3],
    pub(crate) atmospheric_trans_alpha_1: f32,
    pub(crate) atmospheric_trans_alpha_2: f32,
    pub(crate) atmospheric_trans_beta_1: f32,
    pub(crate) atmospheric_trans_beta_2: f32,
    pub(crate) atmospheric_trans_x: f32,
}

/// Tail of the camera record at offset 0x308.
#[derive(Debug, Deserialize)]
pub struct FlirExtraParams {
    pub(crate) planck_o: i32,
    pub(crate) planck_r2: f32,
}

fn decode<T, R>(little_endian: bool, read: R) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let opts = DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes();
    let value = if little_endian {
        opts.with_little_endian().deserialize_from(read)
    } else {
        opts.with_big_endian().deserialize_from(read)
    };
    value.map_err(|e| anyhow!("truncated FFF field: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_entry(ty: u16, sub_type: u16, offset: u32, length: u32) -> Vec<u8> {
        let mut v = vec![];
        v.extend_from_slice(&ty.to_le_bytes());
        v.extend_from_slice(&sub_type.to_le_bytes());
        for field in &[100u32, 1, offset, length, 0, 0, 0] {
            v.extend_from_slice(&field.to_le_bytes());
        }
        v
    }

    // builds an FFF blob with a single 3x2 raw record
    fn fff_with_raw() -> Vec<u8> {
        let mut data = vec![0u8; 0x40];
        data[0..4].copy_from_slice(b"FFF\0");
        data[0x14..0x18].copy_from_slice(&100u32.to_le_bytes());
        data[0x18..0x1c].copy_from_slice(&0x40u32.to_le_bytes());
        data[0x1c..0x20].copy_from_slice(&1u32.to_le_bytes());

        let raw_offset = 0x40 + 32;
        let mut raw = vec![0u8; 0x20];
        raw[0..2].copy_from_slice(&2u16.to_le_bytes());
        raw[2..4].copy_from_slice(&3u16.to_le_bytes());
        raw[4..6].copy_from_slice(&2u16.to_le_bytes());
        for v in &[10u16, 20, 30, 40, 50, 60] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        data.extend(record_entry(1, 2, raw_offset, raw.len() as u32));
        data.extend(raw);
        data
    }

    #[test]
    fn reads_raw_record() -> Result<()> {
        let data = fff_with_raw();
        let records = read_directory(&data)?;
        let container = FffContainer { data, records };
        let counts = container.raw_counts()?.ok_or_else(|| anyhow!("no raw"))?;
        assert_eq!(counts.dim(), (2, 3));
        assert_eq!(counts[(1, 2)], 60.);
        assert!(container.camera_params()?.is_none());
        Ok(())
    }

    #[test]
    fn rejects_bad_signature() {
        let mut data = fff_with_raw();
        data[0] = b'X';
        assert!(read_directory(&data).is_err());
    }
}
