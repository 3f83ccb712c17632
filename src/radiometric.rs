//! Import of radiometric JPEGs into Celsius records.
//!
//! The FFF container embedded in the JPEG is decoded
//! directly. When that fails (unsupported camera, stripped
//! segments) and the caller allows it, metadata is instead
//! extracted with the `exiftool` command-line tool
//! (`exiftool -b -j`), whose JSON output carries the same
//! calibration parameters and a base64-encoded raw image.

use std::{fs::read, path::Path, process::Command};

use anyhow::{anyhow, bail, ensure, Context};
use image::ImageFormat;
use img_parts::jpeg::Jpeg;
use ndarray::Array2;
use serde_derive::*;

use crate::{
    error::{Error, Result},
    flir::{decode_png_counts, FffContainer},
    record::ThermalRecord,
    temperature::ThermalSettings,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FlirOptions {
    /// Object distance in metres; overrides the value
    /// stored in the image.
    pub distance: Option<f64>,
    /// Fall back to `exiftool` when the embedded data can't
    /// be decoded.
    pub exiftool: bool,
}

impl Default for FlirOptions {
    fn default() -> Self {
        FlirOptions {
            distance: None,
            exiftool: true,
        }
    }
}

/// Raw counts plus the parameters needed to convert them.
pub struct RadiometricImage {
    pub settings: ThermalSettings,
    pub counts: Array2<f64>,
}

impl RadiometricImage {
    pub fn from_jpeg_bytes(bytes: Vec<u8>) -> anyhow::Result<Self> {
        let jpeg = Jpeg::from_bytes(bytes.into())?;
        let fff = FffContainer::from_jpeg(&jpeg)?;
        let counts = fff
            .raw_counts()?
            .ok_or_else(|| anyhow!("no raw data record found"))?;
        let settings = fff
            .camera_params()?
            .map(|p| ThermalSettings::from(&p))
            .ok_or_else(|| anyhow!("no camera parameters found"))?;
        Ok(RadiometricImage { settings, counts })
    }

    pub fn from_exiftool_json(json: ExiftoolJson) -> anyhow::Result<Self> {
        let counts = json.raw_counts()?;
        Ok(RadiometricImage {
            settings: json.settings,
            counts,
        })
    }

    /// Run `exiftool -b -j` on `path` and parse its output.
    pub fn from_exiftool(path: &Path) -> anyhow::Result<Self> {
        let output = Command::new("exiftool")
            .arg("-b")
            .arg("-j")
            .arg(path)
            .output()
            .context("could not run exiftool")?;
        ensure!(
            output.status.success(),
            "exiftool failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        let mut values: Vec<ExiftoolJson> = serde_json::from_slice(&output.stdout)?;
        ensure!(values.len() == 1, "expected exiftool json array with one item");
        Self::from_exiftool_json(values.remove(0))
    }

    pub fn temperatures(&self, distance: Option<f64>) -> Array2<f64> {
        let to_celsius = self
            .settings
            .celsius_transform(distance.unwrap_or(self.settings.object_distance));
        self.counts.mapv(|raw| to_celsius(raw))
    }
}

/// One element of the array printed by `exiftool -b -j`.
#[derive(Deserialize, Debug)]
pub struct ExiftoolJson {
    #[serde(rename = "SourceFile", default)]
    pub source_file: Option<String>,

    #[serde(flatten)]
    pub settings: ThermalSettings,

    #[serde(rename = "RawThermalImageType")]
    raw_type: String,

    #[serde(
        rename = "RawThermalImage",
        deserialize_with = "serde_helpers::base64_bytes"
    )]
    raw_bytes: Vec<u8>,
}

impl ExiftoolJson {
    fn raw_counts(&self) -> anyhow::Result<Array2<f64>> {
        match self.raw_type.as_str() {
            "TIFF" => {
                let img = image::load_from_memory_with_format(&self.raw_bytes, ImageFormat::Tiff)?
                    .to_luma16();
                let (width, height) = img.dimensions();
                let counts = img.into_raw().into_iter().map(f64::from).collect();
                Ok(Array2::from_shape_vec(
                    (height as usize, width as usize),
                    counts,
                )?)
            }
            "PNG" => decode_png_counts(&self.raw_bytes),
            other => bail!("unsupported raw thermal image type: {}", other),
        }
    }
}

/// Read a radiometric JPEG at `path` into a record of
/// temperatures in degrees Celsius.
pub fn read_flir<P: AsRef<Path>>(path: P, opts: &FlirOptions) -> Result<ThermalRecord> {
    let path = path.as_ref();
    let bytes = read(path).map_err(|e| Error::from_io_at(e, path))?;

    let image = match RadiometricImage::from_jpeg_bytes(bytes) {
        Ok(image) => image,
        Err(e) if opts.exiftool => {
            tracing::debug!(path = %path.display(), error = %e, "embedded FFF unreadable, trying exiftool");
            RadiometricImage::from_exiftool(path)?
        }
        Err(e) => return Err(e.into()),
    };

    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ThermalRecord::from_matrix(image.temperatures(opts.distance), filename)?.with_source_path(path))
}

mod serde_helpers {
    use serde::*;

    pub fn base64_bytes<'de, D>(de: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let text = <String as Deserialize>::deserialize(de)?;
        let payload = text
            .strip_prefix("base64:")
            .ok_or_else(|| Error::custom("unexpected format: must begin with `base64:`"))?;
        base64::decode(payload).map_err(Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exiftool_json(raw_type: &str, payload: &[u8]) -> String {
        format!(
            r#"{{
                "SourceFile": "img.jpg",
                "Emissivity": 1.0, "ObjectDistance": "1.00 m",
                "RelativeHumidity": "50.0 %", "ReflectedApparentTemperature": "20.0 C",
                "AtmosphericTemperature": "20.0 C", "IRWindowTemperature": "20.0 C",
                "IRWindowTransmission": 1, "PlanckR1": 21106.77, "PlanckB": 1501,
                "PlanckF": 1, "PlanckO": -7340, "PlanckR2": 0.012545258,
                "AtmosphericTransAlpha1": 0.006569, "AtmosphericTransAlpha2": 0.01262,
                "AtmosphericTransBeta1": -0.002276, "AtmosphericTransBeta2": -0.00667,
                "AtmosphericTransX": 1.9,
                "RawThermalImageType": "{}",
                "RawThermalImage": "base64:{}"
            }}"#,
            raw_type,
            base64::encode(payload)
        )
    }

    #[test]
    fn rejects_unknown_raw_type() -> anyhow::Result<()> {
        let json: ExiftoolJson = serde_json::from_str(&exiftool_json("BMP", b"xx"))?;
        assert_eq!(json.source_file.as_deref(), Some("img.jpg"));
        assert!(RadiometricImage::from_exiftool_json(json).is_err());
        Ok(())
    }

    #[test]
    fn requires_base64_prefix() {
        let json = exiftool_json("TIFF", b"xx").replace("base64:", "");
        assert!(serde_json::from_str::<ExiftoolJson>(&json).is_err());
    }

    #[test]
    fn temperatures_follow_settings() -> anyhow::Result<()> {
        let json: ExiftoolJson = serde_json::from_str(&exiftool_json("TIFF", b""))?;
        let settings = json.settings;
        let ambient = {
            let f = settings.celsius_transform(1.0);
            // invert numerically: the raw count reading 20 C
            let mut lo = 0.;
            let mut hi = 65535.;
            for _ in 0..60 {
                let mid = (lo + hi) / 2.;
                if f(mid) < 20. {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            lo
        };
        let image = RadiometricImage {
            settings,
            counts: Array2::from_elem((2, 2), ambient),
        };
        let temps = image.temperatures(None);
        assert!(temps.iter().all(|t| (t - 20.).abs() < 1e-3));
        Ok(())
    }

    #[test]
    fn missing_file_is_reported() {
        let err = read_flir("/nonexistent/biotherm/x.jpg", &FlirOptions::default()).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
