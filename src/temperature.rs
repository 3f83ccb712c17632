//! Conversion of radiometric sensor counts to temperature
//! in degrees Celsius.
//!
//! Follows the radiometric model of the [Thermimage R
//! library]: the raw signal is corrected for reflected,
//! atmospheric and IR-window radiance before inverting the
//! Planck curve of the camera.
//!
//! [Thermimage R library]: //github.com/gtatters/Thermimage/blob/master/R/raw2temp.R

use serde_derive::*;

use crate::flir::FlirCameraParams;

/// Calibration and ambient parameters needed to compute
/// temperatures from raw sensor values.
///
/// Deserializes from the JSON emitted by `exiftool -j`,
/// where temperatures and distances carry unit suffixes
/// (`"22.0 C"`, `"1.00 m"`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ThermalSettings {
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub emissivity: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub object_distance: f64,

    #[serde(
        rename = "RelativeHumidity",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub relative_humidity_percentage: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub reflected_apparent_temperature: f64,
    #[serde(deserialize_with = "serde_helpers::float_with_suffix")]
    pub atmospheric_temperature: f64,

    #[serde(
        rename = "IRWindowTemperature",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub ir_window_temperature: f64,
    #[serde(
        rename = "IRWindowTransmission",
        deserialize_with = "serde_helpers::float_with_suffix"
    )]
    pub ir_window_transmission: f64,

    #[serde(rename = "PlanckR1")]
    pub planck_r1: f64,
    #[serde(rename = "PlanckB")]
    pub planck_b: f64,
    #[serde(rename = "PlanckF")]
    pub planck_f: f64,
    #[serde(rename = "PlanckO")]
    pub planck_o: f64,
    #[serde(rename = "PlanckR2")]
    pub planck_r2: f64,

    #[serde(rename = "AtmosphericTransAlpha1")]
    pub atmospheric_trans_alpha_1: f64,
    #[serde(rename = "AtmosphericTransAlpha2")]
    pub atmospheric_trans_alpha_2: f64,
    #[serde(rename = "AtmosphericTransBeta1")]
    pub atmospheric_trans_beta_1: f64,
    #[serde(rename = "AtmosphericTransBeta2")]
    pub atmospheric_trans_beta_2: f64,
    #[serde(rename = "AtmosphericTransX")]
    pub atmospheric_trans_x: f64,
}

const KELVIN_OFFSET: f64 = 273.15;

// water vapour pressure polynomial in air temperature
const H2O_SERIES: [f64; 4] = [1.5587, 0.06939, -0.00027816, 0.00000068455];

impl ThermalSettings {
    // raw = R1 / (R2 * (exp(B / T) - F)) - O
    fn planck_radiance(&self, celsius: f64) -> f64 {
        self.planck_r1
            / (self.planck_r2 * ((self.planck_b / (celsius + KELVIN_OFFSET)).exp() - self.planck_f))
            - self.planck_o
    }

    fn planck_inverse(&self, raw: f64) -> f64 {
        self.planck_b
            / (self.planck_r1 / (self.planck_r2 * (raw + self.planck_o)) + self.planck_f).ln()
            - KELVIN_OFFSET
    }

    /// Transmission of the air column between object and
    /// window. The window is assumed to sit halfway.
    fn atmospheric_tau(&self, distance: f64) -> f64 {
        let h2o = (self.relative_humidity_percentage / 100.)
            * polynomial(&H2O_SERIES, self.atmospheric_temperature).exp();
        let h2o_sqrt = h2o.sqrt();
        let d = (distance / 2.).sqrt();

        let t1 = (-d * (self.atmospheric_trans_alpha_1 + self.atmospheric_trans_beta_1 * h2o_sqrt))
            .exp();
        let t2 = (-d * (self.atmospheric_trans_alpha_2 + self.atmospheric_trans_beta_2 * h2o_sqrt))
            .exp();
        self.atmospheric_trans_x * t1 + (1. - self.atmospheric_trans_x) * t2
    }

    /// Affine correction `raw -> object radiance` for an
    /// object at `distance` metres.
    pub fn radiance_correction(&self, distance: f64) -> impl Fn(f64) -> f64 {
        let e = self.emissivity;
        let irt = self.ir_window_transmission;
        let tau = self.atmospheric_tau(distance);

        let reflected = self.planck_radiance(self.reflected_apparent_temperature);
        let atmosphere = self.planck_radiance(self.atmospheric_temperature);
        let window = self.planck_radiance(self.ir_window_temperature);

        let refl1_attn = (1. - e) / e * reflected;
        let atm1_attn = (1. - tau) / e / tau * atmosphere;
        let wind_attn = (1. - irt) / e / tau / irt * window;
        // anti-reflective window: no second reflection term
        let atm2_attn = (1. - tau) / e / tau / irt / tau * atmosphere;

        let offset = -(refl1_attn + atm1_attn + wind_attn + atm2_attn);
        let gain = 1. / e / tau / irt / tau;
        move |raw| offset + gain * raw
    }

    pub fn celsius_transform(&self, distance: f64) -> impl Fn(f64) -> f64 + '_ {
        let correct = self.radiance_correction(distance);
        move |raw| self.planck_inverse(correct(raw))
    }

    /// Temperature of a single raw count at the configured
    /// object distance.
    pub fn raw_to_celsius(&self, raw: f64) -> f64 {
        self.celsius_transform(self.object_distance)(raw)
    }
}

impl From<&FlirCameraParams> for ThermalSettings {
    fn from(p: &FlirCameraParams) -> Self {
        let t = &p.temperature_params;
        let k = |v: f32| v as f64 - KELVIN_OFFSET;
        // stored as a fraction by most firmware
        let rh = t.relative_humidity as f64;
        let rh = if rh > 2. { rh } else { rh * 100. };
        ThermalSettings {
            emissivity: t.emissivity as f64,
            object_distance: t.object_distance as f64,
            relative_humidity_percentage: rh,
            reflected_apparent_temperature: k(t.reflected_apparent_temperature),
            atmospheric_temperature: k(t.atmospheric_temperature),
            ir_window_temperature: k(t.ir_window_temperature),
            ir_window_transmission: t.ir_window_transmission as f64,
            planck_r1: t.planck_r1 as f64,
            planck_b: t.planck_b as f64,
            planck_f: t.planck_f as f64,
            planck_o: p.extra_params.planck_o as f64,
            planck_r2: p.extra_params.planck_r2 as f64,
            atmospheric_trans_alpha_1: t.atmospheric_trans_alpha_1 as f64,
            atmospheric_trans_alpha_2: t.atmospheric_trans_alpha_2 as f64,
            atmospheric_trans_beta_1: t.atmospheric_trans_beta_1 as f64,
            atmospheric_trans_beta_2: t.atmospheric_trans_beta_2 as f64,
            atmospheric_trans_x: t.atmospheric_trans_x as f64,
        }
    }
}

#[inline]
fn polynomial(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0., |acc, c| acc * x + c)
}

mod serde_helpers {
    use lazy_static::lazy_static;
    use regex::Regex;
    use serde::*;
    use serde_derive::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    /// Accept `0.95` as well as `"22.0 C"` or `"50.0 %"`.
    pub fn float_with_suffix<'de, D>(de: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^\s*-?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?").unwrap();
        }

        use serde::de::Error;
        match NumberOrText::deserialize(de)? {
            NumberOrText::Number(v) => Ok(v),
            NumberOrText::Text(s) => RE
                .find(&s)
                .ok_or_else(|| Error::custom(format!("expected a leading number, got `{}`", s)))?
                .as_str()
                .trim()
                .parse()
                .map_err(Error::custom),
        }
    }
}
