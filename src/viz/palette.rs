//! Colour scales.
//!
//! [`Colormap`]s map a value in `[0, 1]` to a colour for
//! heatmaps. [`Palette`]s are qualitative colour sets for
//! groups; asking for more colours than a palette holds
//! interpolates between its entries.

use std::str::FromStr;

use image::{Rgb, Rgba};
use serde_derive::*;

use crate::error::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    Inferno,
    Jet,
    Gray,
}

impl Default for Colormap {
    fn default() -> Self {
        Colormap::Inferno
    }
}

const INFERNO: [[u8; 3]; 9] = [
    [0, 0, 4],
    [31, 12, 72],
    [85, 15, 109],
    [136, 34, 106],
    [186, 54, 85],
    [227, 89, 51],
    [249, 142, 9],
    [248, 201, 50],
    [252, 255, 164],
];

const JET: [[u8; 3]; 6] = [
    [0, 0, 128],
    [0, 0, 255],
    [0, 255, 255],
    [255, 255, 0],
    [255, 0, 0],
    [128, 0, 0],
];
const JET_STOPS: [f64; 6] = [0., 0.125, 0.375, 0.625, 0.875, 1.];

const GRAY: [[u8; 3]; 2] = [[0, 0, 0], [255, 255, 255]];

fn lerp(a: [u8; 3], b: [u8; 3], t: f64) -> Rgb<u8> {
    let mix = |i: usize| (a[i] as f64 + (b[i] as f64 - a[i] as f64) * t).round() as u8;
    Rgb([mix(0), mix(1), mix(2)])
}

/// Sample evenly spaced colour stops at `t`.
fn sample(stops: &[[u8; 3]], t: f64) -> Rgb<u8> {
    if stops.len() == 1 {
        return Rgb(stops[0]);
    }
    let pos = t * (stops.len() - 1) as f64;
    let i = (pos.floor() as usize).min(stops.len() - 2);
    lerp(stops[i], stops[i + 1], pos - i as f64)
}

impl Colormap {
    /// Colour of `t`, clamped to `[0, 1]`.
    pub fn color(self, t: f64) -> Rgb<u8> {
        let t = if t.is_nan() { 0. } else { t.max(0.).min(1.) };
        match self {
            Colormap::Inferno => sample(&INFERNO, t),
            Colormap::Gray => sample(&GRAY, t),
            Colormap::Jet => {
                let i = JET_STOPS[1..]
                    .iter()
                    .position(|s| t <= *s)
                    .unwrap_or(JET_STOPS.len() - 2);
                let span = JET_STOPS[i + 1] - JET_STOPS[i];
                lerp(JET[i], JET[i + 1], (t - JET_STOPS[i]) / span)
            }
        }
    }

    pub fn rgba(self, t: f64) -> Rgba<u8> {
        let Rgb([r, g, b]) = self.color(t);
        Rgba([r, g, b, 255])
    }
}

impl FromStr for Colormap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "inferno" => Ok(Colormap::Inferno),
            "jet" => Ok(Colormap::Jet),
            "gray" | "grey" => Ok(Colormap::Gray),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    /// Nature Publishing Group.
    Npg,
    /// Journal of Clinical Oncology.
    Jco,
}

impl Default for Palette {
    fn default() -> Self {
        Palette::Npg
    }
}

const NPG: [[u8; 3]; 10] = [
    [0xE6, 0x4B, 0x35],
    [0x4D, 0xBB, 0xD5],
    [0x00, 0xA0, 0x87],
    [0x3C, 0x54, 0x88],
    [0xF3, 0x9B, 0x7F],
    [0x84, 0x91, 0xB4],
    [0x91, 0xD1, 0xC2],
    [0xDC, 0x00, 0x00],
    [0x7E, 0x61, 0x48],
    [0xB0, 0x9C, 0x85],
];

const JCO: [[u8; 3]; 10] = [
    [0x00, 0x73, 0xC2],
    [0xEF, 0xC0, 0x00],
    [0x86, 0x86, 0x86],
    [0xCD, 0x53, 0x4C],
    [0x7A, 0xA6, 0xDC],
    [0x00, 0x3C, 0x67],
    [0x8F, 0x77, 0x00],
    [0x3B, 0x3B, 0x3B],
    [0xA7, 0x30, 0x30],
    [0x4A, 0x69, 0x90],
];

impl Palette {
    pub fn base(self) -> &'static [[u8; 3]] {
        match self {
            Palette::Npg => &NPG,
            Palette::Jco => &JCO,
        }
    }

    /// `n` colours: the palette's own entries while they
    /// last, an interpolated ramp across them beyond that.
    pub fn colors(self, n: usize) -> Vec<Rgb<u8>> {
        let base = self.base();
        if n <= base.len() {
            return base[..n].iter().map(|c| Rgb(*c)).collect();
        }
        (0..n)
            .map(|i| sample(base, i as f64 / (n - 1) as f64))
            .collect()
    }
}

impl FromStr for Palette {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "npg" => Ok(Palette::Npg),
            "jco" => Ok(Palette::Jco),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colormaps_hit_their_ends() {
        assert_eq!(Colormap::Gray.color(0.), Rgb([0, 0, 0]));
        assert_eq!(Colormap::Gray.color(1.), Rgb([255, 255, 255]));
        assert_eq!(Colormap::Gray.color(0.5), Rgb([128, 128, 128]));
        assert_eq!(Colormap::Inferno.color(-1.), Rgb([0, 0, 4]));
        assert_eq!(Colormap::Inferno.color(2.), Rgb([252, 255, 164]));
        assert_eq!(Colormap::Jet.color(0.), Rgb([0, 0, 128]));
        assert_eq!(Colormap::Jet.color(0.5), Rgb([128, 255, 128]));
        assert_eq!(Colormap::Jet.color(1.), Rgb([128, 0, 0]));
    }

    #[test]
    fn palettes_interpolate_past_their_size() {
        let few = Palette::Npg.colors(3);
        assert_eq!(few, vec![Rgb([0xE6, 0x4B, 0x35]), Rgb([0x4D, 0xBB, 0xD5]), Rgb([0x00, 0xA0, 0x87])]);

        let many = Palette::Jco.colors(19);
        assert_eq!(many.len(), 19);
        assert_eq!(many[0], Rgb(JCO[0]));
        assert_eq!(many[18], Rgb(JCO[9]));
        assert_eq!(many[1], sample(&JCO, 1. / 18.));
        assert_ne!(many[1], Rgb(JCO[1]));
    }

    #[test]
    fn names_parse() {
        assert_eq!("JCO".parse::<Palette>().ok(), Some(Palette::Jco));
        assert!("viridis".parse::<Colormap>().is_err());
    }
}
