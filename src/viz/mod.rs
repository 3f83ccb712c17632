//! Raster renderings of records and tables.
//!
//! Everything here is a pure function returning an
//! [`RgbaImage`](image::RgbaImage) (or plain data for the
//! caller to draw); saving is left to the caller.

mod canvas;

pub mod compare;
pub mod density;
pub mod heatmap;
pub mod montage;
pub mod palette;
pub mod spiral;

pub use self::palette::{Colormap, Palette};

/// Smallest and largest finite value, if any.
pub fn value_range<'a, I>(values: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = &'a f64>,
{
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_ignores_missing() {
        assert_eq!(value_range(&[f64::NAN, 3., -1., 2.]), Some((-1., 3.)));
        assert_eq!(value_range(&[f64::NAN]), None);
    }
}
