//! Grids of cropped records sharing one colour scale.

use image::{Rgba, RgbaImage};
use ndarray::{s, ArrayView2};
use serde_derive::*;
use tracing::warn;

use super::{
    canvas,
    heatmap::{render_heatmap, HeatmapOptions},
    palette::Colormap,
    value_range,
};
use crate::{
    error::{Error, Result},
    record::{RecordSet, Selector},
};

/// Rectangle enclosing the valid pixels of a matrix.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub width: usize,
}

impl BoundingBox {
    pub fn crop<'a>(&self, m: ArrayView2<'a, f64>) -> ArrayView2<'a, f64> {
        m.slice_move(s![
            self.row..self.row + self.height,
            self.col..self.col + self.width
        ])
    }
}

/// `None` when every pixel is missing.
pub fn bounding_box(m: ArrayView2<'_, f64>) -> Option<BoundingBox> {
    let mut found: Option<(usize, usize, usize, usize)> = None;
    for ((r, c), v) in m.indexed_iter() {
        if !v.is_finite() {
            continue;
        }
        found = Some(match found {
            None => (r, r, c, c),
            Some((r0, r1, c0, c1)) => (r0.min(r), r1.max(r), c0.min(c), c1.max(c)),
        });
    }
    found.map(|(r0, r1, c0, c1)| BoundingBox {
        row: r0,
        col: c0,
        height: r1 - r0 + 1,
        width: c1 - c0 + 1,
    })
}

/// Columns and rows of a grid holding `n` items. `ncol`
/// defaults to `ceil(sqrt(n))`.
pub fn grid_shape(n: usize, ncol: Option<usize>) -> (usize, usize) {
    let ncol = ncol
        .unwrap_or_else(|| (n as f64).sqrt().ceil() as usize)
        .max(1);
    (ncol, (n + ncol - 1) / ncol)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MontageOptions {
    pub ncol: Option<usize>,
    pub colormap: Colormap,
    pub range: Option<(f64, f64)>,
    pub selector: Selector,
    pub scale: u32,
    /// Gap between cells, in output pixels.
    pub padding: u32,
    pub background: [u8; 4],
}

impl Default for MontageOptions {
    fn default() -> Self {
        MontageOptions {
            ncol: None,
            colormap: Colormap::default(),
            range: None,
            selector: Selector::Processed,
            scale: 1,
            padding: 2,
            background: [0, 0, 0, 0],
        }
    }
}

/// Crop every record to its bounding box and colour it
/// on a range shared by all records. Records without valid
/// pixels yield `None`.
pub(crate) fn render_tiles(
    set: &RecordSet,
    selector: Selector,
    colormap: Colormap,
    range: Option<(f64, f64)>,
    scale: u32,
) -> Result<Vec<Option<RgbaImage>>> {
    if set.is_empty() {
        return Err(Error::EmptyInput("no records to lay out".into()));
    }
    let crops: Vec<(&str, Option<ArrayView2<'_, f64>>)> = set
        .iter()
        .map(|(name, rec)| {
            let m = rec.selected(selector);
            (name, bounding_box(m).map(|b| b.crop(m)))
        })
        .collect();

    let range = match range {
        Some(r) => r,
        None => crops
            .iter()
            .filter_map(|(_, c)| c.as_ref().and_then(|c| value_range(c.iter())))
            .fold(None, |acc: Option<(f64, f64)>, (lo, hi)| match acc {
                None => Some((lo, hi)),
                Some((a, b)) => Some((a.min(lo), b.max(hi))),
            })
            .ok_or_else(|| Error::EmptyInput("no record has valid pixels".into()))?,
    };

    let heat = HeatmapOptions {
        colormap,
        range: Some(range),
        scale,
    };
    crops
        .into_iter()
        .map(|(name, crop)| match crop {
            Some(c) => render_heatmap(c, &heat).map(Some),
            None => {
                warn!(record = %name, "no valid pixels; leaving it out of the layout");
                Ok(None)
            }
        })
        .collect()
}

/// Largest tile width and height.
pub(crate) fn cell_size<'a, I>(tiles: I) -> (u32, u32)
where
    I: IntoIterator<Item = &'a RgbaImage>,
{
    tiles
        .into_iter()
        .fold((1, 1), |(w, h), t| (w.max(t.width()), h.max(t.height())))
}

/// Lay out every record of `set` in a grid. Cells are as
/// large as the largest bounding box, and each crop is
/// centred in its cell.
pub fn render_montage(set: &RecordSet, opts: &MontageOptions) -> Result<RgbaImage> {
    let tiles = render_tiles(set, opts.selector, opts.colormap, opts.range, opts.scale)?;
    let (cell_w, cell_h) = cell_size(tiles.iter().flatten());

    let (ncol, nrow) = grid_shape(tiles.len(), opts.ncol);
    let pad = opts.padding;
    let mut out = canvas::blank(
        ncol as u32 * (cell_w + pad) + pad,
        nrow as u32 * (cell_h + pad) + pad,
        Rgba(opts.background),
    );
    for (i, tile) in tiles.iter().enumerate() {
        if let Some(tile) = tile {
            let (row, col) = ((i / ncol) as u32, (i % ncol) as u32);
            let x = pad + col * (cell_w + pad) + (cell_w - tile.width()) / 2;
            let y = pad + row * (cell_h + pad) + (cell_h - tile.height()) / 2;
            canvas::paste(&mut out, tile, x as i64, y as i64);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ThermalRecord, MISSING};
    use ndarray::{array, Array2};

    #[test]
    fn bounding_box_of_valid_pixels() {
        let m = array![
            [MISSING, MISSING, MISSING],
            [MISSING, 1., MISSING],
            [MISSING, 2., 3.]
        ];
        let b = bounding_box(m.view()).expect("bbox");
        assert_eq!(
            b,
            BoundingBox {
                row: 1,
                col: 1,
                height: 2,
                width: 2
            }
        );
        assert_eq!(b.crop(m.view()).dim(), (2, 2));
        assert!(bounding_box(Array2::from_elem((2, 2), MISSING).view()).is_none());
    }

    #[test]
    fn default_grid_is_square_ish() {
        assert_eq!(grid_shape(5, None), (3, 2));
        assert_eq!(grid_shape(4, None), (2, 2));
        assert_eq!(grid_shape(1, None), (1, 1));
        assert_eq!(grid_shape(5, Some(5)), (5, 1));
    }

    #[test]
    fn cells_are_sized_by_largest_crop() -> Result<()> {
        let mut set = RecordSet::new();
        let mut big = Array2::from_elem((6, 6), MISSING);
        big.slice_mut(s![1..5, 0..3]).fill(30.);
        set.insert("big", ThermalRecord::from_matrix(big, "big")?);
        set.insert("small", ThermalRecord::from_matrix(array![[35.]], "small")?);
        set.insert("empty", ThermalRecord::from_matrix(array![[MISSING]], "empty")?);

        let opts = MontageOptions {
            colormap: Colormap::Gray,
            padding: 1,
            ..MontageOptions::default()
        };
        let img = render_montage(&set, &opts)?;
        // 3 records -> 2 columns x 2 rows of 3x4 cells
        assert_eq!(img.dimensions(), (2 * (3 + 1) + 1, 2 * (4 + 1) + 1));
        // "big" is the darkest value of the shared range
        assert_eq!(img.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
        // "small" sits in the middle of the second cell
        assert_eq!(img.get_pixel(1 + 4 + 1, 1 + 1), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(1 + 4, 1)[3], 0);
        Ok(())
    }

    #[test]
    fn empty_inputs() -> Result<()> {
        assert!(render_montage(&RecordSet::new(), &MontageOptions::default()).is_err());
        let mut set = RecordSet::new();
        set.insert("x", ThermalRecord::from_matrix(array![[MISSING]], "x")?);
        assert!(matches!(
            render_montage(&set, &MontageOptions::default()),
            Err(Error::EmptyInput(_))
        ));
        Ok(())
    }
}
