mod args;

use std::{ffi::OsStr, fs, io::BufReader, path::Path};

use anyhow::{Context, Result};
use image::RgbaImage;
use rayon::prelude::*;

use args::{Args, Mode};
use biotherm::{
    checkpoint::load_checkpoint,
    cli::init_logging,
    viz::{
        compare::{group_summaries, render_comparison, ComparisonOptions},
        density::{density_plot, render_density, DensityPlotOptions, Landmark, RenderDensityOptions},
        heatmap::{render_heatmap, HeatmapOptions},
        montage::{render_montage, MontageOptions},
        spiral::{render_spiral, SpiralOptions},
    },
    RecordSet, Selector, Table, ThermalRecord,
};
use tracing::warn;

fn save(img: &RgbaImage, path: &Path) -> Result<()> {
    img.save(path)
        .with_context(|| format!("writing {}", path.display()))
}

fn per_record<F>(set: &RecordSet, dir: &Path, render: F) -> Result<usize>
where
    F: Fn(&ThermalRecord) -> biotherm::Result<RgbaImage> + Sync,
{
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let entries: Vec<(&str, &ThermalRecord)> = set.iter().collect();
    let written = entries
        .par_iter()
        .map(|&(name, record)| -> Result<bool> {
            let img = match render(record) {
                Ok(img) => img,
                Err(err) => {
                    warn!(record = %name, "nothing rendered: {}", err);
                    return Ok(false);
                }
            };
            let stem = Path::new(name).file_stem().unwrap_or_else(|| OsStr::new(name));
            save(&img, &dir.join(stem).with_extension("png"))?;
            Ok(true)
        })
        .collect::<Result<Vec<bool>>>()?;
    Ok(written.into_iter().filter(|w| *w).count())
}

fn density_of(record: &ThermalRecord, selector: Selector) -> biotherm::Result<RgbaImage> {
    let opts = DensityPlotOptions {
        landmarks: vec![Landmark::Min, Landmark::Peak, Landmark::Max],
        ..DensityPlotOptions::default()
    };
    let values: Vec<f64> = record.selected(selector).iter().copied().collect();
    render_density(&density_plot(&values, &opts)?, &RenderDensityOptions::default())
}

fn main() -> Result<()> {
    let args = Args::from_cmd_line()?;
    init_logging(args.verbosity);

    if let Mode::Compare {
        group,
        value,
        chart,
        palette,
    } = &args.mode
    {
        let file = fs::File::open(&args.input)
            .with_context(|| format!("opening {}", args.input.display()))?;
        let table = Table::read_csv(BufReader::new(file))?;
        let summaries = group_summaries(&table, group, value)?;
        let opts = ComparisonOptions {
            kind: *chart,
            palette: *palette,
            ..ComparisonOptions::default()
        };
        save(&render_comparison(&summaries, &opts)?, &args.output)?;
        eprintln!("Compared {} groups", summaries.len());
        return Ok(());
    }

    let set = load_checkpoint(&args.input)
        .with_context(|| format!("loading {}", args.input.display()))?
        .into_record_set();

    match &args.mode {
        Mode::Heatmap => {
            let opts = HeatmapOptions {
                colormap: args.colormap,
                range: args.range,
                scale: args.scale,
            };
            let n = per_record(&set, &args.output, |r| {
                render_heatmap(r.selected(args.selector), &opts)
            })?;
            eprintln!("Rendered {} of {} heatmaps", n, set.len());
        }
        Mode::Density => {
            let n = per_record(&set, &args.output, |r| density_of(r, args.selector))?;
            eprintln!("Rendered {} of {} density plots", n, set.len());
        }
        Mode::Montage => {
            let opts = MontageOptions {
                ncol: args.ncol,
                colormap: args.colormap,
                range: args.range,
                selector: args.selector,
                scale: args.scale,
                ..MontageOptions::default()
            };
            save(&render_montage(&set, &opts)?, &args.output)?;
            eprintln!("Montage of {} records", set.len());
        }
        Mode::Spiral => {
            let opts = SpiralOptions {
                spacing: args.spacing,
                colormap: args.colormap,
                range: args.range,
                selector: args.selector,
                scale: args.scale,
                ..SpiralOptions::default()
            };
            save(&render_spiral(&set, &opts)?, &args.output)?;
            eprintln!("Spiral of {} records", set.len());
        }
        Mode::Compare { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn masked_out_records_are_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut set = RecordSet::new();
        let warm = Array2::from_shape_fn((4, 4), |(r, c)| 30. + (r * 4 + c) as f64);
        set.insert("m1.raw", ThermalRecord::from_matrix(warm, "m1.raw")?);
        let empty = Array2::from_elem((4, 4), biotherm::MISSING);
        set.insert("m2.raw", ThermalRecord::from_matrix(empty, "m2.raw")?);

        let out = dir.path().join("density");
        let n = per_record(&set, &out, |r| density_of(r, Selector::Raw))?;
        assert_eq!(n, 1);
        assert!(out.join("m1.png").exists());
        assert!(!out.join("m2.png").exists());
        Ok(())
    }
}
