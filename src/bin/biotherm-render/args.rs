use std::path::PathBuf;

use anyhow::{bail, Result};
use biotherm::{
    arg, args_parser,
    cli::{parse_value, path_value},
    opt,
    viz::{compare::ChartKind, Colormap, Palette},
    Selector,
};

pub enum Mode {
    Heatmap,
    Montage,
    Spiral,
    Density,
    Compare {
        group: String,
        value: String,
        chart: ChartKind,
        palette: Palette,
    },
}

pub struct Args {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: Mode,
    pub colormap: Colormap,
    pub selector: Selector,
    pub range: Option<(f64, f64)>,
    pub scale: u32,
    pub ncol: Option<usize>,
    pub spacing: Option<f64>,
    pub verbosity: u64,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("biotherm-render")
            .about("Render saved thermal records (or a statistics table) to PNG.")
            .arg(
                opt!("mode")
                    .short("m")
                    .required(true)
                    .possible_values(&["heatmap", "montage", "spiral", "density", "compare"])
                    .help("What to draw"),
            )
            .arg(
                opt!("output")
                    .short("o")
                    .required(true)
                    .help("PNG file, or directory for per-record modes (heatmap, density)"),
            )
            .arg(
                opt!("colormap")
                    .possible_values(&["inferno", "jet", "gray"])
                    .help("Heatmap colours [default: inferno]"),
            )
            .arg(
                opt!("selector")
                    .possible_values(&["raw", "processed"])
                    .help("Matrix to draw [default: processed]"),
            )
            .arg(opt!("min").help("Temperature at the low end of the colormap"))
            .arg(opt!("max").help("Temperature at the high end of the colormap"))
            .arg(opt!("scale").help("Output pixels per temperature pixel [default: 1]"))
            .arg(opt!("ncol").help("Montage columns [default: ceil(sqrt(n))]"))
            .arg(opt!("spacing").help("Spiral spacing in output pixels"))
            .arg(opt!("group").help("Grouping column (compare)"))
            .arg(opt!("value").help("Value column (compare) [default: mean]"))
            .arg(
                opt!("chart")
                    .possible_values(&["bar", "box"])
                    .help("Comparison chart kind [default: box]"),
            )
            .arg(
                opt!("palette")
                    .possible_values(&["npg", "jco"])
                    .help("Group colours [default: npg]"),
            )
            .arg(
                opt!("verbose")
                    .takes_value(false)
                    .short("v")
                    .multiple(true)
                    .help("More logging; repeat for more"),
            )
            .arg(
                arg!("input")
                    .required(true)
                    .help("Checkpoint file, or CSV table for compare"),
            )
            .get_matches();

        let mode = match matches.value_of("mode") {
            Some("montage") => Mode::Montage,
            Some("spiral") => Mode::Spiral,
            Some("density") => Mode::Density,
            Some("compare") => {
                let group = match matches.value_of("group") {
                    Some(g) => g.to_string(),
                    None => bail!("--group is required to compare"),
                };
                Mode::Compare {
                    group,
                    value: matches.value_of("value").unwrap_or("mean").to_string(),
                    chart: parse_value(&matches, "chart")?.unwrap_or(ChartKind::Box),
                    palette: parse_value(&matches, "palette")?.unwrap_or_default(),
                }
            }
            _ => Mode::Heatmap,
        };

        let range = match (
            parse_value::<f64>(&matches, "min")?,
            parse_value::<f64>(&matches, "max")?,
        ) {
            (Some(min), Some(max)) => Some((min, max)),
            (None, None) => None,
            _ => bail!("--min and --max go together"),
        };

        Ok(Args {
            input: path_value(&matches, "input").map(PathBuf::from).unwrap_or_default(),
            output: path_value(&matches, "output").map(PathBuf::from).unwrap_or_default(),
            mode,
            colormap: parse_value(&matches, "colormap")?.unwrap_or_default(),
            selector: parse_value(&matches, "selector")?.unwrap_or_default(),
            range,
            scale: parse_value(&matches, "scale")?.unwrap_or(1),
            ncol: parse_value(&matches, "ncol")?,
            spacing: parse_value(&matches, "spacing")?,
            verbosity: matches.occurrences_of("verbose"),
        })
    }
}
