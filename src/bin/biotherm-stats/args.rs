use std::path::PathBuf;

use anyhow::{bail, Result};
use biotherm::{
    arg, args_parser,
    batch::ImportFormat,
    cli::{parse_value, path_value},
    config::Config,
    opt,
    radiometric::FlirOptions,
    raw::RawOptions,
    Selector,
};

pub struct Args {
    pub dir: PathBuf,
    pub config: Config,
    pub threshold: Option<(f64, f64)>,
    pub filter_selector: Selector,
    pub segment: bool,
    pub clinical: Option<PathBuf>,
    pub aggregate: Option<String>,
    pub output: Option<PathBuf>,
    pub json: bool,
    pub checkpoint: Option<PathBuf>,
    pub verbosity: u64,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("biotherm-stats")
            .about("Segment thermal images and tabulate subject temperature statistics.")
            .arg(opt!("config").short("c").help("JSON configuration file"))
            .arg(opt!("pattern").help("Regex matched against file names [default: (?i)\\.raw$]"))
            .arg(
                opt!("recursive")
                    .takes_value(false)
                    .short("r")
                    .help("Descend into sub-directories"),
            )
            .arg(
                opt!("format")
                    .possible_values(&["raw", "flir"])
                    .help("Input file format [default: raw]"),
            )
            .arg(opt!("width").help("Raw grid width [default: 160]"))
            .arg(opt!("height").help("Raw grid height [default: 120]"))
            .arg(
                opt!("no rotate")
                    .takes_value(false)
                    .help("Keep raw grids in sensor orientation"),
            )
            .arg(
                opt!("distance")
                    .short("d")
                    .help("Object distance for radiometric images, in metres"),
            )
            .arg(
                opt!("no exiftool")
                    .takes_value(false)
                    .help("Never fall back to exiftool for radiometric images"),
            )
            .arg(opt!("min").help("Keep pixels at or above this temperature"))
            .arg(opt!("max").help("Keep pixels at or below this temperature"))
            .arg(
                opt!("filter on")
                    .possible_values(&["raw", "processed"])
                    .help("Matrix the temperature filter reads [default: raw]"),
            )
            .arg(
                opt!("no segment")
                    .takes_value(false)
                    .help("Skip Otsu segmentation"),
            )
            .arg(opt!("kernel size").help("Disc diameter for morphology [default: 5]"))
            .arg(
                opt!("no morphology")
                    .takes_value(false)
                    .help("Skip opening / closing of the mask"),
            )
            .arg(
                opt!("connectivity")
                    .possible_values(&["4", "8"])
                    .help("Pixel adjacency for components [default: 8]"),
            )
            .arg(
                opt!("stats on")
                    .possible_values(&["raw", "processed"])
                    .help("Matrix statistics are computed on [default: processed]"),
            )
            .arg(opt!("clinical").help("Clinical CSV to join onto the statistics"))
            .arg(opt!("clinical key").help("Join column of the clinical CSV [default: id]"))
            .arg(
                opt!("keep ids")
                    .takes_value(false)
                    .help("Match ids exactly instead of by file stem"),
            )
            .arg(opt!("aggregate").help("Collapse replicates sharing this column"))
            .arg(
                opt!("reducer")
                    .possible_values(&["mean", "median"])
                    .help("How replicates are combined [default: mean]"),
            )
            .arg(
                opt!("keep")
                    .multiple(true)
                    .number_of_values(1)
                    .help("Column copied from the first replicate (repeatable)"),
            )
            .arg(opt!("output").short("o").help("Output file [default: stdout]"))
            .arg(
                opt!("json")
                    .takes_value(false)
                    .help("Write JSON records instead of CSV"),
            )
            .arg(opt!("checkpoint").help("Save the processed records to this file"))
            .arg(
                opt!("verbose")
                    .takes_value(false)
                    .short("v")
                    .multiple(true)
                    .help("More logging; repeat for more"),
            )
            .arg(arg!("dir").required(true).help("Directory of thermal images"))
            .get_matches();

        let mut config = Config::load(path_value(&matches, "config"))?;

        if let Some(pattern) = matches.value_of("pattern") {
            config.batch.pattern = pattern.to_string();
        }
        if matches.is_present("recursive") {
            config.batch.recursive = true;
        }
        match matches.value_of("format") {
            Some("flir") if !matches!(config.batch.format, ImportFormat::Flir(_)) => {
                config.batch.format = ImportFormat::Flir(FlirOptions::default());
            }
            Some("raw") if !matches!(config.batch.format, ImportFormat::Raw(_)) => {
                config.batch.format = ImportFormat::Raw(RawOptions::default());
            }
            _ => {}
        }
        match &mut config.batch.format {
            ImportFormat::Raw(raw) => {
                if let Some(width) = parse_value(&matches, "width")? {
                    raw.width = width;
                }
                if let Some(height) = parse_value(&matches, "height")? {
                    raw.height = height;
                }
                if matches.is_present("no rotate") {
                    raw.rotate = false;
                }
            }
            ImportFormat::Flir(flir) => {
                if let Some(distance) = parse_value(&matches, "distance")? {
                    flir.distance = Some(distance);
                }
                if matches.is_present("no exiftool") {
                    flir.exiftool = false;
                }
            }
        }

        let threshold = match (
            parse_value::<f64>(&matches, "min")?,
            parse_value::<f64>(&matches, "max")?,
        ) {
            (None, None) => None,
            (min, max) => {
                let range = (min.unwrap_or(f64::NEG_INFINITY), max.unwrap_or(f64::INFINITY));
                if range.0 > range.1 {
                    bail!("--min {} is above --max {}", range.0, range.1);
                }
                Some(range)
            }
        };
        let filter_selector = parse_value(&matches, "filter on")?.unwrap_or(Selector::Raw);

        if let Some(kernel_size) = parse_value(&matches, "kernel size")? {
            config.segment.kernel_size = kernel_size;
        }
        if matches.is_present("no morphology") {
            config.segment.morphology = false;
        }
        if let Some(connectivity) = parse_value(&matches, "connectivity")? {
            config.segment.connectivity = connectivity;
        }
        if let Some(selector) = parse_value(&matches, "stats on")? {
            config.stats.selector = selector;
        }

        if let Some(key) = matches.value_of("clinical key") {
            config.merge.clinical_key = key.to_string();
        }
        if matches.is_present("keep ids") {
            config.merge.normalize_ids = false;
        }
        if let Some(reducer) = parse_value(&matches, "reducer")? {
            config.aggregate.reducer = reducer;
        }
        if let Some(keep) = matches.values_of("keep") {
            config.aggregate.keep = keep.map(String::from).collect();
        }

        Ok(Args {
            dir: matches.value_of("dir").map(PathBuf::from).unwrap_or_default(),
            config,
            threshold,
            filter_selector,
            segment: !matches.is_present("no segment"),
            clinical: path_value(&matches, "clinical").map(PathBuf::from),
            aggregate: matches.value_of("aggregate").map(String::from),
            output: path_value(&matches, "output").map(PathBuf::from),
            json: matches.is_present("json"),
            checkpoint: path_value(&matches, "checkpoint").map(PathBuf::from),
            verbosity: matches.occurrences_of("verbose"),
        })
    }
}
