mod args;

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
};

use anyhow::{bail, Context, Result};
use tracing::info;

use args::Args;
use biotherm::{
    aggregate::aggregate_replicates,
    batch::{compile_batch_stats, compute_stats_batch, filter_batch, import_paths, scan_dir, segment_batch},
    checkpoint::{save_checkpoint, Checkpoint},
    cli::{init_logging, progress_bar},
    merge::merge_clinical,
    Table,
};

fn main() -> Result<()> {
    let args = Args::from_cmd_line()?;
    init_logging(args.verbosity);
    let config = &args.config;

    let paths = scan_dir(&args.dir, &config.batch.pattern, config.batch.recursive)?;
    if paths.is_empty() {
        bail!(
            "no files matching `{}` in {}",
            config.batch.pattern,
            args.dir.display()
        );
    }

    let bar = progress_bar(paths.len());
    let mut records = import_paths(&paths, &config.batch.format, Some(&bar));
    bar.finish_and_clear();
    let imported = records.len();
    info!(found = paths.len(), imported, "imported");

    if let Some((min, max)) = args.threshold {
        let n = filter_batch(&mut records, min, max, args.filter_selector)?;
        info!(records = n, min, max, "threshold filter applied");
    }
    if args.segment {
        let n = segment_batch(&mut records, &config.segment);
        info!(records = n, "segmented");
    }
    compute_stats_batch(&mut records, &config.stats);

    let mut table = compile_batch_stats(&records)?;
    if let Some(path) = &args.clinical {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let clinical = Table::read_csv(BufReader::new(file))
            .with_context(|| format!("reading {}", path.display()))?;
        table = merge_clinical(&table, &clinical, &config.merge)?;
    }
    if let Some(id) = &args.aggregate {
        let keep: Vec<&str> = config.aggregate.keep.iter().map(String::as_str).collect();
        table = aggregate_replicates(&table, id, config.aggregate.reducer, &keep)?;
    }

    let out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout()),
    };
    if args.json {
        let mut out = out;
        serde_json::to_writer_pretty(&mut out, &table.to_json_records())?;
        writeln!(out)?;
        out.flush()?;
    } else {
        table.write_csv(out)?;
    }

    if let Some(path) = &args.checkpoint {
        save_checkpoint(path, &Checkpoint::Collection(records))
            .with_context(|| format!("saving checkpoint to {}", path.display()))?;
    }

    eprintln!("Processed {} of {} images", imported, paths.len());
    Ok(())
}
