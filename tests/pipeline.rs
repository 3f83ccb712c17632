use std::{fs, io::Cursor, path::Path};

use biotherm::{
    aggregate::{aggregate_replicates, Reducer, REPLICATE_COUNT},
    batch::{compile_batch_stats, compute_stats_batch, read_batch, segment_batch, BatchOptions, ImportFormat},
    checkpoint::{load_checkpoint, save_checkpoint, Checkpoint},
    merge::{merge_clinical, MergeOptions},
    raw::{write_raw, RawOptions},
    segment::SegmentOptions,
    stats::StatsOptions,
    Cell, Result, Table,
};
use ndarray::Array2;

const HEIGHT: usize = 12;
const WIDTH: usize = 16;

/// A 6x8 block at `warm` on a 24 degree background.
fn write_frame(dir: &Path, name: &str, warm: f64) -> Result<()> {
    let m = Array2::from_shape_fn((HEIGHT, WIDTH), |(r, c)| {
        if (3..9).contains(&r) && (4..12).contains(&c) {
            warm
        } else {
            24.
        }
    });
    write_raw(dir.join(name), m.view())
}

fn batch_options() -> BatchOptions {
    BatchOptions {
        format: ImportFormat::Raw(RawOptions {
            width: WIDTH,
            height: HEIGHT,
            rotate: false,
        }),
        ..BatchOptions::default()
    }
}

#[test]
fn folder_to_aggregated_table() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_frame(dir.path(), "m01_a.raw", 36.)?;
    write_frame(dir.path(), "m01_b.raw", 37.)?;
    write_frame(dir.path(), "m02_a.raw", 35.)?;
    fs::write(dir.path().join("short.raw"), [0u8; 10])?;
    fs::write(dir.path().join("notes.txt"), "not a frame")?;

    let mut records = read_batch(dir.path(), &batch_options())?;
    assert_eq!(records.names().collect::<Vec<_>>(), ["m01_a.raw", "m01_b.raw", "m02_a.raw"]);

    let seg = SegmentOptions {
        kernel_size: 3,
        ..SegmentOptions::default()
    };
    assert_eq!(segment_batch(&mut records, &seg), 3);
    compute_stats_batch(&mut records, &StatsOptions::default());

    let checkpoint = dir.path().join("records.bin");
    save_checkpoint(&checkpoint, &Checkpoint::Collection(records.clone()))?;
    let restored = load_checkpoint(&checkpoint)?.into_record_set();
    assert_eq!(restored.len(), 3);

    let table = compile_batch_stats(&restored)?;
    assert_eq!(table.num_rows(), 3);
    assert_eq!(table.get(0, "id")?, &Cell::from("m01_a.raw"));
    assert_eq!(table.get(0, "mean")?, &Cell::Number(36.));
    assert_eq!(table.get(0, "n_pixels")?, &Cell::Number(48.));
    assert_eq!(table.get(2, "max")?, &Cell::Number(35.));

    let clinical = Table::read_csv(Cursor::new(
        "id,animal,group\nm01_a,m01,control\nm01_b,m01,control\nm02_a,m02,treated\n",
    ))?;
    let merged = merge_clinical(&table, &clinical, &MergeOptions::default())?;
    assert_eq!(merged.get(2, "group")?, &Cell::from("treated"));

    let per_animal = aggregate_replicates(&merged, "animal", Reducer::Mean, &["group"])?;
    assert_eq!(&per_animal.columns()[..3], &["animal", "group", REPLICATE_COUNT]);
    assert!(!per_animal.has_column("id"));
    assert_eq!(per_animal.num_rows(), 2);
    assert_eq!(per_animal.get(0, REPLICATE_COUNT)?, &Cell::Number(2.));
    assert_eq!(per_animal.get(0, "mean")?, &Cell::Number(36.5));
    assert_eq!(per_animal.get(1, "group")?, &Cell::from("treated"));
    Ok(())
}

#[test]
fn csv_output_reads_back() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_frame(dir.path(), "m01.raw", 36.)?;
    let mut records = read_batch(dir.path(), &batch_options())?;
    segment_batch(&mut records, &SegmentOptions::default());
    compute_stats_batch(&mut records, &StatsOptions::default());
    let table = compile_batch_stats(&records)?;

    let mut out = vec![];
    table.write_csv(&mut out)?;
    let back = Table::read_csv(Cursor::new(out))?;
    assert_eq!(back.columns(), table.columns());
    assert_eq!(back.get(0, "median")?, &Cell::Number(36.));
    Ok(())
}
