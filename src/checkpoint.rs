//! Saving and restoring records between sessions.
//!
//! A checkpoint is a single `bincode` blob holding either
//! one record or a named collection. It is written to a
//! temporary sibling first and renamed into place, so an
//! interrupted save never leaves a truncated file behind.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde_derive::*;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    record::{RecordSet, ThermalRecord},
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Checkpoint {
    Record(ThermalRecord),
    Collection(RecordSet),
}

impl Checkpoint {
    pub fn len(&self) -> usize {
        match self {
            Checkpoint::Record(_) => 1,
            Checkpoint::Collection(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View the content as a collection; a single record is
    /// keyed by its file name.
    pub fn into_record_set(self) -> RecordSet {
        match self {
            Checkpoint::Record(record) => {
                let mut set = RecordSet::new();
                set.insert(record.filename().to_string(), record);
                set
            }
            Checkpoint::Collection(set) => set,
        }
    }

    /// Structural problems found in the restored records.
    fn problems(&self) -> Vec<String> {
        let check = |name: &str, record: &ThermalRecord| {
            record.validate().err().map(|e| format!("{}: {}", name, e))
        };
        match self {
            Checkpoint::Record(record) => check(record.filename(), record).into_iter().collect(),
            Checkpoint::Collection(set) => set.iter().filter_map(|(n, r)| check(n, r)).collect(),
        }
    }
}

impl From<ThermalRecord> for Checkpoint {
    fn from(record: ThermalRecord) -> Self {
        Checkpoint::Record(record)
    }
}

impl From<RecordSet> for Checkpoint {
    fn from(set: RecordSet) -> Self {
        Checkpoint::Collection(set)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|f| f.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp{}", std::process::id()));
    path.with_file_name(name)
}

pub fn save_checkpoint<P: AsRef<Path>>(path: P, checkpoint: &Checkpoint) -> Result<()> {
    let path = path.as_ref();
    let tmp = temp_sibling(path);
    let written = File::create(&tmp)
        .map_err(Error::from)
        .and_then(|f| {
            let mut w = BufWriter::new(f);
            bincode::serialize_into(&mut w, checkpoint)?;
            w.flush()?;
            Ok(())
        })
        .and_then(|_| fs::rename(&tmp, path).map_err(Error::from));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written?;
    debug!(path = %path.display(), records = checkpoint.len(), "checkpoint saved");
    Ok(())
}

/// Restore a checkpoint. Records failing structural checks
/// are reported but still returned.
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Checkpoint> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::from_io_at(e, path))?;
    let checkpoint: Checkpoint = bincode::deserialize_from(BufReader::new(file))?;
    for problem in checkpoint.problems() {
        warn!(path = %path.display(), "restored record fails validation: {}", problem);
    }
    Ok(checkpoint)
}
