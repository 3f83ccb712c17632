//! JSON configuration shared by the binaries.
//!
//! Every field has a default, so a config file only needs
//! to name what it changes:
//!
//! ```json
//! {
//!   "batch": { "pattern": "\\.raw$", "format": { "kind": "raw", "width": 160, "height": 120 } },
//!   "segment": { "kernel_size": 7 },
//!   "aggregate": { "reducer": "median", "keep": ["group"] }
//! }
//! ```

use std::{
    fs::{read_to_string, write},
    path::Path,
};

use serde_derive::*;

use crate::{
    aggregate::Reducer,
    batch::BatchOptions,
    error::{Error, Result},
    merge::MergeOptions,
    segment::SegmentOptions,
    stats::StatsOptions,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub batch: BatchOptions,
    pub segment: SegmentOptions,
    pub stats: StatsOptions,
    pub merge: MergeOptions,
    pub aggregate: AggregateConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AggregateConfig {
    pub reducer: Reducer,
    /// Columns copied from the first replicate instead of
    /// being reduced.
    pub keep: Vec<String>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        AggregateConfig {
            reducer: Reducer::Mean,
            keep: vec![],
        }
    }
}

impl Config {
    /// Read `path`, or return the defaults when no path is
    /// given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Config::default()),
            Some(path) => {
                let text = read_to_string(path).map_err(|e| Error::from_io_at(e, path))?;
                Ok(serde_json::from_str(&text)?)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{batch::ImportFormat, raw::RawOptions};

    #[test]
    fn defaults_without_file() -> Result<()> {
        assert_eq!(Config::load(None)?, Config::default());
        Ok(())
    }

    #[test]
    fn partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("biotherm.json");
        std::fs::write(
            &path,
            r#"{
                "batch": { "recursive": true, "format": { "kind": "raw", "width": 80 } },
                "segment": { "kernel_size": 7, "connectivity": "four" },
                "aggregate": { "reducer": "median" }
            }"#,
        )?;
        let config = Config::load(Some(&path))?;
        assert!(config.batch.recursive);
        assert_eq!(
            config.batch.format,
            ImportFormat::Raw(RawOptions {
                width: 80,
                ..RawOptions::default()
            })
        );
        assert_eq!(config.segment.kernel_size, 7);
        assert!(config.segment.morphology);
        assert_eq!(config.aggregate.reducer, Reducer::Median);
        assert_eq!(config.stats, StatsOptions::default());
        Ok(())
    }

    #[test]
    fn save_then_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("c.json");
        let mut config = Config::default();
        config.merge.clinical_key = "animal".into();
        config.save(&path)?;
        assert_eq!(Config::load(Some(&path))?, config);
        Ok(())
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load(Some(Path::new("/no/such/biotherm.json"))).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
