//! Joining compiled statistics with clinical data.

use std::{collections::HashMap, path::Path};

use serde_derive::*;
use tracing::{debug, warn};

use crate::{
    error::Result,
    table::{Cell, Table},
};

/// Suffix given to clinical columns whose name is already
/// taken by a statistics column, under
/// [`ColumnConflict::Suffix`].
pub const CLINICAL_SUFFIX: &str = "_clinical";

/// What happens to a clinical column whose name is already
/// used by the statistics table.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnConflict {
    /// Keep only the statistics column.
    Drop,
    /// Keep both, renaming the clinical one.
    Suffix,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MergeOptions {
    pub stats_key: String,
    pub clinical_key: String,
    /// Compare keys by file stem so `data/m01.raw` matches
    /// `m01`.
    pub normalize_ids: bool,
    pub on_conflict: ColumnConflict,
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            stats_key: crate::batch::ID_COLUMN.to_string(),
            clinical_key: "id".to_string(),
            normalize_ids: true,
            on_conflict: ColumnConflict::Drop,
        }
    }
}

/// Strip directories and the final extension from an id.
pub fn normalize_id(id: &str) -> String {
    Path::new(id.trim())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.trim().to_string())
}

/// Left join `clinical` onto `stats`.
///
/// Every stats row appears once in the output, followed by
/// the clinical columns. The clinical key column is never
/// carried over. When several clinical rows share a key, the
/// first one is used.
pub fn merge_clinical(stats: &Table, clinical: &Table, opts: &MergeOptions) -> Result<Table> {
    let stats_key = stats.column_index(&opts.stats_key)?;
    let clinical_key = clinical.column_index(&opts.clinical_key)?;

    let key_of = |cell: &Cell| {
        cell.key().map(|k| {
            if opts.normalize_ids {
                normalize_id(&k)
            } else {
                k
            }
        })
    };

    let mut lookup: HashMap<String, usize> = HashMap::new();
    for (i, row) in clinical.rows().iter().enumerate() {
        if let Some(key) = key_of(&row[clinical_key]) {
            if lookup.contains_key(&key) {
                warn!(key = %key, "duplicate clinical id; keeping the first row");
            } else {
                lookup.insert(key, i);
            }
        }
    }

    let mut columns: Vec<String> = stats.columns().to_vec();
    let mut carried = vec![];
    for (i, name) in clinical.columns().iter().enumerate() {
        if i == clinical_key {
            continue;
        }
        if !stats.has_column(name) {
            columns.push(name.clone());
        } else if opts.on_conflict == ColumnConflict::Suffix {
            columns.push(format!("{}{}", name, CLINICAL_SUFFIX));
        } else {
            debug!(column = %name, "clinical column shadowed by statistics column");
            continue;
        }
        carried.push(i);
    }

    let mut merged = Table::new(columns);
    let mut unmatched = 0;
    for row in stats.rows() {
        let matched = key_of(&row[stats_key]).and_then(|k| lookup.get(&k).copied());
        if matched.is_none() {
            unmatched += 1;
        }
        let mut out = row.clone();
        out.extend(carried.iter().map(|&i| match matched {
            Some(r) => clinical.rows()[r][i].clone(),
            None => Cell::Missing,
        }));
        merged.push_row(out)?;
    }
    if unmatched > 0 {
        warn!(unmatched, "stats rows without clinical data");
    }
    Ok(merged)
}
