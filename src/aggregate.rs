//! Collapsing replicate images of the same subject into one
//! row.

use std::str::FromStr;

use serde_derive::*;
use tracing::debug;

use crate::{
    error::{Error, Result},
    stats::quantile_sorted,
    table::{Cell, Table},
};

/// Column holding the number of rows folded into a group.
pub const REPLICATE_COUNT: &str = "replicate_count";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Mean,
    Median,
}

impl FromStr for Reducer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Reducer::Mean),
            "median" => Ok(Reducer::Median),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

impl Reducer {
    /// Reduce the non-missing values; `None` if there are
    /// none.
    pub fn reduce(self, values: &[f64]) -> Option<f64> {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if finite.is_empty() {
            return None;
        }
        Some(match self {
            Reducer::Mean => finite.iter().sum::<f64>() / finite.len() as f64,
            Reducer::Median => {
                finite.sort_by(|a, b| a.total_cmp(b));
                quantile_sorted(&finite, 0.5)
            }
        })
    }
}

struct Group {
    key: Cell,
    rows: Vec<usize>,
}

/// Group rows by `id_col` and reduce every numeric column
/// with `reducer`.
///
/// Groups come out in order of first appearance. Columns in
/// `keep` take the value of the group's first row.
/// Non-numeric columns not in `keep` are dropped. An existing
/// `replicate_count` column (from an earlier aggregation) is
/// summed rather than reduced.
pub fn aggregate_replicates(
    table: &Table,
    id_col: &str,
    reducer: Reducer,
    keep: &[&str],
) -> Result<Table> {
    let id_idx = table.column_index(id_col)?;
    let prior_idx = table
        .column_index(REPLICATE_COUNT)
        .ok()
        .filter(|&i| i != id_idx);
    let keep_idx = keep
        .iter()
        .filter(|k| **k != id_col && **k != REPLICATE_COUNT)
        .map(|k| table.column_index(k))
        .collect::<Result<Vec<_>>>()?;

    let mut groups: Vec<Group> = vec![];
    for (i, row) in table.rows().iter().enumerate() {
        let key = &row[id_idx];
        match groups.iter_mut().find(|g| g.key.key() == key.key()) {
            Some(g) => g.rows.push(i),
            None => groups.push(Group {
                key: key.clone(),
                rows: vec![i],
            }),
        }
    }

    let mut metric_idx = vec![];
    for (i, name) in table.columns().iter().enumerate() {
        if i == id_idx || keep_idx.contains(&i) || Some(i) == prior_idx {
            continue;
        }
        if table.is_numeric_column(i) {
            metric_idx.push(i);
        } else {
            debug!(column = %name, "dropping non-numeric column");
        }
    }

    let columns = std::iter::once(id_idx)
        .chain(keep_idx.iter().copied())
        .map(|i| table.columns()[i].clone())
        .chain(std::iter::once(REPLICATE_COUNT.to_string()))
        .chain(metric_idx.iter().map(|&i| table.columns()[i].clone()));
    let mut out = Table::new(columns);

    for group in groups {
        let first = &table.rows()[group.rows[0]];
        let mut row = vec![group.key.clone()];
        row.extend(keep_idx.iter().map(|&i| first[i].clone()));
        let count: f64 = match prior_idx {
            Some(p) => group
                .rows
                .iter()
                .map(|&r| table.rows()[r][p].as_f64().unwrap_or(1.))
                .sum(),
            None => group.rows.len() as f64,
        };
        row.push(Cell::Number(count));
        for &i in &metric_idx {
            let values: Vec<f64> = group
                .rows
                .iter()
                .filter_map(|&r| table.rows()[r][i].as_f64())
                .collect();
            row.push(reducer.reduce(&values).map_or(Cell::Missing, Cell::number));
        }
        out.push_row(row)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn table() -> Table {
        Table::read_csv(Cursor::new(
            "animal,group,file,mean,sd\n\
             m1,ctrl,a.raw,36,1\n\
             m2,treat,b.raw,34,NA\n\
             m1,ctrl,c.raw,38,3\n\
             m1,ctrl,d.raw,31,NA\n\
             ,ctrl,e.raw,30,2\n",
        ))
        .expect("csv")
    }

    #[test]
    fn parses_reducer() {
        assert_eq!("Median".parse::<Reducer>().ok(), Some(Reducer::Median));
        assert!(matches!("mode".parse::<Reducer>(), Err(Error::UnsupportedMethod(_))));
    }

    #[test]
    fn groups_in_order_of_appearance() -> Result<()> {
        let t = aggregate_replicates(&table(), "animal", Reducer::Mean, &["group"])?;
        assert_eq!(t.columns(), &["animal", "group", "replicate_count", "mean", "sd"]);
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.get(0, "animal")?, &Cell::Text("m1".into()));
        assert_eq!(t.get(0, "replicate_count")?, &Cell::Number(3.));
        assert_eq!(t.get(0, "mean")?, &Cell::Number(35.));
        assert_eq!(t.get(0, "sd")?, &Cell::Number(2.));
        assert_eq!(t.get(1, "sd")?, &Cell::Missing);
        assert_eq!(t.get(2, "animal")?, &Cell::Missing);
        assert_eq!(t.get(2, "group")?, &Cell::Text("ctrl".into()));
        Ok(())
    }

    #[test]
    fn median_reducer() -> Result<()> {
        let t = aggregate_replicates(&table(), "animal", Reducer::Median, &[])?;
        assert_eq!(t.get(0, "mean")?, &Cell::Number(36.));
        assert!(!t.has_column("group"));
        assert!(!t.has_column("file"));
        Ok(())
    }

    #[test]
    fn three_replicates_of_two_animals() -> Result<()> {
        let t = Table::read_csv(Cursor::new(
            "id,mean\nA,30\nA,31\nA,32\nB,34\nB,35\nB,36\n",
        ))?;
        let out = aggregate_replicates(&t, "id", Reducer::Mean, &[])?;
        assert_eq!(out.num_rows(), 2);
        let counts: Vec<f64> = out
            .column(REPLICATE_COUNT)?
            .filter_map(Cell::as_f64)
            .collect();
        assert_eq!(counts, vec![3., 3.]);
        assert_eq!(counts.iter().sum::<f64>(), t.num_rows() as f64);
        assert_eq!(out.get(0, "mean")?, &Cell::Number(31.));
        assert_eq!(out.get(1, "mean")?, &Cell::Number(35.));
        Ok(())
    }

    #[test]
    fn aggregating_twice_sums_counts() -> Result<()> {
        let once = aggregate_replicates(&table(), "animal", Reducer::Mean, &["group"])?;
        let twice = aggregate_replicates(&once, "group", Reducer::Mean, &[REPLICATE_COUNT])?;
        assert_eq!(twice.columns(), &["group", "replicate_count", "mean", "sd"]);
        assert_eq!(twice.get(0, "group")?, &Cell::Text("ctrl".into()));
        assert_eq!(twice.get(0, REPLICATE_COUNT)?, &Cell::Number(4.));
        assert_eq!(twice.get(1, REPLICATE_COUNT)?, &Cell::Number(1.));
        Ok(())
    }

    #[test]
    fn unknown_columns_are_errors() {
        assert!(matches!(
            aggregate_replicates(&table(), "subject", Reducer::Mean, &[]),
            Err(Error::MissingColumn(_))
        ));
        assert!(matches!(
            aggregate_replicates(&table(), "animal", Reducer::Mean, &["weight"]),
            Err(Error::MissingColumn(_))
        ));
    }
}
