//! A small row-oriented table for per-sample statistics and
//! the clinical data they are joined with.
//!
//! Cells are numbers, text, or missing. Tables can be read
//! and written as CSV (comma separated, double quotes for
//! escaping, empty or `NA` cells are missing) or as JSON
//! arrays of flat objects.

use std::{
    fmt,
    io::{BufRead, Read, Write},
};

use itertools::Itertools;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// NaN becomes [`Cell::Missing`].
    pub fn number(v: f64) -> Self {
        if v.is_nan() {
            Cell::Missing
        } else {
            Cell::Number(v)
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Textual form used when cells act as join or group
    /// keys. `None` for missing cells.
    pub fn key(&self) -> Option<String> {
        match self {
            Cell::Number(v) => Some(v.to_string()),
            Cell::Text(s) => Some(s.clone()),
            Cell::Missing => None,
        }
    }

    /// Zero-padded fields such as `007` stay text so they
    /// keep working as ids.
    fn parse(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() || trimmed == "NA" {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if !zero_padded(trimmed) => Cell::number(v),
            _ => Cell::Text(field.to_string()),
        }
    }
}

fn zero_padded(s: &str) -> bool {
    let mut digits = s.trim_start_matches(|c: char| c == '-' || c == '+').chars();
    digits.next() == Some('0') && digits.next().map_or(false, |c| c.is_ascii_digit())
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(v) => write!(f, "{}", v),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Missing => write!(f, "NA"),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::number(v)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(columns: I) -> Self {
        Table {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: vec![],
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::SchemaMismatch(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Cell>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn get(&self, row: usize, name: &str) -> Result<&Cell> {
        let idx = self.column_index(name)?;
        self.rows
            .get(row)
            .map(|r| &r[idx])
            .ok_or_else(|| Error::invalid(format!("row {} out of range", row)))
    }

    /// A column is numeric when none of its cells is text.
    pub fn is_numeric_column(&self, idx: usize) -> bool {
        self.rows
            .iter()
            .all(|r| !matches!(r.get(idx), Some(Cell::Text(_))))
    }

    pub fn write_csv<W: Write>(&self, mut w: W) -> Result<()> {
        write_csv_line(&mut w, self.columns.iter().map(|c| c.as_str()))?;
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            write_csv_line(&mut w, fields.iter().map(|f| f.as_str()))?;
        }
        w.flush()?;
        Ok(())
    }

    /// Read a CSV with a header line. Quoted fields may span
    /// lines. Short rows are padded with missing cells; long
    /// rows are an error.
    pub fn read_csv<R: BufRead>(mut r: R) -> Result<Self> {
        let mut text = String::new();
        r.read_to_string(&mut text)?;
        let mut records = csv_records(&text)?.into_iter();
        let header = match records.next() {
            Some((_, fields)) => fields,
            None => return Err(Error::EmptyInput("CSV has no header line".into())),
        };
        let mut table = Table::new(header);
        for (line, fields) in records {
            if fields.len() == 1 && fields[0].trim().is_empty() {
                continue;
            }
            let mut row: Vec<Cell> = fields.iter().map(|f| Cell::parse(f)).collect();
            if row.len() > table.columns.len() {
                return Err(Error::SchemaMismatch(format!(
                    "CSV line {} has {} fields, header has {}",
                    line,
                    row.len(),
                    table.columns.len()
                )));
            }
            row.resize(table.columns.len(), Cell::Missing);
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Build a table from a JSON array of flat objects.
    /// Columns appear in order of first occurrence.
    pub fn from_json_records(value: &Value) -> Result<Self> {
        let records = value
            .as_array()
            .ok_or_else(|| Error::invalid("expected a JSON array of objects"))?;
        let mut columns: Vec<String> = vec![];
        for rec in records {
            let obj = rec
                .as_object()
                .ok_or_else(|| Error::invalid("expected a JSON array of objects"))?;
            for key in obj.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut table = Table::new(columns.clone());
        for rec in records {
            let row = columns
                .iter()
                .map(|c| match rec.get(c) {
                    Some(Value::Number(n)) => n.as_f64().map_or(Cell::Missing, Cell::number),
                    Some(Value::String(s)) => Cell::Text(s.clone()),
                    Some(Value::Bool(b)) => Cell::Text(b.to_string()),
                    Some(Value::Null) | None => Cell::Missing,
                    Some(other) => Cell::Text(other.to_string()),
                })
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn to_json_records(&self) -> Value {
        Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    let mut obj = Map::new();
                    for (name, cell) in self.columns.iter().zip(row) {
                        let v = match cell {
                            Cell::Number(v) => serde_json::Number::from_f64(*v)
                                .map_or(Value::Null, Value::Number),
                            Cell::Text(s) => Value::String(s.clone()),
                            Cell::Missing => Value::Null,
                        };
                        obj.insert(name.clone(), v);
                    }
                    Value::Object(obj)
                })
                .collect(),
        )
    }
}

fn write_csv_line<'a, W: Write, I: Iterator<Item = &'a str>>(w: &mut W, fields: I) -> Result<()> {
    let line = fields
        .map(|f| {
            if f.contains(',') || f.contains('"') || f.contains('\n') {
                format!("\"{}\"", f.replace('"', "\"\""))
            } else {
                f.to_string()
            }
        })
        .join(",");
    writeln!(w, "{}", line)?;
    Ok(())
}

/// Split CSV text into records, each tagged with the line
/// it starts on.
fn csv_records(text: &str) -> Result<Vec<(usize, Vec<String>)>> {
    let mut records = vec![];
    let mut fields = vec![];
    let mut current = String::new();
    let mut quoted = false;
    let (mut line, mut start) = (1, 1);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if current.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            ('\r', false) if matches!(chars.peek(), Some(&'\n') | None) => {}
            ('\n', false) => {
                fields.push(std::mem::take(&mut current));
                records.push((start, std::mem::take(&mut fields)));
                line += 1;
                start = line;
            }
            (c, _) => {
                if c == '\n' {
                    line += 1;
                }
                current.push(c);
            }
        }
    }
    if quoted {
        return Err(Error::invalid(format!(
            "unterminated quote in CSV record starting on line {}",
            start
        )));
    }
    if !current.is_empty() || !fields.is_empty() {
        fields.push(current);
        records.push((start, fields));
    }
    Ok(records)
}
