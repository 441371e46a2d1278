//! Tabular dataset sample and the read-only descriptor handed to a pipeline run.
//!
//! CSV input is parsed column-major with a per-column dtype inferred the way a
//! dataframe library would: integers, floats, booleans, datetimes, otherwise
//! free text ("object"). Only the first [`SAMPLE_ROW_CAP`] rows are kept.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{DatastoryError, Result};

/// Maximum number of rows carried in a dataset sample.
pub const SAMPLE_ROW_CAP: usize = 500;

const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null", "none", "<na>"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

// ── Cells ─────────────────────────────────────────────────────────────────────

/// One value in the sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Numeric view of the cell; only integer and float cells qualify.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    fn parse_as(raw: &str, dtype: DType) -> Cell {
        if is_missing(raw) {
            return Cell::Null;
        }
        match dtype {
            DType::Int64 => raw.parse().map(Cell::Int).unwrap_or(Cell::Null),
            DType::Float64 => raw.parse().map(Cell::Float).unwrap_or(Cell::Null),
            DType::Bool => parse_bool(raw).map(Cell::Bool).unwrap_or(Cell::Null),
            DType::DateTime => parse_datetime(raw).map(Cell::DateTime).unwrap_or(Cell::Null),
            DType::Object => Cell::Text(raw.to_string()),
        }
    }

    /// Rough per-value footprint in bytes, modelled on a dataframe's deep memory usage.
    fn footprint(&self, dtype: DType) -> usize {
        match dtype {
            DType::Bool => 1,
            DType::Int64 | DType::Float64 | DType::DateTime => 8,
            DType::Object => match self {
                Cell::Text(s) => 8 + 49 + s.len(),
                _ => 8 + 16,
            },
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(true) => f.write_str("True"),
            Cell::Bool(false) => f.write_str("False"),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v:?}"),
            Cell::DateTime(dt) if dt.num_seconds_from_midnight() == 0 && dt.nanosecond() == 0 => {
                write!(f, "{}", dt.format("%Y-%m-%d"))
            }
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

fn is_missing(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    MISSING_MARKERS.contains(&lowered.as_str())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ── Dtypes ────────────────────────────────────────────────────────────────────

/// Column dtype, named after the equivalent dataframe dtype strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "float64")]
    Float64,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "datetime64[ns]")]
    DateTime,
    #[serde(rename = "object")]
    Object,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Bool => "bool",
            DType::DateTime => "datetime64[ns]",
            DType::Object => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DType::Int64 | DType::Float64)
    }

    fn infer(raw: &[String]) -> DType {
        let present: Vec<&str> = raw.iter().map(|s| s.trim()).filter(|s| !is_missing(s)).collect();
        let has_missing = present.len() < raw.len();

        if present.is_empty() {
            DType::Float64
        } else if present.iter().all(|s| s.parse::<i64>().is_ok()) {
            // A missing value forces an integer column to float, as in a dataframe.
            if has_missing { DType::Float64 } else { DType::Int64 }
        } else if present.iter().all(|s| s.parse::<f64>().is_ok()) {
            DType::Float64
        } else if !has_missing && present.iter().all(|s| parse_bool(s).is_some()) {
            DType::Bool
        } else if present.iter().all(|s| parse_datetime(s).is_some()) {
            DType::DateTime
        } else {
            DType::Object
        }
    }

    fn from_cells(cells: &[Cell]) -> DType {
        let mut seen = cells.iter().filter(|c| !c.is_null()).peekable();
        let has_missing = cells.iter().any(Cell::is_null);
        let Some(first) = seen.peek().cloned() else {
            return DType::Float64;
        };
        let all = |pred: fn(&Cell) -> bool| cells.iter().filter(|c| !c.is_null()).all(pred);

        match first {
            Cell::Int(_) if all(|c| matches!(c, Cell::Int(_))) => {
                if has_missing { DType::Float64 } else { DType::Int64 }
            }
            Cell::Int(_) | Cell::Float(_) if all(|c| matches!(c, Cell::Int(_) | Cell::Float(_))) => {
                DType::Float64
            }
            Cell::Bool(_) if !has_missing && all(|c| matches!(c, Cell::Bool(_))) => DType::Bool,
            Cell::DateTime(_) if all(|c| matches!(c, Cell::DateTime(_))) => DType::DateTime,
            _ => DType::Object,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Columns & sample ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: DType,
    pub cells: Vec<Cell>,
}

impl Column {
    /// Build a column from already-typed cells, inferring its dtype.
    pub fn from_cells(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        let dtype = DType::from_cells(&cells);
        let cells = match dtype {
            // Integer cells in a float column are widened so the column stays homogeneous.
            DType::Float64 => cells
                .into_iter()
                .map(|c| match c {
                    Cell::Int(v) => Cell::Float(v as f64),
                    other => other,
                })
                .collect(),
            _ => cells,
        };
        Self { name: name.into(), dtype, cells }
    }

    fn from_raw(name: String, raw: Vec<String>) -> Self {
        let dtype = DType::infer(&raw);
        let cells = raw.iter().map(|s| Cell::parse_as(s.trim(), dtype)).collect();
        Self { name, dtype, cells }
    }

    pub fn missing(&self) -> usize {
        self.cells.iter().filter(|c| c.is_null()).count()
    }

    /// Number of distinct non-null values.
    pub fn unique(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| !c.is_null())
            .map(|c| c.to_string())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Non-null numeric values; empty for non-numeric columns.
    pub fn numeric_values(&self) -> Vec<f64> {
        if !self.dtype.is_numeric() {
            return Vec::new();
        }
        self.cells.iter().filter_map(Cell::as_f64).collect()
    }

    /// Row-aligned numeric view: `None` for missing cells and for non-numeric columns.
    pub fn numeric_cells(&self) -> Vec<Option<f64>> {
        if !self.dtype.is_numeric() {
            return vec![None; self.cells.len()];
        }
        self.cells.iter().map(Cell::as_f64).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.cells.iter().map(|c| c.footprint(self.dtype)).sum()
    }
}

/// A bounded, typed, column-major copy of the first rows of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSample {
    columns: Vec<Column>,
    n_rows: usize,
}

impl DatasetSample {
    /// Parse CSV bytes (header row required), keeping at most `cap` rows.
    pub fn from_csv(bytes: &[u8], cap: usize) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(DatastoryError::Dataset("CSV has no header row".to_string()));
        }

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        let mut n_rows = 0;
        for record in reader.records().take(cap) {
            let record = record?;
            for (i, values) in raw.iter_mut().enumerate() {
                values.push(record.get(i).unwrap_or("").to_string());
            }
            n_rows += 1;
        }

        let columns = headers
            .into_iter()
            .zip(raw)
            .map(|(name, values)| Column::from_raw(name, values))
            .collect();

        Ok(Self { columns, n_rows })
    }

    /// Count the data rows of a CSV file without keeping them.
    pub fn count_rows(bytes: &[u8]) -> Result<usize> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
        let mut record = csv::ByteRecord::new();
        let mut rows = 0;
        while reader.read_byte_record(&mut record)? {
            rows += 1;
        }
        Ok(rows)
    }

    /// Assemble a sample from prepared columns; all columns must be equally long.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.cells.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.cells.len() != n_rows) {
            return Err(DatastoryError::Dataset(format!(
                "column '{}' has {} rows, expected {}",
                bad.name,
                bad.cells.len(),
                n_rows
            )));
        }
        Ok(Self { columns, n_rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Rows that repeat an earlier row exactly.
    pub fn duplicate_rows(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.n_rows);
        (0..self.n_rows)
            .filter(|&i| {
                let key: Vec<String> = self.columns.iter().map(|c| format!("{:?}", c.cells[i])).collect();
                !seen.insert(key)
            })
            .count()
    }

    /// Serialize the sample back to CSV with a header row.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for i in 0..self.n_rows {
            writer.write_record(self.columns.iter().map(|c| c.cells[i].to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| DatastoryError::Dataset(format!("CSV flush failed: {e}")))
    }
}

// ── Descriptor ────────────────────────────────────────────────────────────────

/// Read-only description of the dataset a pipeline run analyses.
#[derive(Debug, Clone)]
pub struct DatasetDescriptor {
    pub storage_key: String,
    pub filename: String,
    pub columns: Vec<String>,
    pub sample: Arc<DatasetSample>,
}

impl DatasetDescriptor {
    pub fn new(storage_key: impl Into<String>, filename: impl Into<String>, sample: DatasetSample) -> Self {
        Self {
            storage_key: storage_key.into(),
            filename: filename.into(),
            columns: sample.column_names(),
            sample: Arc::new(sample),
        }
    }

    /// Parse CSV bytes into a descriptor with a sample capped at [`SAMPLE_ROW_CAP`] rows.
    pub fn from_csv(storage_key: impl Into<String>, filename: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let sample = DatasetSample::from_csv(bytes, SAMPLE_ROW_CAP)?;
        Ok(Self::new(storage_key, filename, sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CSV: &str = "date,revenue,units,region,active\n\
        2024-01-01,100.5,3,north,true\n\
        2024-01-02,110.0,4,south,false\n\
        2024-01-03,,5,north,true\n";

    #[test]
    fn test_infers_column_dtypes() {
        let sample = DatasetSample::from_csv(CSV.as_bytes(), SAMPLE_ROW_CAP).unwrap();
        let dtypes: Vec<DType> = sample.columns().iter().map(|c| c.dtype).collect();
        assert_eq!(
            dtypes,
            vec![DType::DateTime, DType::Float64, DType::Int64, DType::Object, DType::Bool]
        );
        assert_eq!(sample.n_rows(), 3);
        assert_eq!(sample.column("revenue").unwrap().missing(), 1);
    }

    #[test]
    fn test_sample_is_capped() {
        let mut csv = String::from("x\n");
        for i in 0..1_000 {
            csv.push_str(&format!("{i}\n"));
        }
        let sample = DatasetSample::from_csv(csv.as_bytes(), SAMPLE_ROW_CAP).unwrap();
        assert_eq!(sample.n_rows(), SAMPLE_ROW_CAP);
    }

    #[test]
    fn test_integer_column_with_gap_becomes_float() {
        let sample = DatasetSample::from_csv(b"a\n1\n\n3\n", 10).unwrap();
        assert_eq!(sample.columns()[0].dtype, DType::Float64);
    }

    #[test]
    fn test_csv_round_trip_keeps_shape() {
        let sample = DatasetSample::from_csv(CSV.as_bytes(), SAMPLE_ROW_CAP).unwrap();
        let again = DatasetSample::from_csv(&sample.to_csv().unwrap(), SAMPLE_ROW_CAP).unwrap();
        assert_eq!(sample, again);
    }

    #[test]
    fn test_count_rows_ignores_cap() {
        let mut csv = String::from("x\n");
        for i in 0..750 {
            csv.push_str(&format!("{i}\n"));
        }
        assert_eq!(DatasetSample::count_rows(csv.as_bytes()).unwrap(), 750);
    }

    #[test]
    fn test_numeric_cells_stay_row_aligned() {
        let sample = DatasetSample::from_csv(CSV.as_bytes(), SAMPLE_ROW_CAP).unwrap();
        assert_eq!(
            sample.column("revenue").unwrap().numeric_cells(),
            vec![Some(100.5), Some(110.0), None]
        );
        assert_eq!(sample.column("region").unwrap().numeric_cells(), vec![None; 3]);
    }

    #[test]
    fn test_duplicate_rows() {
        let sample = DatasetSample::from_csv(b"a,b\n1,x\n1,x\n2,y\n", 10).unwrap();
        assert_eq!(sample.duplicate_rows(), 1);
    }

    #[test]
    fn test_from_columns_rejects_ragged_input() {
        let err = DatasetSample::from_columns(vec![
            Column::from_cells("a", vec![Cell::Int(1), Cell::Int(2)]),
            Column::from_cells("b", vec![Cell::Int(1)]),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_descriptor_lists_columns() {
        let d = DatasetDescriptor::from_csv("datasets/x/sales.csv", "sales.csv", CSV.as_bytes()).unwrap();
        assert_eq!(d.columns, vec!["date", "revenue", "units", "region", "active"]);
    }
}
