use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int32Type, Int64Type};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::layout::DecimalSeparator;
use super::model::{CellValue, Curve, CurveSet};

/// Metadata column naming the regime of each curve.
pub const REGIME_COLUMN: &str = "regime";
/// Metadata column holding the replicate index of each curve.
pub const REPLICATE_COLUMN: &str = "replicate";

/// Names of the two list columns holding a curve's samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetColumns {
    pub x: String,
    pub y: String,
}

impl Default for DatasetColumns {
    fn default() -> Self {
        DatasetColumns {
            x: "x".to_string(),
            y: "y".to_string(),
        }
    }
}

impl DatasetColumns {
    fn is_sample(&self, name: &str) -> bool {
        name == self.x || name == self.y
    }
}

/// One dataset row before it becomes a [`Curve`].
struct Record {
    x: Vec<f64>,
    y: Vec<f64>,
    metadata: BTreeMap<String, CellValue>,
}

impl Record {
    fn new(
        x: Vec<f64>,
        y: Vec<f64>,
        metadata: BTreeMap<String, CellValue>,
        row: usize,
    ) -> Result<Self> {
        ensure!(
            x.len() == y.len(),
            "row {row}: {} x values but {} y values",
            x.len(),
            y.len()
        );
        Ok(Record { x, y, metadata })
    }

    /// Regime from the `regime` column, else `fallback`; replicate from the
    /// `replicate` column when it holds a non-negative whole number.
    fn into_curve(self, fallback: &str) -> Curve {
        let regime = self
            .metadata
            .get(REGIME_COLUMN)
            .and_then(CellValue::as_label)
            .unwrap_or_else(|| fallback.to_string());
        let replicate = match self.metadata.get(REPLICATE_COLUMN) {
            Some(CellValue::Integer(i)) => u32::try_from(*i).ok(),
            Some(CellValue::Float(f)) if f.fract() == 0.0 && *f >= 0.0 => Some(*f as u32),
            _ => None,
        };
        Curve {
            regime,
            replicate,
            x: self.x,
            y: self.y,
            metadata: self.metadata,
        }
    }
}

/// Load a columnar curve dataset: one row per replicate curve, the samples
/// in two list columns and everything else kept as metadata.
///
/// * `.parquet` – numeric list columns (any float or integer item type)
/// * `.json`    – records: `[{"x": [...], "y": [...], "regime": "C1", ...}]`
/// * `.csv`     – the sample columns hold `;`-separated numbers
///
/// Rows without a `regime` column take the file stem as their regime.
pub fn load_dataset(path: &Path, columns: &DatasetColumns) -> Result<CurveSet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let records = match ext.as_str() {
        "parquet" | "pq" => read_parquet(path, columns),
        "json" => read_json(path, columns),
        "csv" => read_csv(path, columns),
        other => bail!("unsupported dataset extension: .{other}"),
    }
    .with_context(|| format!("loading dataset {}", path.display()))?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset");
    Ok(CurveSet::from_curves(
        records.into_iter().map(|r| r.into_curve(stem)).collect(),
    ))
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn read_json(path: &Path, columns: &DatasetColumns) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let rows: Vec<Map<String, JsonValue>> =
        serde_json::from_str(&text).context("expected a JSON array of objects")?;

    rows.iter()
        .enumerate()
        .map(|(row, obj)| {
            let samples = |name: &str| -> Result<Vec<f64>> {
                let values = obj
                    .get(name)
                    .and_then(JsonValue::as_array)
                    .with_context(|| format!("row {row}: '{name}' is missing or not an array"))?;
                Ok(values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect())
            };
            let metadata = obj
                .iter()
                .filter(|(key, _)| !columns.is_sample(key))
                .map(|(key, val)| (key.clone(), json_cell(val)))
                .collect();
            Record::new(samples(&columns.x)?, samples(&columns.y)?, metadata, row)
        })
        .collect()
}

fn json_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::Null => CellValue::Null,
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => CellValue::Integer(i),
            (None, Some(f)) => CellValue::Float(f),
            (None, None) => CellValue::String(n.to_string()),
        },
        nested => CellValue::String(nested.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn read_csv(path: &Path, columns: &DatasetColumns) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers = reader.headers().context("reading CSV header")?.clone();
    let position = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| format!("no '{name}' column"))
    };
    let (x_idx, y_idx) = (position(&columns.x)?, position(&columns.y)?);

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("row {row}"))?;
        let x = split_samples(record.get(x_idx).unwrap_or_default(), row, &columns.x)?;
        let y = split_samples(record.get(y_idx).unwrap_or_default(), row, &columns.y)?;
        let metadata = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(i, _)| *i != x_idx && *i != y_idx)
            .map(|(_, (name, value))| (name.trim().to_string(), CellValue::guess(value)))
            .collect();
        records.push(Record::new(x, y, metadata, row)?);
    }
    Ok(records)
}

/// `"0;0,5;1"` → `[0.0, 0.5, 1.0]`; blank tokens are ignored.
fn split_samples(cell: &str, row: usize, column: &str) -> Result<Vec<f64>> {
    cell.split(';')
        .map(str::trim)
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            DecimalSeparator::Auto
                .parse(tok)
                .with_context(|| format!("row {row}, '{column}': '{tok}' is not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn read_parquet(path: &Path, columns: &DatasetColumns) -> Result<Vec<Record>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?
        .build()
        .context("building parquet reader")?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.context("reading parquet record batch")?;
        records.extend(batch_records(&batch, columns, records.len())?);
    }
    Ok(records)
}

fn batch_records(
    batch: &RecordBatch,
    columns: &DatasetColumns,
    first_row: usize,
) -> Result<Vec<Record>> {
    let column = |name: &str| -> Result<&ArrayRef> {
        batch
            .column_by_name(name)
            .with_context(|| format!("parquet file has no '{name}' column"))
    };
    let (x_col, y_col) = (column(&columns.x)?, column(&columns.y)?);
    let schema = batch.schema();
    let meta: Vec<(&str, &ArrayRef)> = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .filter(|(field, _)| !columns.is_sample(field.name()))
        .map(|(field, col)| (field.name().as_str(), col))
        .collect();

    (0..batch.num_rows())
        .map(|i| {
            let row = first_row + i;
            let x = list_samples(x_col, i).with_context(|| format!("row {row}, '{}'", columns.x))?;
            let y = list_samples(y_col, i).with_context(|| format!("row {row}, '{}'", columns.y))?;
            let metadata = meta
                .iter()
                .map(|(name, col)| (name.to_string(), arrow_cell(col, i)))
                .collect();
            Record::new(x, y, metadata, row)
        })
        .collect()
}

/// Samples of one list cell, cast to f64; nulls become NaN.
fn list_samples(col: &ArrayRef, row: usize) -> Result<Vec<f64>> {
    ensure!(!col.is_null(row), "null list");
    let values = match col.data_type() {
        DataType::List(_) => col.as_list::<i32>().value(row),
        DataType::LargeList(_) => col.as_list::<i64>().value(row),
        other => bail!("expected a list column, found {other}"),
    };
    let values = cast(&values, &DataType::Float64)
        .with_context(|| format!("list items of type {} are not numeric", values.data_type()))?;
    Ok(values
        .as_primitive::<Float64Type>()
        .iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

fn arrow_cell(col: &ArrayRef, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    match col.data_type() {
        DataType::Utf8 => CellValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => CellValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        DataType::Int32 => CellValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Int8
        | DataType::Int16
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => {
            match cast(&col.slice(row, 1), &DataType::Int64) {
                Ok(v) => CellValue::Integer(v.as_primitive::<Int64Type>().value(0)),
                Err(_) => CellValue::Null,
            }
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            match cast(&col.slice(row, 1), &DataType::Float64) {
                Ok(v) => CellValue::Float(v.as_primitive::<Float64Type>().value(0)),
                Err(_) => CellValue::Null,
            }
        }
        other => CellValue::String(other.to_string()),
    }
}
