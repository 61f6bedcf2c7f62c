use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use log::{debug, warn};

use super::layout::{ColumnRef, DecimalSeparator, Delimiter, HeaderLocator, TableLayout};
use super::model::CellValue;
use crate::error::LoadError;

// ---------------------------------------------------------------------------
// Load report: what was parsed and what was skipped
// ---------------------------------------------------------------------------

/// A data row that could not be parsed and was left out.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    /// 1-based row (spreadsheet) or line (text) number in the source file.
    pub row: usize,
    pub reason: String,
}

/// Outcome of loading one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub parsed: usize,
    pub skipped: Vec<SkippedRow>,
}

impl LoadReport {
    pub fn skip(&mut self, source: &Path, row: usize, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("{}: skipping row {row}: {reason}", source.display());
        self.skipped.push(SkippedRow { row, reason });
    }

    pub fn merge(&mut self, other: LoadReport) {
        self.parsed += other.parsed;
        self.skipped.extend(other.skipped);
    }
}

/// Loaded records together with their [`LoadReport`].
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub data: T,
    pub report: LoadReport,
}

// ---------------------------------------------------------------------------
// RawTable – untyped cells straight from the source
// ---------------------------------------------------------------------------

/// A grid of cells as read from a sheet or text export, before any layout
/// is applied.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub path: PathBuf,
    pub rows: Vec<Vec<CellValue>>,
    /// 1-based source row number of each entry in `rows`.
    pub row_numbers: Vec<usize>,
}

/// The header (if any) and the data rows that follow it.
#[derive(Debug)]
pub struct DataView<'a> {
    pub path: &'a Path,
    pub header: Option<&'a [CellValue]>,
    pub rows: &'a [Vec<CellValue>],
    pub row_numbers: &'a [usize],
}

impl RawTable {
    /// Split off the header row according to `locator`.
    pub fn locate(&self, locator: &HeaderLocator) -> Result<DataView<'_>, LoadError> {
        let header_idx = match locator {
            HeaderLocator::None => None,
            HeaderLocator::Offset(row) => {
                if *row >= self.rows.len() {
                    return Err(LoadError::HeaderOutOfRange {
                        path: self.path.clone(),
                        row: *row,
                        rows: self.rows.len(),
                    });
                }
                Some(*row)
            }
            HeaderLocator::Marker(marker) => {
                let found = self.rows.iter().position(|row| {
                    row.iter()
                        .find(|cell| !cell.is_blank())
                        .and_then(CellValue::as_label)
                        .is_some_and(|text| text.contains(marker.as_str()))
                });
                match found {
                    Some(idx) => {
                        debug!(
                            "{}: header marker '{marker}' on row {}",
                            self.path.display(),
                            self.row_numbers[idx]
                        );
                        Some(idx)
                    }
                    None => {
                        return Err(LoadError::MarkerNotFound {
                            path: self.path.clone(),
                            marker: marker.clone(),
                        })
                    }
                }
            }
        };

        let data_start = header_idx.map_or(0, |h| h + 1);
        Ok(DataView {
            path: &self.path,
            header: header_idx.map(|h| self.rows[h].as_slice()),
            rows: &self.rows[data_start..],
            row_numbers: &self.row_numbers[data_start..],
        })
    }
}

impl DataView<'_> {
    /// Resolve a column reference to a zero-based position. Names match the
    /// trimmed header text exactly, then case-insensitively, then as a unique
    /// case-insensitive substring.
    pub fn resolve(&self, column: &ColumnRef) -> Result<usize, LoadError> {
        let name = match column {
            ColumnRef::Index(idx) => return Ok(*idx),
            ColumnRef::Name(name) => name,
        };
        let header = self.header.ok_or_else(|| LoadError::NoHeaderForName {
            path: self.path.to_path_buf(),
            column: name.clone(),
        })?;
        let labels: Vec<String> = header
            .iter()
            .map(|c| c.as_label().unwrap_or_default())
            .collect();
        let wanted = name.trim();
        let lower = wanted.to_lowercase();

        if let Some(idx) = labels.iter().position(|l| l == wanted) {
            return Ok(idx);
        }
        if let Some(idx) = labels.iter().position(|l| l.to_lowercase() == lower) {
            return Ok(idx);
        }
        let partial: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.to_lowercase().contains(&lower))
            .map(|(i, _)| i)
            .collect();
        match partial.as_slice() {
            [idx] => Ok(*idx),
            _ => Err(LoadError::MissingColumn {
                path: self.path.to_path_buf(),
                column: name.clone(),
            }),
        }
    }

    /// Data rows paired with their source row numbers, blank rows removed.
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &[CellValue])> + '_ {
        self.rows
            .iter()
            .zip(self.row_numbers.iter().copied())
            .filter(|(row, _)| !row.iter().all(CellValue::is_blank))
            .map(|(row, number)| (number, row.as_slice()))
    }
}

/// Read a numeric cell, describing the problem when it is not one.
pub fn numeric_cell(
    row: &[CellValue],
    idx: usize,
    decimal: DecimalSeparator,
) -> Result<f64, String> {
    match row.get(idx) {
        None | Some(CellValue::Null) => Err(format!("column {idx} is empty")),
        Some(cell) => cell
            .as_f64(decimal)
            .ok_or_else(|| format!("column {idx} is not a number: '{cell}'")),
    }
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Whether `path` names a spreadsheet workbook.
pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| WORKBOOK_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read the raw cells of a workbook sheet or a text export, by extension.
pub fn read_raw(path: &Path, layout: &TableLayout) -> Result<RawTable, LoadError> {
    if is_workbook(path) {
        Workbook::open(path)?.sheet(layout.sheet.as_deref())
    } else {
        read_text(path, layout)
    }
}

/// Read a delimited text or instrument export.
pub fn read_text(path: &Path, layout: &TableLayout) -> Result<RawTable, LoadError> {
    let bytes = std::fs::read(path).map_err(|e| LoadError::from_io(path, e))?;
    // Instrument software does not always write UTF-8; keep whatever decodes.
    let text = String::from_utf8_lossy(&bytes);
    parse_text(path, &text, layout)
}

/// Split text into cells. Comment lines are dropped; blank lines are kept as
/// empty rows so header offsets count every line.
pub fn parse_text(path: &Path, text: &str, layout: &TableLayout) -> Result<RawTable, LoadError> {
    let is_comment = |line: &str| {
        layout
            .comment_prefix
            .as_deref()
            .is_some_and(|p| !p.is_empty() && line.trim_start().starts_with(p))
    };
    let delimiter = layout
        .delimiter
        .sniff(text.lines().filter(|l| !is_comment(*l)), layout.decimal);

    let mut rows = Vec::new();
    let mut row_numbers = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if is_comment(line) {
            continue;
        }
        let cells = split_line(path, line, delimiter)?;
        rows.push(cells);
        row_numbers.push(idx + 1);
    }

    Ok(RawTable {
        path: path.to_path_buf(),
        rows,
        row_numbers,
    })
}

fn split_line(path: &Path, line: &str, delimiter: Delimiter) -> Result<Vec<CellValue>, LoadError> {
    let Some(byte) = delimiter.byte() else {
        return Ok(line.split_whitespace().map(text_cell).collect());
    };
    if line.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(byte)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    reader
        .read_record(&mut record)
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(record.iter().map(text_cell).collect())
}

/// Text cells stay text; numeric interpretation happens once the decimal
/// convention is applied.
fn text_cell(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        CellValue::Null
    } else {
        CellValue::String(trimmed.to_string())
    }
}

/// An open spreadsheet workbook.
pub struct Workbook {
    path: PathBuf,
    inner: Sheets<BufReader<File>>,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            return Err(LoadError::FileNotFound(path.to_path_buf()));
        }
        let inner = open_workbook_auto(path).map_err(|e| LoadError::Spreadsheet {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Workbook {
            path: path.to_path_buf(),
            inner,
        })
    }

    /// Sheet names in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.inner.sheet_names()
    }

    /// Read one sheet (the first one when `name` is `None`). Cell positions
    /// are absolute: leading empty rows and columns are kept so header
    /// offsets match what a spreadsheet program shows.
    pub fn sheet(&mut self, name: Option<&str>) -> Result<RawTable, LoadError> {
        let names = self.sheet_names();
        let sheet = match name {
            Some(wanted) => names
                .iter()
                .find(|n| n.as_str() == wanted)
                .cloned()
                .ok_or_else(|| LoadError::SheetNotFound {
                    path: self.path.clone(),
                    sheet: wanted.to_string(),
                })?,
            None => names
                .first()
                .cloned()
                .ok_or_else(|| LoadError::EmptyWorkbook(self.path.clone()))?,
        };

        let range = self
            .inner
            .worksheet_range(&sheet)
            .map_err(|e| LoadError::Spreadsheet {
                path: self.path.clone(),
                message: format!("sheet '{sheet}': {e}"),
            })?;

        let (row0, col0) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row0];
        for row in range.rows() {
            let mut cells = vec![CellValue::Null; col0];
            cells.extend(row.iter().map(spreadsheet_cell));
            rows.push(cells);
        }
        let row_numbers = (1..=rows.len()).collect();

        Ok(RawTable {
            path: self.path.clone(),
            rows,
            row_numbers,
        })
    }
}

fn spreadsheet_cell(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Integer(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) => text_cell(s),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Float(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(_) | Data::Empty => CellValue::Null,
    }
}
