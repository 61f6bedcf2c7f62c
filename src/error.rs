//! Error types shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal load failures. Malformed rows never produce one of these; they are
/// skipped and recorded in a [`LoadReport`](crate::data::table::LoadReport).
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("sheet '{sheet}' not found in {}", path.display())]
    SheetNotFound { path: PathBuf, sheet: String },

    #[error("workbook {} has no sheets", .0.display())]
    EmptyWorkbook(PathBuf),

    #[error("header marker '{marker}' not found in {}", path.display())]
    MarkerNotFound { path: PathBuf, marker: String },

    #[error("header row {row} is past the end of {} ({rows} rows)", path.display())]
    HeaderOutOfRange {
        path: PathBuf,
        row: usize,
        rows: usize,
    },

    #[error("column '{column}' not found in {}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("column '{column}' in {} is referenced by name but the layout has no header row", path.display())]
    NoHeaderForName { path: PathBuf, column: String },

    #[error("failed to read spreadsheet {}: {message}", path.display())]
    Spreadsheet { path: PathBuf, message: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl LoadError {
    /// Map an open/read failure, keeping "not found" distinct from the rest.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            LoadError::FileNotFound(path)
        } else {
            LoadError::Io { path, source }
        }
    }
}

/// Errors that can occur while drawing or writing a chart.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to create drawing area: {0}")]
    DrawingArea(String),

    #[error("failed to configure chart: {0}")]
    ChartConfig(String),

    #[error("failed to draw chart elements: {0}")]
    Drawing(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("could not save {} or any fallback: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Problems with a job file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read job file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse job file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("regime '{0}': {1}")]
    InvalidRegime(String, String),

    #[error("duplicate job name '{0}'")]
    DuplicateJob(String),

    #[error("job '{0}': {1}")]
    InvalidJob(String, String),

    #[error("invalid color '{0}'")]
    InvalidColor(String),
}
