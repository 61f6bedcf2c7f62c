//! Job files: one JSON document describing regimes and the charts to draw.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::aggregate::RegimeOrder;
use crate::analysis::diffraction::{PhasePeak, StackOptions};
use crate::analysis::resample::GridPolicy;
use crate::analysis::smoothing::{SmoothRegion, Smoother};
use crate::analysis::tensile::TensileOptions;
use crate::data::curve::CurveLayout;
use crate::data::loader::DatasetColumns;
use crate::data::measurement::MeasurementLayout;
use crate::error::ConfigError;
use crate::regime::RegimeTable;
use crate::render::options::ChartOptions;

/// Top level of a job file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFile {
    /// Merged over [`RegimeTable::builtin`].
    pub regimes: RegimeTable,
    /// Where charts go; relative to the job file.
    pub output_dir: Option<PathBuf>,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    /// Output path without extension; defaults to `name`.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub chart: ChartOptions,
    /// Series colours by regime or group name, `#rrggbb`.
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
    #[serde(flatten)]
    pub kind: JobKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    Property(PropertyJob),
    Curves(CurvesJob),
    Diffraction(DiffractionJob),
    Panels(PanelsJob),
}

impl JobKind {
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Property(_) => "property",
            JobKind::Curves(_) => "curves",
            JobKind::Diffraction(_) => "diffraction",
            JobKind::Panels(_) => "panels",
        }
    }
}

// ---------------------------------------------------------------------------
// Property charts: one value per replicate, aggregated per regime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementSource {
    File {
        file: PathBuf,
        #[serde(default)]
        layout: MeasurementLayout,
    },
    Inline {
        inline: BTreeMap<String, Vec<f64>>,
    },
}

/// Regime parameter on the x axis of a property chart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyAxis {
    /// Categorical, one slot per regime.
    Regime,
    #[default]
    EnergyDensity,
    Speed,
    Power,
    Hatch,
    /// Per-regime mean of `x_source`, with its deviation as a horizontal
    /// error bar.
    Measured,
}

/// How points are split into series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    None,
    Hatch,
    Strategy,
    Power,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyJob {
    pub source: MeasurementSource,
    #[serde(default)]
    pub x_axis: PropertyAxis,
    #[serde(default)]
    pub group_by: GroupBy,
    #[serde(default)]
    pub order: RegimeOrder,
    /// Write the regime label next to each point.
    #[serde(default)]
    pub label_points: bool,
    /// Join the points of a series with a line.
    #[serde(default = "default_true")]
    pub connect: bool,
    /// Also write `<output>-summary.csv`.
    #[serde(default)]
    pub export_summary: bool,
    /// Series name when `group_by` is `none`.
    #[serde(default)]
    pub series_name: Option<String>,
    /// Measurement plotted on the x axis when `x_axis` is `measured`.
    #[serde(default)]
    pub x_source: Option<MeasurementSource>,
    /// A second property against the right-hand y axis.
    #[serde(default)]
    pub secondary: Option<SecondaryProperty>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryProperty {
    pub source: MeasurementSource,
    /// Appended to group names, or the whole name when ungrouped.
    #[serde(default)]
    pub series_name: Option<String>,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Curve charts: replicate traces averaged per regime
// ---------------------------------------------------------------------------

/// Instrument presets fixing the table layout and preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Tensile,
    Dsc,
    Xrd,
}

impl Preset {
    pub fn layout(self) -> CurveLayout {
        match self {
            Preset::Tensile => CurveLayout::tensile(),
            Preset::Dsc => CurveLayout::dsc(),
            Preset::Xrd => CurveLayout::xrd(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CurveSource {
    /// One text export or sheet holding one replicate.
    File {
        file: PathBuf,
        regime: String,
        #[serde(default)]
        layout: Option<CurveLayout>,
    },
    /// A workbook where each listed sheet is a replicate: sheet → regime.
    Workbook {
        workbook: PathBuf,
        sheets: BTreeMap<String, String>,
        #[serde(default)]
        layout: Option<CurveLayout>,
    },
    /// Columnar dataset (`.parquet` / `.json` / `.csv`), one row per curve.
    Dataset {
        dataset: PathBuf,
        #[serde(default)]
        columns: DatasetColumns,
        /// Metadata column → accepted values; `regime` matches curve labels.
        #[serde(default)]
        filter: BTreeMap<String, Vec<String>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurvesJob {
    pub sources: Vec<CurveSource>,
    #[serde(default)]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub resample: GridPolicy,
    /// Applied to each averaged curve (and its band).
    #[serde(default)]
    pub smoothing: Option<Smoother>,
    #[serde(default)]
    pub smoothing_region: Option<SmoothRegion>,
    /// Stress–strain cleanup per replicate; on by default for the tensile preset.
    #[serde(default)]
    pub tensile: Option<TensileOptions>,
    /// Manual cutoff strain per regime.
    #[serde(default)]
    pub cutoffs: BTreeMap<String, f64>,
    #[serde(default = "default_true")]
    pub show_band: bool,
    /// Draw the replicates as thin lines under the mean.
    #[serde(default)]
    pub show_replicates: bool,
    #[serde(default)]
    pub order: RegimeOrder,
    /// Legend text per regime; defaults to the regime label.
    #[serde(default)]
    pub legend: BTreeMap<String, String>,
}

impl CurvesJob {
    /// Explicit tensile options, or the defaults when the tensile preset is on.
    pub fn tensile_options(&self) -> Option<TensileOptions> {
        match (&self.tensile, self.preset) {
            (Some(opts), _) => Some(opts.clone()),
            (None, Some(Preset::Tensile)) => Some(TensileOptions::default()),
            _ => None,
        }
    }

    /// Layout for a source without its own.
    pub fn default_layout(&self) -> CurveLayout {
        self.preset.map(Preset::layout).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Diffraction charts: stacked, normalised patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub file: PathBuf,
    pub label: String,
    #[serde(default)]
    pub layout: Option<CurveLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffractionJob {
    /// Bottom to top.
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub stack: StackOptions,
    #[serde(default)]
    pub peaks: Vec<PhasePeak>,
    /// Dashed guide lines at the nominal peak positions.
    #[serde(default)]
    pub peak_lines: bool,
}

// ---------------------------------------------------------------------------
// Multi-panel figures
// ---------------------------------------------------------------------------

/// One chart of a multi-panel figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    #[serde(default)]
    pub chart: ChartOptions,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
    #[serde(flatten)]
    pub kind: JobKind,
}

/// Several charts on one canvas. The job's own `chart` sets the canvas size,
/// DPI, formats and overall title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelsJob {
    pub panels: Vec<Panel>,
    /// Panels per row; all in one row when absent.
    #[serde(default)]
    pub columns: Option<usize>,
}

impl PanelsJob {
    pub fn columns(&self) -> usize {
        self.columns.unwrap_or(self.panels.len()).max(1)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// A validated job file with paths made absolute.
#[derive(Debug, Clone)]
pub struct Config {
    pub regimes: RegimeTable,
    pub output_dir: PathBuf,
    pub jobs: Vec<Job>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: JobFile = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Config::from_job_file(file, base)
    }

    /// Validate and resolve relative paths against `base`.
    pub fn from_job_file(file: JobFile, base: &Path) -> Result<Self, ConfigError> {
        file.regimes.validate()?;
        let mut regimes = RegimeTable::builtin();
        regimes.merge(file.regimes);

        let mut seen = BTreeSet::new();
        for job in &file.jobs {
            if !seen.insert(job.name.as_str()) {
                return Err(ConfigError::DuplicateJob(job.name.clone()));
            }
            for hex in job.colors.values() {
                crate::render::color::parse_hex(hex)?;
            }
            validate_kind(&job.name, &job.kind)?;
        }

        let output_dir = resolve(base, &file.output_dir.unwrap_or_default());
        let jobs = file
            .jobs
            .into_iter()
            .map(|mut job| {
                resolve_job(&mut job, base);
                job
            })
            .collect();

        Ok(Config {
            regimes,
            output_dir,
            jobs,
        })
    }

    /// Output path of `job` without extension.
    pub fn output_base(&self, job: &Job) -> PathBuf {
        let name = job
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(&job.name));
        resolve(&self.output_dir, &name)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn validate_kind(name: &str, kind: &JobKind) -> Result<(), ConfigError> {
    let invalid = |why: &str| Err(ConfigError::InvalidJob(name.to_string(), why.to_string()));
    match kind {
        JobKind::Property(p) if p.x_axis == PropertyAxis::Measured && p.x_source.is_none() => {
            invalid("x_axis 'measured' needs an x_source")
        }
        JobKind::Panels(panels) => {
            if panels.panels.is_empty() {
                return invalid("no panels");
            }
            for panel in &panels.panels {
                if matches!(panel.kind, JobKind::Panels(_)) {
                    return invalid("panels cannot be nested");
                }
                for hex in panel.colors.values() {
                    crate::render::color::parse_hex(hex)?;
                }
                validate_kind(name, &panel.kind)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn resolve_job(job: &mut Job, base: &Path) {
    resolve_kind(&mut job.kind, base);
}

fn resolve_source(source: &mut MeasurementSource, base: &Path) {
    if let MeasurementSource::File { file, .. } = source {
        *file = resolve(base, file);
    }
}

fn resolve_kind(kind: &mut JobKind, base: &Path) {
    match kind {
        JobKind::Property(p) => {
            resolve_source(&mut p.source, base);
            if let Some(x) = &mut p.x_source {
                resolve_source(x, base);
            }
            if let Some(secondary) = &mut p.secondary {
                resolve_source(&mut secondary.source, base);
            }
        }
        JobKind::Curves(c) => {
            for source in &mut c.sources {
                let path = match source {
                    CurveSource::File { file, .. } => file,
                    CurveSource::Workbook { workbook, .. } => workbook,
                    CurveSource::Dataset { dataset, .. } => dataset,
                };
                *path = resolve(base, path);
            }
        }
        JobKind::Diffraction(d) => {
            for pattern in &mut d.patterns {
                pattern.file = resolve(base, &pattern.file);
            }
        }
        JobKind::Panels(panels) => {
            for panel in &mut panels.panels {
                resolve_kind(&mut panel.kind, base);
            }
        }
    }
}
