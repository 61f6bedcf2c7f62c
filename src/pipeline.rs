//! Runs one job: load → aggregate / resample → series → files.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use plotters::style::RGBColor;

use crate::analysis::aggregate::{aggregate, sort_regimes, write_summary, Aggregate};
use crate::analysis::diffraction::{label_peaks, stack, LabelSide};
use crate::analysis::resample::{average_curves, AveragedCurve};
use crate::analysis::smoothing::smooth_region;
use crate::analysis::tensile::preprocess;
use crate::config::{
    Config, CurveSource, CurvesJob, DiffractionJob, GroupBy, Job, JobKind, MeasurementSource,
    PanelsJob, Preset, PropertyAxis, PropertyJob,
};
use crate::data::curve::{load_curve, load_workbook_curves, CurveLayout};
use crate::data::filter::{filter_from_lists, filtered_indices};
use crate::data::loader::load_dataset;
use crate::data::measurement::{load_measurements, measurements_from_inline};
use crate::data::model::{Curve, CurveSet, Measurement};
use crate::data::table::LoadReport;
use crate::regime::RegimeTable;
use crate::render::color::ColorMap;
use crate::render::options::{
    Annotation, ChartOptions, DataPoint, Marker, Offset, Series, VLine,
};
use crate::render::{render_grid_to_files, render_to_files};

/// Horizontal shift, in degrees, of a peak label placed left or right.
const LABEL_SHIFT: f64 = 0.3;

/// Everything needed to draw a job, before any file is written.
#[derive(Debug, Clone)]
pub struct PreparedChart {
    pub series: Vec<Series>,
    pub chart: ChartOptions,
    pub report: LoadReport,
    /// Per-regime aggregates to export next to the chart.
    pub summary: Option<Vec<(String, Aggregate)>>,
    /// Sub-charts of a multi-panel figure; `chart` then describes the canvas.
    pub panels: Vec<PreparedChart>,
    pub columns: usize,
}

impl PreparedChart {
    fn single(series: Vec<Series>, chart: ChartOptions, report: LoadReport) -> Self {
        PreparedChart {
            series,
            chart,
            report,
            summary: None,
            panels: Vec::new(),
            columns: 1,
        }
    }
}

/// Result of a finished job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub outputs: Vec<PathBuf>,
    pub summary: Option<PathBuf>,
    pub report: LoadReport,
}

/// Run every job (or only those named in `only`). A failing job is logged
/// and the rest still run.
pub fn run_all(config: &Config, only: &[String]) -> Vec<(String, Result<JobOutcome>)> {
    for name in only {
        if !config.jobs.iter().any(|j| &j.name == name) {
            warn!("no job named '{name}'");
        }
    }
    config
        .jobs
        .iter()
        .filter(|job| only.is_empty() || only.contains(&job.name))
        .map(|job| {
            info!("job '{}' ({})", job.name, job.kind.label());
            let result = run_job(job, config);
            match &result {
                Ok(outcome) => info!(
                    "job '{}' done: {} file(s), {} row(s) skipped",
                    job.name,
                    outcome.outputs.len(),
                    outcome.report.skipped.len()
                ),
                Err(e) => error!("job '{}' failed: {e:#}", job.name),
            }
            (job.name.clone(), result)
        })
        .collect()
}

/// Prepare, render and save one job.
pub fn run_job(job: &Job, config: &Config) -> Result<JobOutcome> {
    let prepared = prepare_job(job, &config.regimes)?;
    let base = config.output_base(job);

    let summary = match &prepared.summary {
        Some(aggregates) => Some(export_summary(&base, "", aggregates, &config.regimes)?),
        None => None,
    };
    for (i, panel) in prepared.panels.iter().enumerate() {
        if let Some(aggregates) = &panel.summary {
            let suffix = format!("-panel{}", i + 1);
            export_summary(&base, &suffix, aggregates, &config.regimes)?;
        }
    }

    let outputs = if prepared.panels.is_empty() {
        render_to_files(&prepared.series, &prepared.chart, &base)
    } else {
        let panels: Vec<(&[Series], &ChartOptions)> = prepared
            .panels
            .iter()
            .map(|p| (p.series.as_slice(), &p.chart))
            .collect();
        render_grid_to_files(&panels, prepared.columns, &prepared.chart, &base)
    }
    .with_context(|| format!("rendering job '{}'", job.name))?;

    Ok(JobOutcome {
        outputs,
        summary,
        report: prepared.report,
    })
}

/// Load and process a job's data into plot series.
pub fn prepare_job(job: &Job, regimes: &RegimeTable) -> Result<PreparedChart> {
    match &job.kind {
        JobKind::Property(p) => prepare_property(job, p, regimes),
        JobKind::Curves(c) => prepare_curves(job, c, regimes),
        JobKind::Diffraction(d) => prepare_diffraction(job, d),
        JobKind::Panels(p) => prepare_panels(job, p, regimes),
    }
}

/// `<base><suffix>-summary.csv`.
fn export_summary(
    base: &Path,
    suffix: &str,
    aggregates: &[(String, Aggregate)],
    regimes: &RegimeTable,
) -> Result<PathBuf> {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    name.push("-summary.csv");
    let path = base.with_file_name(name);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    write_summary(file, aggregates, regimes)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("saved {}", path.display());
    Ok(path)
}

fn warn_unknown<'a>(labels: impl IntoIterator<Item = &'a str>, regimes: &RegimeTable) {
    for label in labels {
        if regimes.get(label).is_none() {
            warn!("regime '{label}' is not in the regime table");
        }
    }
}

// ---------------------------------------------------------------------------
// Property charts
// ---------------------------------------------------------------------------

fn load_source(source: &MeasurementSource, job: &Job) -> Result<(Vec<Measurement>, LoadReport)> {
    match source {
        MeasurementSource::File { file, layout } => {
            let loaded = load_measurements(file, layout)
                .with_context(|| format!("loading measurements for job '{}'", job.name))?;
            Ok((loaded.data, loaded.report))
        }
        MeasurementSource::Inline { inline } => {
            let data = measurements_from_inline(inline);
            let report = LoadReport {
                parsed: data.len(),
                ..LoadReport::default()
            };
            Ok((data, report))
        }
    }
}

fn prepare_property(job: &Job, p: &PropertyJob, regimes: &RegimeTable) -> Result<PreparedChart> {
    let (measurements, mut report) = load_source(&p.source, job)?;
    let aggregates = aggregate(&measurements, p.order, regimes);
    warn_unknown(aggregates.iter().map(|(label, _)| label.as_str()), regimes);

    let mut axes = AxisContext::default();
    if let Some(x_source) = &p.x_source {
        let (xs, x_report) = load_source(x_source, job)?;
        report.merge(x_report);
        axes.measured = aggregate(&xs, p.order, regimes).into_iter().collect();
    }

    let mut series = property_series(&aggregates, p, regimes, &job.colors, &mut axes)?;

    if let Some(secondary) = &p.secondary {
        let (values, sec_report) = load_source(&secondary.source, job)?;
        report.merge(sec_report);
        let sec_aggregates = aggregate(&values, p.order, regimes);
        let sec_job = PropertyJob {
            series_name: secondary.series_name.clone(),
            label_points: false,
            ..p.clone()
        };
        let mut extra =
            property_series(&sec_aggregates, &sec_job, regimes, &job.colors, &mut axes)?;
        let offset = series.len();
        for (i, s) in extra.iter_mut().enumerate() {
            s.secondary = true;
            s.marker = Marker::nth(offset + i);
            if p.group_by != GroupBy::None {
                if let Some(suffix) = &secondary.series_name {
                    s.name = format!("{} ({suffix})", s.name);
                }
            }
        }
        series.extend(extra);
        // One palette across both axes.
        let color_map = ColorMap::new(series.iter().map(|s| s.name.as_str()), &job.colors)?;
        for s in &mut series {
            s.color = color_map.color_for(&s.name);
        }
    }

    let mut chart = job.chart.clone();
    if chart.x_label.is_empty() {
        chart.x_label = axis_title(p.x_axis).to_string();
    }
    let categories = axes.categories;
    if !categories.is_empty() && chart.x_range.is_none() {
        chart.x_range = Some((-0.5, categories.len() as f64 - 0.5));
    }
    chart.x_categories = categories;

    Ok(PreparedChart {
        summary: p.export_summary.then_some(aggregates),
        ..PreparedChart::single(series, chart, report)
    })
}

fn axis_title(axis: PropertyAxis) -> &'static str {
    match axis {
        PropertyAxis::Regime => "Regime",
        PropertyAxis::EnergyDensity => "Energy density, J/mm³",
        PropertyAxis::Speed => "Scan speed, mm/s",
        PropertyAxis::Power => "Laser power, W",
        PropertyAxis::Hatch => "Hatch distance, µm",
        PropertyAxis::Measured => "",
    }
}

/// X positions shared by every series of a property chart.
#[derive(Debug, Default)]
pub struct AxisContext {
    /// Regime slots on a categorical axis, in x order. Series drawn later
    /// reuse the slots of earlier ones.
    pub categories: Vec<String>,
    /// Per-regime x measurement for a `measured` axis.
    pub measured: BTreeMap<String, Aggregate>,
}

/// Turn aggregates into point series, one per group.
pub fn property_series(
    aggregates: &[(String, Aggregate)],
    p: &PropertyJob,
    regimes: &RegimeTable,
    colors: &BTreeMap<String, String>,
    axes: &mut AxisContext,
) -> Result<Vec<Series>> {
    let default_name = p.series_name.clone().unwrap_or_default();
    let mut groups: Vec<(String, Vec<DataPoint>)> = Vec::new();

    for (label, agg) in aggregates {
        let regime = regimes.get(label);
        let mut x_error = None;
        let x = match (p.x_axis, regime) {
            (PropertyAxis::Regime, _) => {
                match axes.categories.iter().position(|c| c == label) {
                    Some(i) => i as f64,
                    None => {
                        axes.categories.push(label.clone());
                        (axes.categories.len() - 1) as f64
                    }
                }
            }
            (PropertyAxis::Measured, _) => match axes.measured.get(label) {
                Some(m) => {
                    x_error = Some(m.std_dev);
                    m.mean
                }
                None => {
                    warn!("skipping '{label}': no x measurement");
                    continue;
                }
            },
            (PropertyAxis::EnergyDensity, Some(r)) => r.energy_density(),
            (PropertyAxis::Speed, Some(r)) => r.speed_mm_s,
            (PropertyAxis::Power, Some(r)) => r.power_w,
            (PropertyAxis::Hatch, Some(r)) => r.hatch_um,
            (_, None) => {
                warn!("skipping '{label}': no parameters for the x axis");
                continue;
            }
        };
        let group = match (p.group_by, regime) {
            (GroupBy::None, _) => default_name.clone(),
            (GroupBy::Hatch, Some(r)) => format!("h = {} µm", r.hatch_um),
            (GroupBy::Strategy, Some(r)) => r.strategy.to_string(),
            (GroupBy::Power, Some(r)) => format!("P = {} W", r.power_w),
            (_, None) => "other".to_string(),
        };
        let point = DataPoint {
            x,
            y: agg.mean,
            error: Some(agg.std_dev),
            x_error,
            label: p.label_points.then(|| label.clone()),
        };
        match groups.iter_mut().find(|(name, _)| *name == group) {
            Some((_, points)) => points.push(point),
            None => groups.push((group, vec![point])),
        }
    }

    let color_map = ColorMap::new(groups.iter().map(|(name, _)| name.as_str()), colors)?;
    let series = groups
        .into_iter()
        .enumerate()
        .map(|(i, (name, mut points))| {
            if p.x_axis != PropertyAxis::Regime {
                points.sort_by(|a, b| a.x.total_cmp(&b.x));
            }
            let color = color_map.color_for(&name);
            let mut s = Series::points(name, color, points);
            s.marker = Marker::nth(i);
            s.connect = p.connect;
            s
        })
        .collect();
    Ok(series)
}

// ---------------------------------------------------------------------------
// Curve charts
// ---------------------------------------------------------------------------

fn prepare_curves(job: &Job, c: &CurvesJob, regimes: &RegimeTable) -> Result<PreparedChart> {
    let (mut curves, report) = load_curve_sources(c)
        .with_context(|| format!("loading curves for job '{}'", job.name))?;
    if curves.is_empty() {
        anyhow::bail!("job '{}' selected no curves", job.name);
    }

    if let Some(opts) = c.tensile_options() {
        curves = curves
            .iter()
            .map(|curve| preprocess(curve, c.cutoffs.get(&curve.regime).copied(), &opts))
            .collect();
    }

    let set = CurveSet::from_curves(curves);
    let indices: Vec<usize> = (0..set.len()).collect();
    let mut groups = set.group_by_regime(&indices);
    sort_regimes(&mut groups, c.order, regimes, |g| g.0.as_str());
    warn_unknown(groups.iter().map(|(label, _)| label.as_str()), regimes);

    let averaged: Vec<(String, Vec<&Curve>, AveragedCurve)> = groups
        .into_iter()
        .filter_map(|(regime, members)| match average_curves(&members, &c.resample) {
            Some(avg) => Some((regime, members, avg)),
            None => {
                warn!("regime '{regime}': replicates do not overlap, skipped");
                None
            }
        })
        .collect();

    let color_map = ColorMap::new(averaged.iter().map(|(r, _, _)| r.as_str()), &job.colors)?;
    let mut series = Vec::new();
    for (regime, members, avg) in &averaged {
        let color = color_map.color_for(regime);
        if c.show_replicates && members.len() > 1 {
            for member in members {
                let mut s = Series::line(
                    "",
                    faded(color),
                    member.x.clone(),
                    member.y.clone(),
                    None,
                );
                s.line_width = 1;
                series.push(s);
            }
        }
        let (y, band) = smooth_average(avg, c);
        let name = c.legend.get(regime).cloned().unwrap_or_else(|| regime.clone());
        debug!("{regime}: {} replicate(s), {} grid points", avg.replicates, y.len());
        series.push(Series::line(
            name,
            color,
            avg.curve.x.clone(),
            y,
            band.filter(|_| c.show_band),
        ));
    }

    let mut chart = job.chart.clone();
    if let Some(preset) = c.preset {
        let (x_label, y_label) = preset_titles(preset);
        if chart.x_label.is_empty() {
            chart.x_label = x_label.to_string();
        }
        if chart.y_label.is_empty() {
            chart.y_label = y_label.to_string();
        }
    }

    Ok(PreparedChart::single(series, chart, report))
}

fn load_curve_sources(c: &CurvesJob) -> Result<(Vec<Curve>, LoadReport)> {
    let mut report = LoadReport::default();
    let mut curves: Vec<Curve> = Vec::new();
    let mut replicates: BTreeMap<String, u32> = BTreeMap::new();
    let default_layout = c.default_layout();

    for source in &c.sources {
        match source {
            CurveSource::File { file, regime, layout } => {
                let layout = layout.as_ref().unwrap_or(&default_layout);
                let loaded = load_curve(file, layout, regime)?;
                report.merge(loaded.report);
                let n = replicates.entry(regime.clone()).or_insert(0);
                *n += 1;
                curves.push(loaded.data.with_replicate(*n));
            }
            CurveSource::Workbook { workbook, sheets, layout } => {
                let layout = layout.as_ref().unwrap_or(&default_layout);
                let loaded = load_workbook_curves(workbook, sheets, layout)?;
                report.merge(loaded.report);
                for curve in loaded.data {
                    let n = replicates.entry(curve.regime.clone()).or_insert(0);
                    *n += 1;
                    curves.push(curve.with_replicate(*n));
                }
            }
            CurveSource::Dataset {
                dataset,
                columns,
                filter,
            } => {
                let set = load_dataset(dataset, columns)?;
                let selected = filtered_indices(&set, &filter_from_lists(filter));
                info!(
                    "{}: {} of {} curves selected",
                    dataset.display(),
                    selected.len(),
                    set.len()
                );
                report.parsed += selected.len();
                curves.extend(selected.into_iter().map(|i| set.curves[i].clone()));
            }
        }
    }
    Ok((curves, report))
}

/// Averaged y and band, smoothed when the job asks for it.
fn smooth_average(avg: &AveragedCurve, c: &CurvesJob) -> (Vec<f64>, Option<Vec<f64>>) {
    let x = &avg.curve.x;
    match &c.smoothing {
        Some(smoother) => {
            let region = c.smoothing_region.as_ref();
            let y = smooth_region(x, &avg.curve.y, smoother, region);
            let band = avg
                .std_dev
                .as_ref()
                .map(|sd| smooth_region(x, sd, smoother, region));
            (y, band)
        }
        None => (avg.curve.y.clone(), avg.std_dev.clone()),
    }
}

fn preset_titles(preset: Preset) -> (&'static str, &'static str) {
    match preset {
        Preset::Tensile => ("Strain, %", "Stress, MPa"),
        Preset::Dsc => ("Temperature, °C", "Heat flow, mW/mg"),
        Preset::Xrd => ("2θ, °", "Intensity, a.u."),
    }
}

/// Mix a colour 60 % toward white.
fn faded(c: RGBColor) -> RGBColor {
    let mix = |v: u8| (v as f64 + (255.0 - v as f64) * 0.6).round() as u8;
    RGBColor(mix(c.0), mix(c.1), mix(c.2))
}

// ---------------------------------------------------------------------------
// Diffraction charts
// ---------------------------------------------------------------------------

fn prepare_diffraction(job: &Job, d: &DiffractionJob) -> Result<PreparedChart> {
    let mut report = LoadReport::default();
    let mut patterns = Vec::with_capacity(d.patterns.len());
    for pattern in &d.patterns {
        let layout = pattern.layout.clone().unwrap_or_else(CurveLayout::xrd);
        let loaded = load_curve(&pattern.file, &layout, &pattern.label)
            .with_context(|| {
                format!("loading pattern '{}' for job '{}'", pattern.label, job.name)
            })?;
        report.merge(loaded.report);
        patterns.push(loaded.data);
    }

    let stacked = stack(&patterns, &d.stack);
    let labels = label_peaks(&stacked, &d.peaks, &d.stack);
    debug!("job '{}': {} peak label(s)", job.name, labels.len());

    let color_map = ColorMap::new(stacked.iter().map(|p| p.regime.as_str()), &job.colors)?;
    let series = stacked
        .into_iter()
        .map(|p| {
            let color = color_map.color_for(&p.regime);
            let mut s = Series::line(p.regime, color, p.x, p.y, None);
            s.line_width = 1;
            s
        })
        .collect();

    let mut chart = job.chart.clone();
    if chart.x_label.is_empty() {
        chart.x_label = preset_titles(Preset::Xrd).0.to_string();
    }
    if chart.y_label.is_empty() {
        chart.y_label = preset_titles(Preset::Xrd).1.to_string();
    }
    chart.annotations.extend(labels.into_iter().map(|label| {
        let dx = match label.side {
            LabelSide::Left => -LABEL_SHIFT,
            LabelSide::Center => 0.0,
            LabelSide::Right => LABEL_SHIFT,
        };
        Annotation {
            x: label.x,
            y: label.y,
            text: label.text,
            offset: Offset::Data(dx, label.offset),
            leader: false,
            color: None,
        }
    }));
    if d.peak_lines {
        chart.vlines.extend(d.peaks.iter().map(|peak| VLine {
            x: peak.position,
            color: Some("#808080".to_string()),
            dashed: true,
            label: None,
        }));
    }

    Ok(PreparedChart::single(series, chart, report))
}

// ---------------------------------------------------------------------------
// Multi-panel figures
// ---------------------------------------------------------------------------

fn prepare_panels(job: &Job, p: &PanelsJob, regimes: &RegimeTable) -> Result<PreparedChart> {
    let mut report = LoadReport::default();
    let mut panels = Vec::with_capacity(p.panels.len());
    for (i, panel) in p.panels.iter().enumerate() {
        let mut chart = panel.chart.clone();
        chart.dpi = job.chart.dpi;
        let sub = Job {
            name: format!("{}/{}", job.name, i + 1),
            output: None,
            chart,
            colors: panel.colors.clone(),
            kind: panel.kind.clone(),
        };
        let prepared = prepare_job(&sub, regimes)?;
        report.merge(prepared.report.clone());
        panels.push(prepared);
    }
    Ok(PreparedChart {
        panels,
        columns: p.columns(),
        ..PreparedChart::single(Vec::new(), job.chart.clone(), report)
    })
}
