use std::io::Cursor;
use std::ops::Range;

use log::debug;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::element::{DynElement, IntoDynElement};
use plotters::prelude::*;
use plotters::series::DashedLineSeries;

use super::color::parse_hex;
use super::options::{
    Annotation, ChartOptions, DataPoint, ImageFormat, Marker, Offset, Series, SeriesData,
};
use crate::error::RenderError;

type Chart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;
type BackendCoord = (i32, i32);
type PixelArea = (Range<i32>, Range<i32>);
type Result<T> = core::result::Result<T, RenderError>;

const PAD_FRACTION: f64 = 0.05;
const MARKER_SIZE: i32 = 5;
const BAND_ALPHA: f64 = 0.2;

fn drawing<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Drawing(e.to_string())
}

fn area_error<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::DrawingArea(e.to_string())
}

/// Draw `series` with `opts` and return the encoded image bytes.
pub fn render(series: &[Series], opts: &ChartOptions, format: ImageFormat) -> Result<Vec<u8>> {
    render_grid(&[(series, opts)], 1, opts, format)
}

/// Draw several charts on one canvas, `columns` to a row, filled row by row.
/// Canvas size and the overall title come from `figure`.
pub fn render_grid(
    panels: &[(&[Series], &ChartOptions)],
    columns: usize,
    figure: &ChartOptions,
    format: ImageFormat,
) -> Result<Vec<u8>> {
    let (width, height) = figure.pixel_size();
    match format {
        ImageFormat::Png => {
            let mut buffer = vec![255u8; width as usize * height as usize * 3];
            {
                let root =
                    BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
                draw_figure(&root, panels, columns, figure)?;
            }
            encode_png(buffer, width, height)
        }
        ImageFormat::Svg => {
            let mut svg = String::new();
            {
                let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
                draw_figure(&root, panels, columns, figure)?;
            }
            Ok(svg.into_bytes())
        }
    }
}

fn encode_png(buffer: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>> {
    let img = image::RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| RenderError::Encode("pixel buffer does not match image size".to_string()))?;
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Rows and columns for `n` panels with at most `columns` per row.
pub fn grid_shape(n: usize, columns: usize) -> (usize, usize) {
    let cols = columns.clamp(1, n.max(1));
    (n.div_ceil(cols).max(1), cols)
}

fn draw_figure<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    panels: &[(&[Series], &ChartOptions)],
    columns: usize,
    figure: &ChartOptions,
) -> Result<()> {
    root.fill(&WHITE).map_err(area_error)?;

    if let [(series, opts)] = panels {
        draw_panel(root, root, series, opts)?;
    } else {
        let body = match &figure.title {
            Some(title) => {
                let font_px = figure.font_px(figure.font_size) * 1.4;
                root.titled(title, (figure.font_family.as_str(), font_px))
                    .map_err(area_error)?
            }
            None => root.clone(),
        };
        let areas = body.split_evenly(grid_shape(panels.len(), columns));
        for (area, (series, opts)) in areas.iter().zip(panels) {
            draw_panel(root, area, series, opts)?;
        }
    }

    root.present().map_err(drawing)?;
    Ok(())
}

/// One chart inside `area`. Free text goes straight onto `root` in canvas
/// pixels.
fn draw_panel<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    area: &DrawingArea<DB, Shift>,
    series: &[Series],
    opts: &ChartOptions,
) -> Result<()> {
    let (x_range, y_range) = axis_ranges(series, opts)
        .ok_or_else(|| RenderError::InvalidData("no finite data to plot".to_string()))?;
    let y2_range = secondary_range(series, opts);

    let font_px = opts.font_px(opts.font_size);
    let family = opts.font_family.as_str();
    let label_font: TextStyle = (family, font_px).into_font().into();
    let y_area = if opts.hide_y_labels { 2.0 } else { 5.0 };

    let mut builder = ChartBuilder::on(area);
    builder
        .margin((font_px * 1.5) as u32)
        .x_label_area_size((font_px * 3.0) as u32)
        .y_label_area_size((font_px * y_area) as u32);
    if y2_range.is_some() {
        builder.right_y_label_area_size((font_px * 5.0) as u32);
    }
    if let Some(title) = &opts.title {
        builder.caption(title, (family, font_px * 1.3));
    }
    let mut chart = builder
        .build_cartesian_2d(x_range.clone(), y_range.clone())
        .map_err(|e| RenderError::ChartConfig(e.to_string()))?;

    let blank = |_: &f64| String::new();
    let category = |v: &f64| category_label(&opts.x_categories, *v);

    let mut mesh = chart.configure_mesh();
    mesh.x_desc(opts.x_label.as_str())
        .y_desc(opts.y_label.as_str())
        .label_style(label_font.clone())
        .axis_desc_style(label_font.clone());
    if !opts.x_categories.is_empty() {
        mesh.x_labels(tick_count(&x_range, 1.0))
            .x_label_formatter(&category);
    } else if let Some(tick) = opts.x_tick {
        mesh.x_labels(tick_count(&x_range, tick));
    }
    if let Some(tick) = opts.y_tick {
        mesh.y_labels(tick_count(&y_range, tick));
    }
    if !opts.grid {
        mesh.disable_mesh();
    }
    if opts.hide_y_labels {
        mesh.y_label_formatter(&blank);
    }
    mesh.draw().map_err(drawing)?;

    let ranges = (x_range, y_range);
    match y2_range {
        Some(y2) => {
            let mut dual = chart.set_secondary_coord(ranges.0.clone(), y2.clone());
            let mut axes = dual.configure_secondary_axes();
            axes.y_desc(opts.y2_label.as_str())
                .label_style(label_font.clone())
                .axis_desc_style(label_font.clone());
            if let Some(tick) = opts.y2_tick {
                axes.y_labels(tick_count(&y2, tick));
            }
            axes.draw().map_err(drawing)?;

            let mapped: Vec<Series> = series
                .iter()
                .map(|s| {
                    if s.secondary {
                        onto_primary(s, &y2, &ranges.1)
                    } else {
                        s.clone()
                    }
                })
                .collect();
            draw_contents(root, &mut *dual, &mapped, opts, &ranges, &label_font)
        }
        None => draw_contents(root, &mut chart, series, opts, &ranges, &label_font),
    }
}

fn draw_contents<'c, DB: DrawingBackend + 'c>(
    root: &DrawingArea<DB, Shift>,
    chart: &mut Chart<'c, DB>,
    series: &[Series],
    opts: &ChartOptions,
    (x_range, y_range): &(Range<f64>, Range<f64>),
    label_font: &TextStyle,
) -> Result<()> {
    let area = chart.plotting_area().get_pixel_range();

    draw_regions(root, chart, opts, x_range, y_range, &area, label_font)?;
    draw_vlines(root, chart, opts, x_range, y_range, &area, label_font)?;
    for s in series {
        draw_series(chart, s, label_font)?;
    }

    if let Some(position) = opts.legend.to_plotters() {
        if series.iter().any(|s| !s.name.is_empty()) {
            chart
                .configure_series_labels()
                .position(position)
                .background_style(WHITE.mix(0.85))
                .border_style(BLACK)
                .label_font(label_font.clone())
                .draw()
                .map_err(drawing)?;
        }
    }

    for annotation in &opts.annotations {
        draw_annotation(root, chart, annotation, x_range, y_range, &area, opts)?;
    }
    if let Some(note) = &opts.note {
        let at = (
            x_range.start + note.at.0 * (x_range.end - x_range.start),
            y_range.start + note.at.1 * (y_range.end - y_range.start),
        );
        let anchor = chart.backend_coord(&at);
        draw_label(root, anchor, &note.text, label_font, opts, &area)?;
    }
    Ok(())
}

/// Text whose box is kept inside `area`.
fn draw_label<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    anchor: BackendCoord,
    text: &str,
    font: &TextStyle,
    opts: &ChartOptions,
    area: &PixelArea,
) -> Result<()> {
    let size = estimate_text(text, opts.font_px(opts.font_size));
    let at = fit_box(anchor, size, area);
    root.draw(&Text::new(text.to_string(), at, font.clone()))
        .map_err(drawing)
}

fn draw_regions<'c, DB: DrawingBackend + 'c>(
    root: &DrawingArea<DB, Shift>,
    chart: &mut Chart<'c, DB>,
    opts: &ChartOptions,
    x_range: &Range<f64>,
    y_range: &Range<f64>,
    area: &PixelArea,
    font: &TextStyle,
) -> Result<()> {
    for region in &opts.regions {
        let xs = clip_span(region.x.unwrap_or((x_range.start, x_range.end)), x_range);
        let ys = clip_span(region.y.unwrap_or((y_range.start, y_range.end)), y_range);
        let (Some((x0, x1)), Some((y0, y1))) = (xs, ys) else {
            debug!("region {:?} x {:?} lies outside the axes", region.label, region.x);
            continue;
        };
        let color = parse_hex(&region.color).map_err(|e| RenderError::InvalidData(e.to_string()))?;
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x0, y0), (x1, y1)],
                color.mix(region.alpha).filled(),
            )))
            .map_err(drawing)?;
        if let Some(label) = &region.label {
            let (px, py) = chart.backend_coord(&(x0, y1));
            draw_label(root, (px + 4, py + 4), label, font, opts, area)?;
        }
    }
    Ok(())
}

fn draw_vlines<'c, DB: DrawingBackend + 'c>(
    root: &DrawingArea<DB, Shift>,
    chart: &mut Chart<'c, DB>,
    opts: &ChartOptions,
    x_range: &Range<f64>,
    y_range: &Range<f64>,
    area: &PixelArea,
    font: &TextStyle,
) -> Result<()> {
    for line in &opts.vlines {
        if clip_span((line.x, line.x), x_range).is_none() {
            debug!("vertical line at x = {} is off the axis, skipped", line.x);
            continue;
        }
        let color = match &line.color {
            Some(hex) => parse_hex(hex).map_err(|e| RenderError::InvalidData(e.to_string()))?,
            None => BLACK,
        };
        let style = color.mix(0.6).stroke_width(1);
        let points = vec![(line.x, y_range.start), (line.x, y_range.end)];
        let drawn = if line.dashed {
            chart.draw_series(DashedLineSeries::new(points, 6, 4, style))
        } else {
            chart.draw_series(LineSeries::new(points, style))
        };
        drawn.map_err(drawing)?;
        if let Some(label) = &line.label {
            let (px, py) = chart.backend_coord(&(line.x, y_range.end));
            draw_label(root, (px + 3, py + 3), label, font, opts, area)?;
        }
    }
    Ok(())
}

fn draw_series<'c, DB: DrawingBackend + 'c>(
    chart: &mut Chart<'c, DB>,
    series: &Series,
    font: &TextStyle,
) -> Result<()> {
    let color = series.color;
    let line_style = color.stroke_width(series.line_width);

    match &series.data {
        SeriesData::Line { x, y, band } => {
            let points: Vec<(f64, f64)> = x
                .iter()
                .copied()
                .zip(y.iter().copied())
                .filter(|(a, b)| a.is_finite() && b.is_finite())
                .collect();
            if let Some(band) = band {
                let outline = band_outline(x, y, band);
                if !outline.is_empty() {
                    chart
                        .draw_series(std::iter::once(Polygon::new(
                            outline,
                            color.mix(BAND_ALPHA).filled(),
                        )))
                        .map_err(drawing)?;
                }
            }
            let anno = if series.dashed {
                chart.draw_series(DashedLineSeries::new(points, 10, 6, line_style))
            } else {
                chart.draw_series(LineSeries::new(points, line_style))
            }
            .map_err(drawing)?;
            if !series.name.is_empty() {
                anno.label(series.name.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line_style));
            }
        }
        SeriesData::Points(data) => {
            let finite: Vec<_> = data
                .iter()
                .filter(|p| p.x.is_finite() && p.y.is_finite())
                .collect();
            let points: Vec<(f64, f64)> = finite.iter().map(|p| (p.x, p.y)).collect();

            chart
                .draw_series(finite.iter().filter_map(|p| {
                    let e = p.error?.abs();
                    Some(ErrorBar::new_vertical(p.x, p.y - e, p.y, p.y + e, line_style, 10))
                }))
                .map_err(drawing)?;
            chart
                .draw_series(finite.iter().filter_map(|p| {
                    let e = p.x_error?.abs();
                    Some(ErrorBar::new_horizontal(p.y, p.x - e, p.x, p.x + e, line_style, 10))
                }))
                .map_err(drawing)?;

            if series.connect {
                let drawn = if series.dashed {
                    chart.draw_series(DashedLineSeries::new(points.clone(), 10, 6, line_style))
                } else {
                    chart.draw_series(LineSeries::new(points.clone(), line_style))
                };
                drawn.map_err(drawing)?;
            }

            let fill = color.filled();
            let anno = match series.marker {
                Marker::Circle => {
                    chart.draw_series(points.iter().map(|&c| Circle::new(c, MARKER_SIZE, fill)))
                }
                Marker::Square => chart.draw_series(points.iter().map(|&c| {
                    EmptyElement::at(c)
                        + Rectangle::new(
                            [(-MARKER_SIZE, -MARKER_SIZE), (MARKER_SIZE, MARKER_SIZE)],
                            fill,
                        )
                })),
                Marker::Triangle => chart.draw_series(
                    points
                        .iter()
                        .map(|&c| TriangleMarker::new(c, MARKER_SIZE + 1, fill)),
                ),
                Marker::Cross => chart.draw_series(
                    points
                        .iter()
                        .map(|&c| Cross::new(c, MARKER_SIZE, color.stroke_width(2))),
                ),
            }
            .map_err(drawing)?;
            if !series.name.is_empty() {
                let marker = series.marker;
                anno.label(series.name.clone())
                    .legend(move |at| legend_marker::<DB>(marker, at, color));
            }

            chart
                .draw_series(finite.iter().filter_map(|p| {
                    let label = p.label.as_ref()?;
                    Some(
                        EmptyElement::at((p.x, p.y))
                            + Text::new(
                                label.clone(),
                                (MARKER_SIZE + 3, -3 * MARKER_SIZE),
                                font.clone(),
                            ),
                    )
                }))
                .map_err(drawing)?;
        }
    }
    Ok(())
}

fn legend_marker<'a, DB: DrawingBackend>(
    marker: Marker,
    (x, y): BackendCoord,
    color: RGBColor,
) -> DynElement<'a, DB, BackendCoord> {
    let fill = color.filled();
    match marker {
        Marker::Circle => Circle::new((x, y), MARKER_SIZE, fill).into_dyn(),
        Marker::Square => Rectangle::new(
            [(x - MARKER_SIZE, y - MARKER_SIZE), (x + MARKER_SIZE, y + MARKER_SIZE)],
            fill,
        )
        .into_dyn(),
        Marker::Triangle => TriangleMarker::new((x, y), MARKER_SIZE + 1, fill).into_dyn(),
        Marker::Cross => Cross::new((x, y), MARKER_SIZE, color.stroke_width(2)).into_dyn(),
    }
}

fn draw_annotation<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    chart: &Chart<'_, DB>,
    annotation: &Annotation,
    x_range: &Range<f64>,
    y_range: &Range<f64>,
    area: &PixelArea,
    opts: &ChartOptions,
) -> Result<()> {
    let (target, clamped) = clamp_target((annotation.x, annotation.y), x_range, y_range);
    if clamped {
        debug!(
            "annotation '{}' at ({}, {}) moved inside the axes",
            annotation.text, annotation.x, annotation.y
        );
    }
    let color = match &annotation.color {
        Some(hex) => parse_hex(hex).map_err(|e| RenderError::InvalidData(e.to_string()))?,
        None => BLACK,
    };
    let font_px = opts.font_px(opts.font_size);
    let font = TextStyle::from((opts.font_family.as_str(), font_px).into_font()).color(&color);
    let size = estimate_text(&annotation.text, font_px);

    let anchor = chart.backend_coord(&target);
    let (left, top) = match annotation.offset {
        Offset::Pixels(dx, dy) => (anchor.0 + dx, anchor.1 - dy - size.1),
        Offset::Data(dx, dy) => {
            let p = chart.backend_coord(&(target.0 + dx, target.1 + dy));
            (p.0 - size.0 / 2, p.1 - size.1)
        }
    };
    let (left, top) = fit_box((left, top), size, area);

    if annotation.leader {
        let end = (
            anchor.0.clamp(left, left + size.0),
            anchor.1.clamp(top, top + size.1),
        );
        root.draw(&PathElement::new(vec![anchor, end], color.mix(0.7).stroke_width(1)))
            .map_err(drawing)?;
    }
    root.draw(&Text::new(annotation.text.clone(), (left, top), font))
        .map_err(drawing)?;
    Ok(())
}

/// Closed outline `y ± band` for a shaded deviation area.
pub fn band_outline(x: &[f64], y: &[f64], band: &[f64]) -> Vec<(f64, f64)> {
    let rows: Vec<(f64, f64, f64)> = x
        .iter()
        .zip(y)
        .zip(band)
        .map(|((&x, &y), &b)| (x, y, b))
        .filter(|(x, y, b)| x.is_finite() && y.is_finite() && b.is_finite())
        .collect();
    let upper = rows.iter().map(|&(x, y, b)| (x, y + b));
    let lower = rows.iter().rev().map(|&(x, y, b)| (x, y - b));
    upper.chain(lower).collect()
}

/// Axis ranges: explicit ones from `opts`, otherwise the data extent padded
/// by 5 % on each side. Secondary series only widen the x axis.
pub fn axis_ranges(series: &[Series], opts: &ChartOptions) -> Option<(Range<f64>, Range<f64>)> {
    let x = extent(series.iter(), |(x, _)| x);
    let y = extent(series.iter().filter(|s| !s.secondary), |(_, y)| y);
    Some((
        explicit_or_padded(opts.x_range, x)?,
        explicit_or_padded(opts.y_range, y)?,
    ))
}

/// Right-hand axis range, when the chart has one.
pub fn secondary_range(series: &[Series], opts: &ChartOptions) -> Option<Range<f64>> {
    if opts.y2_range.is_none() && !series.iter().any(|s| s.secondary) {
        return None;
    }
    let y = extent(series.iter().filter(|s| s.secondary), |(_, y)| y);
    explicit_or_padded(opts.y2_range, y)
}

fn extent<'a>(
    series: impl Iterator<Item = &'a Series>,
    axis: impl Fn(((f64, f64), (f64, f64))) -> (f64, f64),
) -> Option<(f64, f64)> {
    series
        .filter_map(Series::bounds)
        .map(axis)
        .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
}

fn explicit_or_padded(
    explicit: Option<(f64, f64)>,
    data: Option<(f64, f64)>,
) -> Option<Range<f64>> {
    match (explicit, data) {
        (Some((lo, hi)), _) => Some(lo..hi),
        (None, Some((lo, hi))) => Some(padded(lo, hi)),
        (None, None) => None,
    }
}

/// Rescale a right-axis series into left-axis units, so it is drawn on the
/// primary coordinates and lines up with the right-hand labels.
pub fn onto_primary(series: &Series, from: &Range<f64>, to: &Range<f64>) -> Series {
    let span = from.end - from.start;
    let scale = if span != 0.0 {
        (to.end - to.start) / span
    } else {
        1.0
    };
    let map = |v: f64| to.start + (v - from.start) * scale;
    let data = match &series.data {
        SeriesData::Points(points) => SeriesData::Points(
            points
                .iter()
                .map(|p| DataPoint {
                    y: map(p.y),
                    error: p.error.map(|e| e * scale),
                    ..p.clone()
                })
                .collect(),
        ),
        SeriesData::Line { x, y, band } => SeriesData::Line {
            x: x.clone(),
            y: y.iter().map(|&v| map(v)).collect(),
            band: band.as_ref().map(|b| b.iter().map(|e| e * scale).collect()),
        },
    };
    Series {
        data,
        ..series.clone()
    }
}

/// The part of `[a, b]` inside `range`, or `None` when they do not meet.
pub fn clip_span((a, b): (f64, f64), range: &Range<f64>) -> Option<(f64, f64)> {
    let (lo, hi) = (a.min(b), a.max(b));
    let (r_lo, r_hi) = (range.start.min(range.end), range.start.max(range.end));
    if hi < r_lo || lo > r_hi {
        return None;
    }
    Some((lo.max(r_lo), hi.min(r_hi)))
}

fn padded(lo: f64, hi: f64) -> Range<f64> {
    let span = hi - lo;
    let pad = if span > 0.0 {
        span * PAD_FRACTION
    } else if lo != 0.0 {
        lo.abs() * PAD_FRACTION
    } else {
        1.0
    };
    (lo - pad)..(hi + pad)
}

/// Number of axis labels that approximates a major tick every `tick` units.
pub fn tick_count(range: &Range<f64>, tick: f64) -> usize {
    if !(tick > 0.0) {
        return 10;
    }
    let n = ((range.end - range.start).abs() / tick).round() as usize + 1;
    n.max(2)
}

/// Axis label for a categorical x value; blank between categories.
pub fn category_label(categories: &[String], v: f64) -> String {
    let i = v.round();
    if (v - i).abs() > 1e-6 || i < 0.0 {
        return String::new();
    }
    categories.get(i as usize).cloned().unwrap_or_default()
}

/// Pull a target inside the axis ranges. Returns whether it moved.
pub fn clamp_target(
    (x, y): (f64, f64),
    x_range: &Range<f64>,
    y_range: &Range<f64>,
) -> ((f64, f64), bool) {
    let clamp = |v: f64, r: &Range<f64>| v.clamp(r.start.min(r.end), r.start.max(r.end));
    let moved = (clamp(x, x_range), clamp(y, y_range));
    (moved, moved != (x, y))
}

/// Shift a text box at `(left, top)` of `size` pixels so it stays inside `area`.
pub fn fit_box(
    (left, top): (i32, i32),
    size: (i32, i32),
    area: &PixelArea,
) -> (i32, i32) {
    let (xs, ys) = area;
    let left = left.min(xs.end - size.0).max(xs.start);
    let top = top.min(ys.end - size.1).max(ys.start);
    (left, top)
}

/// Rough text extent in pixels; avoids a font lookup.
pub fn estimate_text(text: &str, font_px: f64) -> (i32, i32) {
    let widest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);
    let lines = text.lines().count().max(1);
    (
        (0.55 * font_px * widest as f64).ceil() as i32,
        (1.2 * font_px * lines as f64).ceil() as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::options::DataPoint;

    fn sample_series() -> Vec<Series> {
        vec![
            Series::points(
                "C1",
                RGBColor(0, 102, 204),
                vec![
                    DataPoint {
                        x: 50.0,
                        y: 99.90,
                        error: Some(0.0),
                        label: Some("C1".into()),
                        ..DataPoint::default()
                    },
                    DataPoint {
                        x: 62.5,
                        y: 99.86,
                        error: Some(0.01),
                        x_error: Some(2.0),
                        ..DataPoint::default()
                    },
                ],
            ),
            Series::line(
                "L4",
                RGBColor(204, 0, 0),
                vec![0.0, 1.0, 2.0],
                vec![0.0, 300.0, 450.0],
                Some(vec![0.0, 10.0, 20.0]),
            ),
        ]
    }

    fn line(name: &str, x: Vec<f64>, y: Vec<f64>) -> Series {
        Series::line(name, RGBColor(0, 0, 0), x, y, None)
    }

    #[test]
    fn auto_ranges_pad_by_five_percent() {
        let series = vec![line("a", vec![0.0, 10.0], vec![100.0, 200.0])];
        let (x, y) = axis_ranges(&series, &ChartOptions::default()).unwrap();
        assert_eq!(x, -0.5..10.5);
        assert_eq!(y, 95.0..205.0);
    }

    #[test]
    fn explicit_ranges_win_and_empty_data_has_none() {
        let opts = ChartOptions {
            x_range: Some((30.0, 75.0)),
            y_range: Some((-5.0, 245.0)),
            ..ChartOptions::default()
        };
        assert_eq!(axis_ranges(&[], &opts), Some((30.0..75.0, -5.0..245.0)));
        assert_eq!(axis_ranges(&[], &ChartOptions::default()), None);
    }

    #[test]
    fn secondary_series_get_their_own_y_range() {
        let mut density = line("g/cm³", vec![40.0, 80.0], vec![5.0, 5.1]);
        density.secondary = true;
        let series = vec![line("%", vec![50.0, 70.0], vec![95.0, 100.0]), density];

        let (x, y) = axis_ranges(&series, &ChartOptions::default()).unwrap();
        assert_eq!(x, padded(40.0, 80.0));
        assert_eq!(y, padded(95.0, 100.0));
        let y2 = secondary_range(&series, &ChartOptions::default()).unwrap();
        assert_eq!(y2, padded(5.0, 5.1));

        assert_eq!(secondary_range(&series[..1], &ChartOptions::default()), None);
        let opts = ChartOptions {
            y2_range: Some((5.0, 5.2)),
            ..ChartOptions::default()
        };
        assert_eq!(secondary_range(&series, &opts), Some(5.0..5.2));
    }

    #[test]
    fn secondary_values_map_onto_the_left_axis() {
        let s = Series::points(
            "density",
            RGBColor(0, 0, 0),
            vec![DataPoint {
                x: 60.0,
                y: 5.05,
                error: Some(0.01),
                ..DataPoint::default()
            }],
        );
        let mapped = onto_primary(&s, &(5.0..5.1), &(95.0..100.0));
        let SeriesData::Points(points) = &mapped.data else {
            panic!("expected points");
        };
        assert!((points[0].y - 97.5).abs() < 1e-9);
        assert!((points[0].error.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(points[0].x, 60.0);
        assert_eq!(mapped.name, "density");
    }

    #[test]
    fn spans_are_clipped_to_the_axis() {
        let axis = 30.0..75.0;
        assert_eq!(clip_span((10.0, 40.0), &axis), Some((30.0, 40.0)));
        assert_eq!(clip_span((80.0, 50.0), &axis), Some((50.0, 75.0)));
        assert_eq!(clip_span((120.0, 120.0), &axis), None);
        assert_eq!(clip_span((0.0, 10.0), &axis), None);
        assert_eq!(clip_span((75.0, 75.0), &axis), Some((75.0, 75.0)));
    }

    #[test]
    fn grid_fills_rows_first() {
        assert_eq!(grid_shape(2, 2), (1, 2));
        assert_eq!(grid_shape(3, 2), (2, 2));
        assert_eq!(grid_shape(2, 1), (2, 1));
        assert_eq!(grid_shape(2, 0), (2, 1));
        assert_eq!(grid_shape(2, 5), (1, 2));
    }

    #[test]
    fn degenerate_range_is_widened() {
        assert_eq!(padded(0.0, 0.0), -1.0..1.0);
        let r = padded(100.0, 100.0);
        assert!(r.start < 100.0 && r.end > 100.0);
    }

    #[test]
    fn band_outline_walks_up_then_back_down() {
        let outline = band_outline(&[0.0, 1.0], &[10.0, 20.0], &[1.0, 2.0]);
        assert_eq!(outline, vec![(0.0, 11.0), (1.0, 22.0), (1.0, 18.0), (0.0, 9.0)]);
    }

    #[test]
    fn out_of_range_targets_are_clamped() {
        let ((x, y), moved) = clamp_target((80.0, -10.0), &(30.0..75.0), &(0.0..100.0));
        assert!(moved);
        assert_eq!((x, y), (75.0, 0.0));
        let (_, moved) = clamp_target((40.0, 50.0), &(30.0..75.0), &(0.0..100.0));
        assert!(!moved);
    }

    #[test]
    fn text_boxes_are_shifted_inside_the_plot() {
        let area = (100..900, 50..550);
        assert_eq!(fit_box((880, 40), (60, 20), &area), (840, 50));
        assert_eq!(fit_box((20, 540), (60, 20), &area), (100, 530));
        assert_eq!(fit_box((300, 300), (60, 20), &area), (300, 300));
    }

    #[test]
    fn tick_interval_becomes_label_count() {
        assert_eq!(tick_count(&(30.0..80.0), 10.0), 6);
        assert_eq!(tick_count(&(0.0..1.0), 5.0), 2);
        assert_eq!(tick_count(&(0.0..1.0), 0.0), 10);
    }

    #[test]
    fn category_labels_only_at_whole_positions() {
        let cats = vec!["C1".to_string(), "L3".to_string()];
        assert_eq!(category_label(&cats, 0.0), "C1");
        assert_eq!(category_label(&cats, 1.0000000001), "L3");
        assert_eq!(category_label(&cats, 0.5), "");
        assert_eq!(category_label(&cats, 2.0), "");
        assert_eq!(category_label(&cats, -1.0), "");
    }

    #[test]
    #[ignore = "needs system fonts"]
    fn renders_png_and_svg() {
        let opts = ChartOptions {
            title: Some("Relative density".into()),
            annotations: vec![Annotation {
                x: 1e6,
                y: 1e6,
                text: "clamped".into(),
                offset: Offset::Pixels(10, 10),
                leader: true,
                color: None,
            }],
            ..ChartOptions::default()
        };
        let png = render(&sample_series(), &opts, ImageFormat::Png).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let svg = render(&sample_series(), &opts, ImageFormat::Svg).unwrap();
        assert!(String::from_utf8(svg).unwrap().contains("<svg"));
    }

    #[test]
    #[ignore = "needs system fonts"]
    fn renders_twin_axis_panels_with_off_axis_guides() {
        let mut right = line("density", vec![50.0, 62.5], vec![5.02, 5.08]);
        right.secondary = true;
        let left = vec![line("relative", vec![50.0, 62.5], vec![97.0, 99.0]), right];
        let twin = ChartOptions {
            y2_label: "Density, g/cm³".into(),
            x_range: Some((30.0, 75.0)),
            vlines: vec![crate::render::options::VLine {
                x: 120.0,
                color: None,
                dashed: true,
                label: Some("off axis".into()),
            }],
            ..ChartOptions::default()
        };
        let plain = ChartOptions::default();
        let figure = ChartOptions {
            title: Some("Density".into()),
            ..ChartOptions::default()
        };
        let sample = sample_series();
        let panels: Vec<(&[Series], &ChartOptions)> =
            vec![(left.as_slice(), &twin), (sample.as_slice(), &plain)];
        let svg = render_grid(&panels, 2, &figure, ImageFormat::Svg).unwrap();
        let svg = String::from_utf8(svg).unwrap();
        assert!(svg.contains("Density, g/cm³"));
        assert!(!svg.contains("off axis"));
    }
}
