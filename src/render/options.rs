use plotters::prelude::SeriesLabelPosition;
use plotters::style::RGBColor;
use serde::{Deserialize, Serialize};

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendPosition {
    UpperLeft,
    #[default]
    UpperRight,
    LowerLeft,
    LowerRight,
    MiddleLeft,
    MiddleRight,
    None,
}

impl LegendPosition {
    pub fn to_plotters(self) -> Option<SeriesLabelPosition> {
        match self {
            LegendPosition::UpperLeft => Some(SeriesLabelPosition::UpperLeft),
            LegendPosition::UpperRight => Some(SeriesLabelPosition::UpperRight),
            LegendPosition::LowerLeft => Some(SeriesLabelPosition::LowerLeft),
            LegendPosition::LowerRight => Some(SeriesLabelPosition::LowerRight),
            LegendPosition::MiddleLeft => Some(SeriesLabelPosition::MiddleLeft),
            LegendPosition::MiddleRight => Some(SeriesLabelPosition::MiddleRight),
            LegendPosition::None => None,
        }
    }
}

/// Shaded reference area. A missing bound extends to the axis edge, so a
/// region with only `x` bounds is a vertical span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default)]
    pub x: Option<(f64, f64)>,
    #[serde(default)]
    pub y: Option<(f64, f64)>,
    #[serde(default = "default_region_color")]
    pub color: String,
    #[serde(default = "default_region_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_region_color() -> String {
    "#999999".to_string()
}

fn default_region_alpha() -> f64 {
    0.15
}

/// Vertical reference line, e.g. a nominal peak position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VLine {
    pub x: f64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub dashed: bool,
    #[serde(default)]
    pub label: Option<String>,
}

/// Text offset from an annotation target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Offset {
    /// Screen pixels, +y up.
    Pixels(i32, i32),
    /// Data units.
    Data(f64, f64),
}

impl Default for Offset {
    fn default() -> Self {
        Offset::Pixels(10, 10)
    }
}

/// Text pointing at a data coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub x: f64,
    pub y: f64,
    pub text: String,
    #[serde(default)]
    pub offset: Offset,
    /// Draw a line from the target to the text.
    #[serde(default = "default_true")]
    pub leader: bool,
    #[serde(default)]
    pub color: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Free text placed in axes-fraction coordinates (0..1 from the lower left).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    #[serde(default = "default_note_at")]
    pub at: (f64, f64),
}

fn default_note_at() -> (f64, f64) {
    (0.02, 0.95)
}

/// Everything about a chart except the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOptions {
    pub title: Option<String>,
    pub x_label: String,
    pub y_label: String,
    /// Axis ranges; automatic with 5 % padding when absent.
    pub x_range: Option<(f64, f64)>,
    pub y_range: Option<(f64, f64)>,
    /// Major tick spacing in data units.
    pub x_tick: Option<f64>,
    pub y_tick: Option<f64>,
    /// Right-hand axis for series marked `secondary`.
    pub y2_label: String,
    pub y2_range: Option<(f64, f64)>,
    pub y2_tick: Option<f64>,
    pub grid: bool,
    pub legend: LegendPosition,
    pub hide_y_labels: bool,
    /// Figure size in inches.
    pub size: (f64, f64),
    pub dpi: u32,
    /// Base font size in points.
    pub font_size: f64,
    pub font_family: String,
    pub regions: Vec<Region>,
    pub vlines: Vec<VLine>,
    pub annotations: Vec<Annotation>,
    pub note: Option<Note>,
    pub formats: Vec<ImageFormat>,
    /// Names for x = 0, 1, 2, ... on a categorical axis; filled in by the
    /// pipeline, not the job file.
    #[serde(skip)]
    pub x_categories: Vec<String>,
}

impl Default for ChartOptions {
    fn default() -> Self {
        ChartOptions {
            title: None,
            x_label: String::new(),
            y_label: String::new(),
            x_range: None,
            y_range: None,
            x_tick: None,
            y_tick: None,
            y2_label: String::new(),
            y2_range: None,
            y2_tick: None,
            grid: true,
            legend: LegendPosition::default(),
            hide_y_labels: false,
            size: (10.0, 6.0),
            dpi: 100,
            font_size: 12.0,
            font_family: "sans-serif".to_string(),
            regions: Vec::new(),
            vlines: Vec::new(),
            annotations: Vec::new(),
            note: None,
            formats: vec![ImageFormat::Png],
            x_categories: Vec::new(),
        }
    }
}

impl ChartOptions {
    /// Canvas size in pixels: inches × dpi.
    pub fn pixel_size(&self) -> (u32, u32) {
        let px = |inches: f64| ((inches * self.dpi as f64).round() as u32).max(64);
        (px(self.size.0), px(self.size.1))
    }

    /// Font size in pixels for a size given in points.
    pub fn font_px(&self, points: f64) -> f64 {
        points * self.dpi as f64 / 72.0
    }
}

/// Point marker shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    #[default]
    Circle,
    Square,
    Triangle,
    Cross,
}

impl Marker {
    /// Cycle through the shapes for successive series.
    pub fn nth(i: usize) -> Self {
        [Marker::Circle, Marker::Square, Marker::Triangle, Marker::Cross][i % 4]
    }
}

/// One plotted point with optional symmetric error bars and a text label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
    /// Vertical half-width.
    pub error: Option<f64>,
    /// Horizontal half-width.
    pub x_error: Option<f64>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeriesData {
    Points(Vec<DataPoint>),
    Line {
        x: Vec<f64>,
        y: Vec<f64>,
        /// Half-width of a shaded band around the line.
        band: Option<Vec<f64>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub color: RGBColor,
    pub marker: Marker,
    pub line_width: u32,
    pub dashed: bool,
    /// Connect points of a `Points` series with a line.
    pub connect: bool,
    /// Plot against the right-hand y axis.
    pub secondary: bool,
    pub data: SeriesData,
}

impl Series {
    pub fn points(name: impl Into<String>, color: RGBColor, points: Vec<DataPoint>) -> Self {
        Series {
            name: name.into(),
            color,
            marker: Marker::Circle,
            line_width: 2,
            dashed: false,
            connect: false,
            secondary: false,
            data: SeriesData::Points(points),
        }
    }

    pub fn line(
        name: impl Into<String>,
        color: RGBColor,
        x: Vec<f64>,
        y: Vec<f64>,
        band: Option<Vec<f64>>,
    ) -> Self {
        Series {
            name: name.into(),
            color,
            marker: Marker::Circle,
            line_width: 2,
            dashed: false,
            connect: true,
            secondary: false,
            data: SeriesData::Line { x, y, band },
        }
    }

    /// Data extent including error bars and bands.
    pub fn bounds(&self) -> Option<((f64, f64), (f64, f64))> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = match &self.data {
            SeriesData::Points(points) => points
                .iter()
                .flat_map(|p| {
                    let ey = p.error.unwrap_or(0.0).abs();
                    let ex = p.x_error.unwrap_or(0.0).abs();
                    [(p.x - ex, p.y - ey), (p.x + ex, p.y + ey)]
                })
                .unzip(),
            SeriesData::Line { x, y, band } => x
                .iter()
                .zip(y)
                .enumerate()
                .flat_map(|(i, (&xi, &yi))| {
                    let e = band.as_ref().and_then(|b| b.get(i)).copied().unwrap_or(0.0).abs();
                    [(xi, yi - e), (xi, yi + e)]
                })
                .unzip(),
        };
        Some((bounds_of(&xs)?, bounds_of(&ys)?))
    }
}

fn bounds_of(values: &[f64]) -> Option<(f64, f64)> {
    crate::data::model::bounds(values)
}
