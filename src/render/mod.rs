/// Chart rendering: series + options → PNG / SVG bytes → file. Several charts
/// can share one canvas as a grid of panels.
///
/// ```text
///   Vec<Series> + ChartOptions
///        │
///        ▼
///   ┌──────────┐
///   │  chart    │  plotters (bitmap / svg backend)
///   └──────────┘
///        │ bytes
///        ▼
///   ┌──────────┐
///   │  save     │  target → <stem>-alt → ./<name>
///   └──────────┘
/// ```

pub mod chart;
pub mod color;
pub mod options;
pub mod save;

use std::path::{Path, PathBuf};

use crate::error::RenderError;
use options::{ChartOptions, Series};

/// Render every format in `opts.formats` to `<base>.<ext>` and return the
/// paths written.
pub fn render_to_files(
    series: &[Series],
    opts: &ChartOptions,
    base: &Path,
) -> Result<Vec<PathBuf>, RenderError> {
    opts.formats
        .iter()
        .map(|&format| {
            let bytes = chart::render(series, opts, format)?;
            save::save_with_fallback(&base.with_extension(format.extension()), &bytes)
        })
        .collect()
}

/// Like [`render_to_files`] for a multi-panel figure; `figure` supplies the
/// canvas, title and formats.
pub fn render_grid_to_files(
    panels: &[(&[Series], &ChartOptions)],
    columns: usize,
    figure: &ChartOptions,
    base: &Path,
) -> Result<Vec<PathBuf>, RenderError> {
    figure
        .formats
        .iter()
        .map(|&format| {
            let bytes = chart::render_grid(panels, columns, figure, format)?;
            save::save_with_fallback(&base.with_extension(format.extension()), &bytes)
        })
        .collect()
}
