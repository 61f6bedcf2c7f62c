use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::model::Curve;

/// How far the common grid extends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridExtent {
    /// Up to the smallest curve maximum; nothing is extrapolated.
    #[default]
    Shortest,
    /// Up to the largest curve maximum; shorter curves hold their end value.
    Longest,
}

/// Where the common grid begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridStart {
    /// x = 0.
    #[default]
    Origin,
    /// The largest curve minimum, for data that never reaches 0.
    Overlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridPolicy {
    pub extent: GridExtent,
    pub start: GridStart,
    pub points: usize,
}

impl Default for GridPolicy {
    fn default() -> Self {
        GridPolicy {
            extent: GridExtent::Shortest,
            start: GridStart::Origin,
            points: 1000,
        }
    }
}

/// Mean trace of a regime with its point-wise deviation.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragedCurve {
    pub curve: Curve,
    /// Population standard deviation per grid point; `None` for one replicate.
    pub std_dev: Option<Vec<f64>>,
    pub replicates: usize,
}

/// Copy of `curve` with finite points only, sorted by ascending x.
pub fn ascending(curve: &Curve) -> Curve {
    let mut pairs: Vec<(f64, f64)> = curve
        .points()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (x, y) = pairs.into_iter().unzip();
    Curve {
        x,
        y,
        ..curve.clone()
    }
}

/// Linear interpolation on ascending `xs`, holding the end values outside.
pub fn interpolate(xs: &[f64], ys: &[f64], at: f64) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return None;
    }
    if at <= xs[0] {
        return Some(ys[0]);
    }
    if at >= xs[n - 1] {
        return Some(ys[n - 1]);
    }
    let hi = xs[..n].partition_point(|&x| x <= at);
    let lo = hi - 1;
    let span = xs[hi] - xs[lo];
    if span <= 0.0 {
        return Some(ys[lo]);
    }
    let t = (at - xs[lo]) / span;
    Some(ys[lo] + t * (ys[hi] - ys[lo]))
}

/// Evenly spaced grid of `points` values covering `[lo, hi]`.
pub fn linspace(lo: f64, hi: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (points - 1) as f64;
            (0..points).map(|i| lo + step * i as f64).collect()
        }
    }
}

/// Common grid for `curves` (already sorted ascending) under `policy`.
pub fn common_grid(curves: &[Curve], policy: &GridPolicy) -> Option<Vec<f64>> {
    let bounds: Vec<(f64, f64)> = curves.iter().filter_map(Curve::x_bounds).collect();
    if bounds.is_empty() {
        return None;
    }
    let hi = match policy.extent {
        GridExtent::Shortest => bounds.iter().map(|b| b.1).fold(f64::INFINITY, f64::min),
        GridExtent::Longest => bounds.iter().map(|b| b.1).fold(f64::NEG_INFINITY, f64::max),
    };
    let lo = match policy.start {
        GridStart::Origin => 0.0,
        GridStart::Overlap => bounds.iter().map(|b| b.0).fold(f64::NEG_INFINITY, f64::max),
    };
    if !(hi > lo) {
        return None;
    }
    Some(linspace(lo, hi, policy.points.max(2)))
}

/// Average the replicate curves of one regime on a common grid.
///
/// A single replicate is returned unchanged with no deviation band.
/// Returns `None` when there is nothing to average or the replicates do not
/// overlap under the policy.
pub fn average_curves(curves: &[&Curve], policy: &GridPolicy) -> Option<AveragedCurve> {
    let first = curves.first()?;
    if curves.len() == 1 {
        return Some(AveragedCurve {
            curve: (*first).clone(),
            std_dev: None,
            replicates: 1,
        });
    }

    let sorted: Vec<Curve> = curves
        .iter()
        .map(|c| ascending(c))
        .filter(|c| !c.is_empty())
        .collect();
    let grid = common_grid(&sorted, policy)?;
    debug!(
        "regime {}: {} replicates on {} points [{:.4}, {:.4}]",
        first.regime,
        sorted.len(),
        grid.len(),
        grid[0],
        grid[grid.len() - 1]
    );

    let columns: Vec<Vec<f64>> = sorted
        .iter()
        .map(|c| {
            grid.iter()
                .filter_map(|&g| interpolate(&c.x, &c.y, g))
                .collect()
        })
        .collect();

    let n = columns.len() as f64;
    let mut mean = vec![0.0; grid.len()];
    let mut std_dev = vec![0.0; grid.len()];
    for (i, (m, s)) in mean.iter_mut().zip(std_dev.iter_mut()).enumerate() {
        let avg = columns.iter().map(|col| col[i]).sum::<f64>() / n;
        let var = columns.iter().map(|col| (col[i] - avg).powi(2)).sum::<f64>() / n;
        *m = avg;
        *s = var.sqrt();
    }

    let mut curve = Curve::new(first.regime.clone(), grid, mean);
    curve.metadata = first.metadata.clone();
    Some(AveragedCurve {
        curve,
        std_dev: Some(std_dev),
        replicates: columns.len(),
    })
}
