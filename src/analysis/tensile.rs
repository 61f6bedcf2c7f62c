use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::smoothing::{savitzky_golay, SmoothRegion};
use crate::data::model::Curve;

/// Preprocessing knobs for raw stress–strain replicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensileOptions {
    /// Gradient (MPa per sample) below which a post-peak drop counts as
    /// fracture.
    pub drop_threshold: f64,
    /// Once a drop is seen, the first point with |gradient| below this ends
    /// the curve.
    pub settle_threshold: f64,
    /// Fallback cutoff when no steep drop exists: first point below this
    /// share of the peak stress.
    pub peak_fraction: f64,
    /// Savitzky–Golay window and order for the post-peak segment.
    pub post_peak_window: usize,
    pub post_peak_order: usize,
    /// Strain span over which the post-peak smoothing fades in, starting
    /// from the raw value at the peak.
    pub blend: f64,
}

impl Default for TensileOptions {
    fn default() -> Self {
        TensileOptions {
            drop_threshold: -50.0,
            settle_threshold: 10.0,
            peak_fraction: 0.7,
            post_peak_window: 11,
            post_peak_order: 2,
            blend: 0.5,
        }
    }
}

/// Index of the largest finite y value.
pub fn peak_index(y: &[f64]) -> Option<usize> {
    y.iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// First difference smoothed by a centred 3-point mean. Entries whose window
/// reaches past either end are `None`.
pub fn rolling_gradient(y: &[f64]) -> Vec<Option<f64>> {
    let n = y.len();
    (0..n)
        .map(|i| {
            // diff[k] = y[k] - y[k-1] is defined for k >= 1; need k = i-1, i, i+1.
            if i < 2 || i + 1 >= n {
                return None;
            }
            let d = |k: usize| y[k] - y[k - 1];
            Some((d(i - 1) + d(i) + d(i + 1)) / 3.0)
        })
        .collect()
}

/// Index after which the curve is discarded, found from the stress drop.
pub fn auto_cutoff(y: &[f64], peak: usize, opts: &TensileOptions) -> usize {
    let gradient = rolling_gradient(y);
    let mut dropped = false;
    for (i, g) in gradient.iter().enumerate().skip(peak + 1) {
        let Some(g) = *g else { continue };
        if !dropped && g < opts.drop_threshold {
            dropped = true;
        } else if dropped && g.abs() < opts.settle_threshold {
            return i;
        }
    }
    if dropped {
        return y.len().saturating_sub(1);
    }
    let floor = opts.peak_fraction * y[peak];
    y.iter()
        .enumerate()
        .skip(peak + 1)
        .find(|(_, &v)| v < floor)
        .map(|(i, _)| i)
        .unwrap_or(y.len().saturating_sub(1))
}

/// Index nearest to a manual cutoff strain. Strains outside the recorded
/// range are clamped to its ends with a warning.
pub fn manual_cutoff(x: &[f64], strain: f64, label: &str) -> usize {
    let Some((lo, hi)) = crate::data::model::bounds(x) else {
        return 0;
    };
    if strain < lo || strain > hi {
        warn!("{label}: cutoff strain {strain} outside [{lo}, {hi}], clamped");
    }
    let target = strain.clamp(lo, hi);
    x.iter()
        .enumerate()
        .min_by(|a, b| (a.1 - target).abs().total_cmp(&(b.1 - target).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Clean one raw replicate: anchor at the origin, cut after fracture and
/// smooth the post-peak segment.
pub fn preprocess(curve: &Curve, cutoff_strain: Option<f64>, opts: &TensileOptions) -> Curve {
    let mut x = curve.x.clone();
    let mut y = curve.y.clone();
    let label = describe(curve);

    if x.first().is_some_and(|&s| s > 0.0) {
        x.insert(0, 0.0);
        y.insert(0, 0.0);
    }

    let Some(peak) = peak_index(&y) else {
        return Curve { x, y, ..curve.clone() };
    };

    let cutoff = match cutoff_strain {
        Some(strain) => manual_cutoff(&x, strain, &label).max(peak),
        None => auto_cutoff(&y, peak, opts),
    };
    x.truncate(cutoff + 1);
    y.truncate(cutoff + 1);
    debug!("{label}: peak at {peak}, cut after {cutoff} of {}", curve.len());

    if y.len() > peak + 5 {
        let tail = savitzky_golay(&y[peak..], opts.post_peak_window, opts.post_peak_order);
        let region = SmoothRegion {
            start: x[peak],
            end: None,
            transition: opts.blend,
        };
        for (offset, smoothed) in tail.into_iter().enumerate() {
            let i = peak + offset;
            let w = region.weight(x[i]);
            y[i] = (1.0 - w) * y[i] + w * smoothed;
        }
    }

    Curve { x, y, ..curve.clone() }
}

fn describe(curve: &Curve) -> String {
    match curve.replicate {
        Some(r) => format!("{} #{r}", curve.regime),
        None => curve.regime.clone(),
    }
}
