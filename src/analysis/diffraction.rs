use serde::{Deserialize, Serialize};

use super::smoothing::Smoother;
use crate::data::model::Curve;

/// Which side of the peak the label text sits on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSide {
    Left,
    #[default]
    Center,
    Right,
}

/// A known reflection to look for, e.g. `α(101)` at 40.4°.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePeak {
    /// Nominal 2θ in degrees.
    pub position: f64,
    pub label: String,
    /// Height of the label above the peak, in intensity units.
    #[serde(default = "default_label_offset")]
    pub offset: f64,
    #[serde(default)]
    pub side: LabelSide,
}

fn default_label_offset() -> f64 {
    25.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackOptions {
    /// Each pattern is scaled so its maximum equals this.
    pub normalize_to: f64,
    /// Vertical distance between consecutive patterns.
    pub offset: f64,
    pub smoothing: Option<Smoother>,
    /// Half-width in degrees of the local-maximum search around a nominal peak.
    pub search_window: f64,
    /// A peak is labelled only when it rises this far above the pattern offset.
    pub min_height: f64,
}

impl Default for StackOptions {
    fn default() -> Self {
        StackOptions {
            normalize_to: 100.0,
            offset: 120.0,
            smoothing: None,
            search_window: 0.5,
            min_height: 3.0,
        }
    }
}

/// A located reflection ready to be annotated.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakLabel {
    /// Index of the pattern in the stack.
    pub pattern: usize,
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub offset: f64,
    pub side: LabelSide,
}

/// Scale `y` so its largest value equals `to`. All-zero or empty input is
/// returned unchanged.
pub fn normalize(y: &[f64], to: f64) -> Vec<f64> {
    let max = y
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !(max.is_finite() && max > 0.0) {
        return y.to_vec();
    }
    y.iter().map(|v| v / max * to).collect()
}

/// Normalise, optionally smooth and offset every pattern; pattern `i` is
/// raised by `i × offset`.
pub fn stack(patterns: &[Curve], opts: &StackOptions) -> Vec<Curve> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, pattern)| {
            let mut y = normalize(&pattern.y, opts.normalize_to);
            if let Some(smoother) = &opts.smoothing {
                y = smoother.apply(&y);
            }
            let base = i as f64 * opts.offset;
            y.iter_mut().for_each(|v| *v += base);
            Curve {
                y,
                ..pattern.clone()
            }
        })
        .collect()
}

/// Locate each phase peak on each stacked pattern.
pub fn label_peaks(stacked: &[Curve], peaks: &[PhasePeak], opts: &StackOptions) -> Vec<PeakLabel> {
    let mut labels = Vec::new();
    for (i, pattern) in stacked.iter().enumerate() {
        let base = i as f64 * opts.offset;
        for peak in peaks {
            let Some(idx) = nearest(&pattern.x, peak.position) else {
                continue;
            };
            let Some(&height) = pattern.y.get(idx) else {
                continue;
            };
            if height - base <= opts.min_height {
                continue;
            }
            let best = local_max(pattern, peak.position, opts.search_window).unwrap_or(idx);
            labels.push(PeakLabel {
                pattern: i,
                x: pattern.x[best],
                y: pattern.y[best],
                text: peak.label.clone(),
                offset: peak.offset,
                side: peak.side,
            });
        }
    }
    labels
}

fn nearest(xs: &[f64], target: f64) -> Option<usize> {
    xs.iter()
        .enumerate()
        .filter(|(_, x)| x.is_finite())
        .min_by(|a, b| (a.1 - target).abs().total_cmp(&(b.1 - target).abs()))
        .map(|(i, _)| i)
}

fn local_max(curve: &Curve, centre: f64, half_width: f64) -> Option<usize> {
    curve
        .points()
        .enumerate()
        .filter(|(_, (x, y))| (x - centre).abs() <= half_width && y.is_finite())
        .max_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(regime: &str, peak_at: f64, height: f64) -> Curve {
        let x: Vec<f64> = (0..=200).map(|i| 30.0 + i as f64 * 0.05).collect();
        let y = x
            .iter()
            .map(|&t| 5.0 + height * (-(t - peak_at).powi(2) / 0.02).exp())
            .collect();
        Curve::new(regime, x, y)
    }

    #[test]
    fn normalize_scales_maximum() {
        assert_eq!(normalize(&[1.0, 4.0, 2.0], 100.0), vec![25.0, 100.0, 50.0]);
        assert_eq!(normalize(&[0.0, 0.0], 100.0), vec![0.0, 0.0]);
    }

    #[test]
    fn stacking_offsets_each_pattern() {
        let stacked = stack(
            &[pattern("1", 35.0, 1000.0), pattern("8", 36.0, 50.0)],
            &StackOptions::default(),
        );
        let max = |c: &Curve| c.y.iter().cloned().fold(f64::MIN, f64::max);
        assert!((max(&stacked[0]) - 100.0).abs() < 1e-9);
        assert!((max(&stacked[1]) - 220.0).abs() < 1e-9);
        assert_eq!(stacked[1].regime, "8");
    }

    #[test]
    fn peaks_snap_to_local_maximum() {
        let stacked = stack(&[pattern("1", 35.4, 1000.0)], &StackOptions::default());
        let peaks = vec![PhasePeak {
            position: 35.2,
            label: "α(100)".into(),
            offset: 25.0,
            side: LabelSide::Center,
        }];
        let labels = label_peaks(&stacked, &peaks, &StackOptions::default());
        assert_eq!(labels.len(), 1);
        assert!((labels[0].x - 35.4).abs() < 1e-9);
        assert!((labels[0].y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn flat_regions_are_not_labelled() {
        let stacked = stack(
            &[pattern("1", 35.0, 1000.0), pattern("8", 35.0, 1000.0)],
            &StackOptions::default(),
        );
        let peaks = vec![PhasePeak {
            position: 38.0,
            label: "β(110)".into(),
            offset: 25.0,
            side: LabelSide::Right,
        }];
        // Background is ~0.5 after normalisation, under the threshold of 3.
        assert!(label_peaks(&stacked, &peaks, &StackOptions::default()).is_empty());
    }
}
