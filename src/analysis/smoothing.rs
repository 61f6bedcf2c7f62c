use serde::{Deserialize, Serialize};

/// A 1-D smoother applied to the y values of a uniformly sampled trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Smoother {
    /// Centred moving average; the window shrinks at the edges.
    MovingAverage { window: usize },
    /// Local least-squares polynomial fit.
    SavitzkyGolay { window: usize, order: usize },
}

impl Smoother {
    pub fn apply(&self, y: &[f64]) -> Vec<f64> {
        match *self {
            Smoother::MovingAverage { window } => moving_average(y, window),
            Smoother::SavitzkyGolay { window, order } => savitzky_golay(y, window, order),
        }
    }
}

/// Odd window no longer than `len`.
fn odd_window(window: usize, len: usize) -> usize {
    let w = window.min(len);
    if w % 2 == 0 {
        w.saturating_sub(1)
    } else {
        w
    }
}

pub fn moving_average(y: &[f64], window: usize) -> Vec<f64> {
    let w = odd_window(window, y.len());
    if w <= 1 {
        return y.to_vec();
    }
    let half = w / 2;
    (0..y.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(y.len());
            y[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

/// Savitzky–Golay filter. The window is forced odd and shrunk to the data
/// length; the first and last `window / 2` samples are evaluated on the
/// polynomial fitted to the edge window. Returns the input unchanged when
/// the window cannot hold a polynomial of `order`.
pub fn savitzky_golay(y: &[f64], window: usize, order: usize) -> Vec<f64> {
    let n = y.len();
    let w = odd_window(window, n);
    if w <= order || w < 3 {
        return y.to_vec();
    }
    let half = w / 2;
    let Some(centre) = fit_weights(half, order, 0.0) else {
        return y.to_vec();
    };

    let mut out = vec![0.0; n];
    for i in half..n - half {
        out[i] = dot(&centre, &y[i - half..=i + half]);
    }

    let head = &y[..w];
    let tail = &y[n - w..];
    for k in 0..half {
        let t = k as f64 - half as f64;
        match fit_weights(half, order, t) {
            Some(weights) => {
                out[k] = dot(&weights, head);
                out[n - 1 - k] = dot_rev(&weights, tail);
            }
            None => {
                out[k] = y[k];
                out[n - 1 - k] = y[n - 1 - k];
            }
        }
    }
    out
}

fn dot(weights: &[f64], values: &[f64]) -> f64 {
    weights.iter().zip(values).map(|(w, v)| w * v).sum()
}

/// Evaluating at `-t` on the reversed window equals evaluating at `t`.
fn dot_rev(weights: &[f64], values: &[f64]) -> f64 {
    weights.iter().zip(values.iter().rev()).map(|(w, v)| w * v).sum()
}

/// Weights `c_j` such that `Σ c_j · y[centre + j]` is the least-squares
/// polynomial of `order` over offsets `-half..=half`, evaluated at offset `t`.
///
/// Offsets are scaled by `half` to keep the normal matrix well conditioned.
fn fit_weights(half: usize, order: usize, t: f64) -> Option<Vec<f64>> {
    let h = half as f64;
    let offsets: Vec<f64> = (-(half as i64)..=half as i64)
        .map(|j| j as f64 / h)
        .collect();
    let m = order + 1;

    let mut normal = vec![vec![0.0; m]; m];
    for &u in &offsets {
        for (a, row) in normal.iter_mut().enumerate() {
            for (b, cell) in row.iter_mut().enumerate() {
                *cell += u.powi((a + b) as i32);
            }
        }
    }
    let rhs: Vec<f64> = (0..m).map(|k| (t / h).powi(k as i32)).collect();
    let z = solve(normal, rhs)?;

    Some(
        offsets
            .iter()
            .map(|&u| z.iter().enumerate().map(|(k, zk)| zk * u.powi(k as i32)).sum())
            .collect(),
    )
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let f = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let s: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - s) / a[row][row];
    }
    Some(x)
}

/// Restrict smoothing to an x interval, fading in and out over `transition`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothRegion {
    pub start: f64,
    /// Open-ended when absent.
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub transition: f64,
}

impl SmoothRegion {
    /// Share of the smoothed value at `x`: 0 outside the region, rising
    /// linearly from 0 at `start` to 1 at `start + transition`, and falling
    /// back to 0 at `end`.
    pub fn weight(&self, x: f64) -> f64 {
        let end = self.end.unwrap_or(f64::INFINITY);
        if !(x >= self.start && x <= end) {
            return 0.0;
        }
        if self.transition <= 0.0 {
            return 1.0;
        }
        let rise = (x - self.start) / self.transition;
        let fall = (end - x) / self.transition;
        rise.min(fall).clamp(0.0, 1.0)
    }
}

/// Smooth `y` and blend it with the raw values by [`SmoothRegion::weight`].
/// Without a region the whole trace is smoothed.
pub fn smooth_region(
    x: &[f64],
    y: &[f64],
    smoother: &Smoother,
    region: Option<&SmoothRegion>,
) -> Vec<f64> {
    let smoothed = smoother.apply(y);
    let Some(region) = region else {
        return smoothed;
    };
    x.iter()
        .zip(y.iter().zip(&smoothed))
        .map(|(&xi, (&raw, &sm))| {
            let w = region.weight(xi);
            (1.0 - w) * raw + w * sm
        })
        .collect()
}
