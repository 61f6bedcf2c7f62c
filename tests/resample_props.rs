use alloy_plots::analysis::aggregate::Aggregate;
use alloy_plots::analysis::resample::{average_curves, interpolate, linspace, GridPolicy};
use alloy_plots::data::model::Curve;
use proptest::prelude::*;

fn ascending_xs() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.01f64..10.0, 2..40).prop_map(|steps| {
        steps
            .iter()
            .scan(0.0, |acc, s| {
                *acc += s;
                Some(*acc)
            })
            .collect()
    })
}

/// `[0] ++ shared`, plus `extra` fractions of the last shared value.
fn native_grid(shared: &[f64], extra: &[f64]) -> Vec<f64> {
    let top = shared[shared.len() - 1];
    let mut xs: Vec<f64> = std::iter::once(0.0)
        .chain(shared.iter().copied())
        .chain(extra.iter().map(|f| f * top))
        .collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();
    xs
}

/// Smallest and largest of the two samples around `at` (or the end sample
/// outside the recorded range).
fn bracket(xs: &[f64], ys: &[f64], at: f64) -> (f64, f64) {
    let n = xs.len();
    if at <= xs[0] {
        return (ys[0], ys[0]);
    }
    if at >= xs[n - 1] {
        return (ys[n - 1], ys[n - 1]);
    }
    let hi = xs.partition_point(|&x| x <= at);
    let (a, b) = (ys[hi - 1], ys[hi]);
    (a.min(b), a.max(b))
}

proptest! {
    /// One replicate comes back exactly as loaded, with no band.
    #[test]
    fn single_curve_is_unchanged(
        x in prop::collection::vec(-1e3f64..1e3, 1..50),
        y in prop::collection::vec(-1e3f64..1e3, 1..50),
    ) {
        let n = x.len().min(y.len());
        let curve = Curve::new("C1", x[..n].to_vec(), y[..n].to_vec());
        let avg = average_curves(&[&curve], &GridPolicy::default()).unwrap();
        prop_assert_eq!(&avg.curve, &curve);
        prop_assert!(avg.std_dev.is_none());
        prop_assert_eq!(avg.replicates, 1);
    }

    /// Where every replicate has a native sample, the mean sits between the
    /// smallest and largest of them.
    #[test]
    fn mean_at_shared_x_is_bounded(
        ys in prop::collection::vec(prop::collection::vec(-1e4f64..1e4, 12), 2..6),
    ) {
        let k = 12;
        let x: Vec<f64> = (0..k).map(|i| i as f64).collect();
        let curves: Vec<Curve> =
            ys.iter().map(|y| Curve::new("L4", x.clone(), y.clone())).collect();
        let refs: Vec<&Curve> = curves.iter().collect();
        let policy = GridPolicy { points: k, ..GridPolicy::default() };
        let avg = average_curves(&refs, &policy).unwrap();

        prop_assert_eq!(&avg.curve.x, &x);
        for j in 0..k {
            let lo = ys.iter().map(|y| y[j]).fold(f64::INFINITY, f64::min);
            let hi = ys.iter().map(|y| y[j]).fold(f64::NEG_INFINITY, f64::max);
            let m = avg.curve.y[j];
            let tol = 1e-9 * (1.0 + lo.abs().max(hi.abs()));
            prop_assert!(m >= lo - tol && m <= hi + tol, "mean {} outside [{}, {}]", m, lo, hi);
            prop_assert!(avg.std_dev.as_ref().unwrap()[j] <= (hi - lo) / 2.0 + tol);
        }
    }

    /// Replicates recorded on different grids that share some x values: at
    /// every grid point the mean stays inside the samples bracketing it in
    /// each replicate.
    #[test]
    fn mean_on_mismatched_grids_is_bounded_by_bracketing_samples(
        shared in ascending_xs(),
        extra_a in prop::collection::vec(0.0f64..1.0, 0..10),
        extra_b in prop::collection::vec(0.0f64..1.0, 1..10),
        ya in prop::collection::vec(-1e3f64..1e3, 60),
        yb in prop::collection::vec(-1e3f64..1e3, 60),
        points in 3usize..200,
    ) {
        let xa = native_grid(&shared, &extra_a);
        let xb = native_grid(&shared, &extra_b);
        let a = Curve::new("C5", xa.clone(), ya[..xa.len()].to_vec());
        let b = Curve::new("C5", xb.clone(), yb[..xb.len()].to_vec());
        let policy = GridPolicy { points, ..GridPolicy::default() };
        let avg = average_curves(&[&a, &b], &policy).unwrap();

        let top = shared[shared.len() - 1];
        prop_assert_eq!(&avg.curve.x, &linspace(0.0, top, points));
        let std = avg.std_dev.as_ref().unwrap();
        for (j, &g) in avg.curve.x.iter().enumerate() {
            let (a_lo, a_hi) = bracket(&a.x, &a.y, g);
            let (b_lo, b_hi) = bracket(&b.x, &b.y, g);
            let lo = a_lo.min(b_lo);
            let hi = a_hi.max(b_hi);
            let tol = 1e-9 * (1.0 + lo.abs().max(hi.abs()));
            let m = avg.curve.y[j];
            prop_assert!(
                m >= lo - tol && m <= hi + tol,
                "mean {} at {} outside [{}, {}]",
                m,
                g,
                lo,
                hi
            );
            prop_assert!(std[j] <= (hi - lo) / 2.0 + tol);
        }
        // x = 0 is native to both.
        prop_assert!((avg.curve.y[0] - (a.y[0] + b.y[0]) / 2.0).abs() < 1e-9);
    }

    /// Interpolated values never leave the range of the two neighbours.
    #[test]
    fn interpolation_stays_between_neighbours(
        xs in ascending_xs(),
        seed in prop::collection::vec(-100f64..100.0, 40),
        t in 0.0f64..1.0,
    ) {
        let ys = &seed[..xs.len()];
        let lo = xs[0];
        let hi = xs[xs.len() - 1];
        let at = lo + t * (hi - lo);
        let v = interpolate(&xs, ys, at).unwrap();
        let ymin = ys.iter().cloned().fold(f64::INFINITY, f64::min);
        let ymax = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(v >= ymin - 1e-9 && v <= ymax + 1e-9);
    }

    /// A lone sample always has a zero deviation.
    #[test]
    fn single_sample_std_is_zero(v in -1e6f64..1e6) {
        let agg = Aggregate::from_values(&[v]).unwrap();
        prop_assert_eq!(agg.std_dev, 0.0);
        prop_assert_eq!(agg.mean, v);
        prop_assert_eq!(agg.count, 1);
    }
}
