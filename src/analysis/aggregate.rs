use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::data::model::{natural_cmp, Measurement};
use crate::regime::RegimeTable;

/// Summary statistics of one regime's replicates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub mean: f64,
    /// Population standard deviation; exactly 0 for a single sample.
    pub std_dev: f64,
    pub count: usize,
}

impl Aggregate {
    /// Returns `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = if values.len() == 1 {
            0.0
        } else {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
        };
        Some(Aggregate {
            mean,
            std_dev,
            count: values.len(),
        })
    }
}

/// Order of aggregated regimes in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeOrder {
    /// Natural label order, `C2` before `C10`.
    #[default]
    Label,
    /// Ascending energy density; regimes missing from the table go last.
    EnergyDensity,
}

/// Group measurements by regime and summarise each group.
pub fn aggregate(
    measurements: &[Measurement],
    order: RegimeOrder,
    regimes: &RegimeTable,
) -> Vec<(String, Aggregate)> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for m in measurements {
        groups.entry(m.regime.as_str()).or_default().push(m.value);
    }

    let mut out: Vec<(String, Aggregate)> = groups
        .into_iter()
        .filter_map(|(regime, values)| {
            Aggregate::from_values(&values).map(|agg| (regime.to_string(), agg))
        })
        .collect();
    sort_regimes(&mut out, order, regimes, |item| item.0.as_str());
    out
}

/// Sort anything keyed by regime label with the requested order. The sort is
/// stable and falls back to natural label order for ties.
pub fn sort_regimes<T>(
    items: &mut [T],
    order: RegimeOrder,
    regimes: &RegimeTable,
    label: impl Fn(&T) -> &str,
) {
    items.sort_by(|a, b| {
        let (la, lb) = (label(a), label(b));
        let primary = match order {
            RegimeOrder::Label => Ordering::Equal,
            RegimeOrder::EnergyDensity => {
                match (regimes.energy_density(la), regimes.energy_density(lb)) {
                    (Some(ea), Some(eb)) => ea.total_cmp(&eb),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
        };
        primary.then_with(|| natural_cmp(la, lb))
    });
}

/// Write aggregates as `regime,mean,std_dev,count[,energy_density]` rows.
pub fn write_summary<W: Write>(
    writer: W,
    aggregates: &[(String, Aggregate)],
    regimes: &RegimeTable,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["regime", "mean", "std_dev", "count", "energy_density"])?;
    for (label, agg) in aggregates {
        let energy = regimes
            .energy_density(label)
            .map(|e| format!("{e:.2}"))
            .unwrap_or_default();
        wtr.write_record([
            label.clone(),
            format!("{:.4}", agg.mean),
            format!("{:.4}", agg.std_dev),
            agg.count.to_string(),
            energy,
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(regime: &str, value: f64) -> Measurement {
        Measurement {
            regime: regime.to_string(),
            replicate: None,
            value,
        }
    }

    #[test]
    fn density_worked_example() {
        let ms = vec![m("C1", 99.90), m("L4", 99.85), m("L4", 99.87)];
        let out = aggregate(&ms, RegimeOrder::Label, &RegimeTable::default());
        assert_eq!(out.len(), 2);

        let (label, c1) = &out[0];
        assert_eq!(label, "C1");
        assert!((c1.mean - 99.90).abs() < 1e-9);
        assert_eq!(c1.std_dev, 0.0);
        assert_eq!(c1.count, 1);

        let (label, l4) = &out[1];
        assert_eq!(label, "L4");
        assert!((l4.mean - 99.86).abs() < 1e-9);
        assert!((l4.std_dev - 0.01).abs() < 1e-9);
        assert_eq!(l4.count, 2);
    }

    #[test]
    fn single_sample_has_exactly_zero_std() {
        let agg = Aggregate::from_values(&[0.1 + 0.2]).unwrap();
        assert_eq!(agg.std_dev, 0.0);
        assert!(Aggregate::from_values(&[]).is_none());
    }

    #[test]
    fn label_order_is_natural() {
        let ms = vec![m("C10", 1.0), m("C2", 1.0), m("C1", 1.0)];
        let out = aggregate(&ms, RegimeOrder::Label, &RegimeTable::default());
        let labels: Vec<_> = out.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["C1", "C2", "C10"]);
    }

    #[test]
    fn energy_order_puts_unknown_last() {
        let ms = vec![
            m("L2", 1.0),
            m("ZZ", 1.0),
            m("C1", 1.0),
            m("L3", 1.0),
            m("AA", 1.0),
        ];
        let out = aggregate(&ms, RegimeOrder::EnergyDensity, &RegimeTable::builtin());
        let labels: Vec<_> = out.iter().map(|(l, _)| l.as_str()).collect();
        // C1 = 50, L3 = 62.5, L2 = 80 (explicit), then unknowns by label.
        assert_eq!(labels, vec!["C1", "L3", "L2", "AA", "ZZ"]);
    }

    #[test]
    fn ordering_is_deterministic_across_input_permutations() {
        let a = vec![m("L1", 2.0), m("C5", 1.0), m("L1", 3.0), m("C1", 0.5)];
        let mut b = a.clone();
        b.reverse();
        let table = RegimeTable::builtin();
        for order in [RegimeOrder::Label, RegimeOrder::EnergyDensity] {
            assert_eq!(aggregate(&a, order, &table), aggregate(&b, order, &table));
        }
    }

    #[test]
    fn summary_csv_has_one_row_per_regime() {
        let ms = vec![m("C1", 99.90), m("L4", 99.85), m("L4", 99.87)];
        let table = RegimeTable::builtin();
        let out = aggregate(&ms, RegimeOrder::Label, &table);
        let mut buf = Vec::new();
        write_summary(&mut buf, &out, &table).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "regime,mean,std_dev,count,energy_density");
        assert_eq!(lines[1], "C1,99.9000,0.0000,1,50.00");
        assert_eq!(lines[2], "L4,99.8600,0.0100,2,78.10");
    }
}
