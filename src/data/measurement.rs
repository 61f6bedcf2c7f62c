use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::layout::{ColumnRef, TableLayout};
use super::model::Measurement;
use super::table::{numeric_cell, read_raw, LoadReport, Loaded, RawTable};
use crate::error::LoadError;

/// Where the regime label and the measured value sit in a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementLayout {
    #[serde(flatten)]
    pub table: TableLayout,
    pub regime: ColumnRef,
    pub value: ColumnRef,
    /// Carry the last non-blank regime label down to following rows, for
    /// sheets that label only the first row of each regime block.
    pub fill_down: bool,
}

impl Default for MeasurementLayout {
    fn default() -> Self {
        MeasurementLayout {
            table: TableLayout::default(),
            regime: ColumnRef::Index(0),
            value: ColumnRef::Index(1),
            fill_down: false,
        }
    }
}

/// Load `(regime, value)` records from a workbook sheet or text export.
pub fn load_measurements(
    path: &Path,
    layout: &MeasurementLayout,
) -> Result<Loaded<Vec<Measurement>>, LoadError> {
    let raw = read_raw(path, &layout.table)?;
    measurements_from_table(&raw, layout)
}

/// Apply a [`MeasurementLayout`] to an already-read table.
pub fn measurements_from_table(
    raw: &RawTable,
    layout: &MeasurementLayout,
) -> Result<Loaded<Vec<Measurement>>, LoadError> {
    let view = raw.locate(&layout.table.header)?;
    let regime_col = view.resolve(&layout.regime)?;
    let value_col = view.resolve(&layout.value)?;

    let mut report = LoadReport::default();
    let mut data = Vec::new();
    let mut replicates: BTreeMap<String, u32> = BTreeMap::new();
    let mut current_regime: Option<String> = None;

    for (row_no, row) in view.data_rows() {
        let label = row.get(regime_col).and_then(|c| c.as_label());
        let regime = match (label, layout.fill_down) {
            (Some(label), _) => {
                current_regime = Some(label.clone());
                label
            }
            (None, true) => match &current_regime {
                Some(regime) => regime.clone(),
                None => {
                    report.skip(&raw.path, row_no, "no regime label above this row");
                    continue;
                }
            },
            (None, false) => {
                report.skip(&raw.path, row_no, format!("column {regime_col} has no regime label"));
                continue;
            }
        };

        let value = match numeric_cell(row, value_col, layout.table.decimal) {
            Ok(v) => v,
            Err(reason) => {
                report.skip(&raw.path, row_no, reason);
                continue;
            }
        };

        let replicate = replicates.entry(regime.clone()).or_insert(0);
        *replicate += 1;
        data.push(Measurement {
            regime,
            replicate: Some(*replicate),
            value,
        });
        report.parsed += 1;
    }

    Ok(Loaded { data, report })
}

/// Measurements written straight into a job file as `regime → values`.
pub fn measurements_from_inline(values: &BTreeMap<String, Vec<f64>>) -> Vec<Measurement> {
    values
        .iter()
        .flat_map(|(regime, vals)| {
            vals.iter().enumerate().map(move |(i, &value)| Measurement {
                regime: regime.clone(),
                replicate: Some(i as u32 + 1),
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::layout::HeaderLocator;
    use crate::data::table::parse_text;

    fn csv_layout() -> MeasurementLayout {
        MeasurementLayout {
            table: TableLayout {
                header: HeaderLocator::Offset(0),
                ..TableLayout::default()
            },
            regime: ColumnRef::Name("regime".into()),
            value: ColumnRef::Name("density".into()),
            fill_down: false,
        }
    }

    #[test]
    fn one_corrupt_row_among_five_is_skipped() {
        let text = "regime;density\nC1;99,90\nC5;99,85\nL2;n/a\nL3;99,87\nL4;99,66\n";
        let raw = parse_text(Path::new("density.csv"), text, &csv_layout().table).unwrap();
        let loaded = measurements_from_table(&raw, &csv_layout()).unwrap();
        assert_eq!(loaded.data.len(), 4);
        assert_eq!(loaded.report.parsed, 4);
        assert_eq!(loaded.report.skipped.len(), 1);
        assert_eq!(loaded.report.skipped[0].row, 4);
        assert!(loaded.data.iter().all(|m| m.regime != "L2"));
    }

    #[test]
    fn plain_comma_csv_loads_with_default_layout() {
        let text = "regime,density\nC1,99.90\nL4,99.85\nL4,99.87\n";
        let raw = parse_text(Path::new("density.csv"), text, &csv_layout().table).unwrap();
        let loaded = measurements_from_table(&raw, &csv_layout()).unwrap();
        assert_eq!(loaded.report.parsed, 3);
        assert!(loaded.report.skipped.is_empty());
        assert_eq!(loaded.data[2].regime, "L4");
        assert_eq!(loaded.data[2].value, 99.87);
    }

    #[test]
    fn fill_down_carries_regime_labels() {
        let layout = MeasurementLayout {
            fill_down: true,
            ..MeasurementLayout::default()
        };
        let text = "1\t210\n\n\t215\n2\t190\n\t195\n\t200\n";
        let raw = parse_text(Path::new("hv.txt"), text, &layout.table).unwrap();
        let loaded = measurements_from_table(&raw, &layout).unwrap();
        let regimes: Vec<_> = loaded.data.iter().map(|m| m.regime.as_str()).collect();
        assert_eq!(regimes, vec!["1", "1", "2", "2", "2"]);
        assert_eq!(loaded.data[4].replicate, Some(3));
        assert!(loaded.report.skipped.is_empty());
    }

    #[test]
    fn missing_named_column_is_fatal() {
        let text = "regime;hardness\nC1;210\n";
        let raw = parse_text(Path::new("hv.csv"), text, &csv_layout().table).unwrap();
        let err = measurements_from_table(&raw, &csv_layout()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { .. }));
    }

    #[test]
    fn inline_values_get_replicate_indices() {
        let mut values = BTreeMap::new();
        values.insert("C1".to_string(), vec![99.90]);
        values.insert("L4".to_string(), vec![99.85, 99.87]);
        let ms = measurements_from_inline(&values);
        assert_eq!(ms.len(), 3);
        assert_eq!(ms[2].regime, "L4");
        assert_eq!(ms[2].replicate, Some(2));
    }
}
