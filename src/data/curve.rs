use std::collections::BTreeMap;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::layout::{ColumnRef, Delimiter, HeaderLocator, TableLayout};
use super::model::{CellValue, Curve};
use super::table::{numeric_cell, read_raw, LoadReport, Loaded, RawTable, Workbook};
use crate::error::LoadError;

/// Where the x and y columns of a trace sit in a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveLayout {
    #[serde(flatten)]
    pub table: TableLayout,
    pub x: ColumnRef,
    pub y: ColumnRef,
}

impl Default for CurveLayout {
    fn default() -> Self {
        CurveLayout {
            table: TableLayout::default(),
            x: ColumnRef::Index(0),
            y: ColumnRef::Index(1),
        }
    }
}

impl CurveLayout {
    /// Tensile machine export: eight preamble rows, header on row 8,
    /// strain and stress in the first two columns.
    pub fn tensile() -> Self {
        CurveLayout {
            table: TableLayout {
                header: HeaderLocator::Offset(8),
                ..TableLayout::default()
            },
            ..CurveLayout::default()
        }
    }

    /// Two-column `.xy` diffraction export, `'`-prefixed comment lines.
    pub fn xrd() -> Self {
        CurveLayout {
            table: TableLayout {
                comment_prefix: Some("'".to_string()),
                ..TableLayout::default()
            },
            ..CurveLayout::default()
        }
    }

    /// Calorimeter export: free-form preamble up to the `#Temp` header,
    /// then temperature, time and heat flow columns.
    pub fn dsc() -> Self {
        CurveLayout {
            table: TableLayout {
                header: HeaderLocator::Marker("#Temp".to_string()),
                delimiter: Delimiter::Auto,
                ..TableLayout::default()
            },
            x: ColumnRef::Index(0),
            y: ColumnRef::Index(2),
        }
    }
}

/// Load a single trace from a text export or workbook sheet.
pub fn load_curve(
    path: &Path,
    layout: &CurveLayout,
    regime: &str,
) -> Result<Loaded<Curve>, LoadError> {
    let raw = read_raw(path, &layout.table)?;
    curve_from_table(&raw, layout, regime)
}

/// Apply a [`CurveLayout`] to an already-read table.
pub fn curve_from_table(
    raw: &RawTable,
    layout: &CurveLayout,
    regime: &str,
) -> Result<Loaded<Curve>, LoadError> {
    let view = raw.locate(&layout.table.header)?;
    let x_col = view.resolve(&layout.x)?;
    let y_col = view.resolve(&layout.y)?;
    let decimal = layout.table.decimal;

    let mut report = LoadReport::default();
    let mut x = Vec::new();
    let mut y = Vec::new();

    for (row_no, row) in view.data_rows() {
        let parsed = numeric_cell(row, x_col, decimal)
            .and_then(|xv| numeric_cell(row, y_col, decimal).map(|yv| (xv, yv)));
        match parsed {
            Ok((xv, yv)) => {
                x.push(xv);
                y.push(yv);
                report.parsed += 1;
            }
            Err(reason) => report.skip(&raw.path, row_no, reason),
        }
    }

    Ok(Loaded {
        data: Curve::new(regime, x, y),
        report,
    })
}

/// Load every sheet named in `sheets` (sheet name → regime) as one replicate
/// curve. Sheets are visited in workbook order; replicates are numbered per
/// regime in that order. Named sheets absent from the workbook are fatal.
pub fn load_workbook_curves(
    path: &Path,
    sheets: &BTreeMap<String, String>,
    layout: &CurveLayout,
) -> Result<Loaded<Vec<Curve>>, LoadError> {
    let mut workbook = Workbook::open(path)?;
    let names = workbook.sheet_names();

    if let Some(missing) = sheets.keys().find(|s| !names.contains(s)) {
        return Err(LoadError::SheetNotFound {
            path: path.to_path_buf(),
            sheet: missing.clone(),
        });
    }

    let mut report = LoadReport::default();
    let mut curves = Vec::new();
    let mut replicates: BTreeMap<&str, u32> = BTreeMap::new();

    for name in &names {
        let Some(regime) = sheets.get(name) else {
            continue;
        };
        let raw = workbook.sheet(Some(name))?;
        let loaded = curve_from_table(&raw, layout, regime)?;
        if loaded.data.is_empty() {
            warn!("{}: sheet '{name}' holds no data rows", path.display());
        }
        let replicate = replicates.entry(regime.as_str()).or_insert(0);
        *replicate += 1;
        let mut curve = loaded.data.with_replicate(*replicate);
        curve
            .metadata
            .insert("sheet".to_string(), CellValue::String(name.clone()));
        curves.push(curve);
        report.merge(loaded.report);
    }

    info!(
        "{}: {} curve(s) from {} sheet(s)",
        path.display(),
        curves.len(),
        sheets.len()
    );
    Ok(Loaded {
        data: curves,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::layout::DecimalSeparator;
    use crate::data::table::parse_text;

    #[test]
    fn xrd_preset_reads_xy_export() {
        let text = "'Id: Ti15Ta_1\n'Operator: lab\n30.00 1520\n30.02 1498\nbad line\n30.04 1610\n";
        let layout = CurveLayout::xrd();
        let raw = parse_text(Path::new("Ti15Ta_1.xy"), text, &layout.table).unwrap();
        let loaded = curve_from_table(&raw, &layout, "1").unwrap();
        assert_eq!(loaded.data.x, vec![30.0, 30.02, 30.04]);
        assert_eq!(loaded.data.y, vec![1520.0, 1498.0, 1610.0]);
        assert_eq!(loaded.report.skipped.len(), 1);
        assert_eq!(loaded.report.skipped[0].row, 5);
    }

    #[test]
    fn dsc_preset_uses_third_column() {
        let text = "#IDENTITY:;TiTaNbZr\n##Temp./°C;Time/min;DSC/(mW/mg);Sensit./(uV/mW)\n600,1;10,0;-0,052;1,2\n601,1;10,1;-0,050;1,2\n";
        let layout = CurveLayout::dsc();
        let raw = parse_text(Path::new("heating.txt"), text, &layout.table).unwrap();
        let loaded = curve_from_table(&raw, &layout, "heating").unwrap();
        assert_eq!(loaded.data.x, vec![600.1, 601.1]);
        assert_eq!(loaded.data.y, vec![-0.052, -0.050]);
        assert!(loaded.report.skipped.is_empty());
    }

    #[test]
    fn named_columns_with_dot_decimal() {
        let mut layout = CurveLayout {
            x: ColumnRef::Name("strain".into()),
            y: ColumnRef::Name("stress".into()),
            ..CurveLayout::default()
        };
        layout.table.header = HeaderLocator::Offset(0);
        layout.table.decimal = DecimalSeparator::Dot;
        let text = "stress,strain\n120.5,0.1\n240.0,0.2\n";
        let raw = parse_text(Path::new("t.csv"), text, &layout.table).unwrap();
        let loaded = curve_from_table(&raw, &layout, "C1").unwrap();
        assert_eq!(loaded.data.x, vec![0.1, 0.2]);
        assert_eq!(loaded.data.y, vec![120.5, 240.0]);
    }

    #[test]
    fn missing_workbook_is_fatal() {
        let sheets = BTreeMap::from([("Sheet1".to_string(), "C1".to_string())]);
        let err = load_workbook_curves(
            Path::new("/no/such/TiNbZrCu.xlsx"),
            &sheets,
            &CurveLayout::tensile(),
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::FileNotFound(_)));
    }
}
