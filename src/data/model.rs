use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::layout::DecimalSeparator;

// ---------------------------------------------------------------------------
// CellValue – a single cell of a loaded table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell as read from a workbook, text export or dataset.
/// Used as a key in `BTreeMap` / `BTreeSet` downstream so it must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can put CellValue in BTreeSet --

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    /// Interpret the cell as a number. Text cells are parsed with the given
    /// decimal convention so `"99,87"` works for comma-decimal exports.
    pub fn as_f64(&self, decimal: DecimalSeparator) -> Option<f64> {
        match self {
            CellValue::Float(v) if v.is_finite() => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::String(s) => decimal.parse(s),
            _ => None,
        }
    }

    /// Text form used for labels (regime names, sheet keys). Integral floats
    /// print without a fractional part so a regime column holding `1.0` maps
    /// to the label `1`.
    pub fn as_label(&self) -> Option<String> {
        match self {
            CellValue::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            CellValue::Integer(i) => Some(i.to_string()),
            CellValue::Float(v) if v.fract() == 0.0 && v.is_finite() => {
                Some(format!("{}", *v as i64))
            }
            CellValue::Float(v) => Some(v.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Null => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Best-effort typing of raw text, mirroring what a spreadsheet would
    /// store for the same cell.
    pub fn guess(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return CellValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return CellValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return CellValue::Float(f);
        }
        if s == "true" || s == "false" {
            return CellValue::Bool(s == "true");
        }
        CellValue::String(s.to_string())
    }
}

/// Ordering for regime labels: alphabetic prefix first, then the numeric
/// suffix by value, so `C2` sorts before `C10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    fn split(s: &str) -> (&str, Option<u64>, &str) {
        let start = s.find(|c: char| c.is_ascii_digit()).unwrap_or(s.len());
        let rest = &s[start..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        (&s[..start], rest[..end].parse().ok(), &rest[end..])
    }
    let (pa, na, ra) = split(a);
    let (pb, nb, rb) = split(b);
    pa.cmp(pb)
        .then_with(|| na.cmp(&nb))
        .then_with(|| natural_cmp_tail(ra, rb))
        .then_with(|| a.cmp(b))
}

fn natural_cmp_tail(a: &str, b: &str) -> Ordering {
    if a.is_empty() || b.is_empty() {
        a.len().cmp(&b.len())
    } else {
        natural_cmp(a, b)
    }
}

// ---------------------------------------------------------------------------
// Measurement – one observed scalar
// ---------------------------------------------------------------------------

/// A single observed value (density %, hardness HV, modulus GPa, UTS MPa)
/// tied to a regime.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub regime: String,
    /// 1-based replicate index within the regime, in file order.
    pub replicate: Option<u32>,
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Curve – one replicate trace
// ---------------------------------------------------------------------------

/// An ordered trace such as strain→stress, angle→intensity or
/// temperature→heat flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub regime: String,
    pub replicate: Option<u32>,
    /// Independent variable.
    pub x: Vec<f64>,
    /// Dependent variable – same length as `x`.
    pub y: Vec<f64>,
    /// Extra columns carried by columnar datasets: column_name → value.
    pub metadata: BTreeMap<String, CellValue>,
}

impl Curve {
    pub fn new(regime: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Self {
        Curve {
            regime: regime.into(),
            replicate: None,
            x,
            y,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_replicate(mut self, replicate: u32) -> Self {
        self.replicate = Some(replicate);
        self
    }

    pub fn len(&self) -> usize {
        self.x.len().min(self.y.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pairs as `(x, y)` tuples.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }

    /// Smallest and largest x value, ignoring NaN.
    pub fn x_bounds(&self) -> Option<(f64, f64)> {
        bounds(&self.x)
    }
}

pub(crate) fn bounds(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

// ---------------------------------------------------------------------------
// CurveSet – every curve loaded for one job
// ---------------------------------------------------------------------------

/// Loaded curves with pre-computed metadata column indices.
#[derive(Debug, Clone, Default)]
pub struct CurveSet {
    pub curves: Vec<Curve>,
    /// Ordered list of metadata column names.
    pub column_names: Vec<String>,
    /// For each metadata column the sorted set of unique values.
    pub unique_values: BTreeMap<String, BTreeSet<CellValue>>,
}

impl CurveSet {
    /// Build column indices from the loaded curves.
    pub fn from_curves(curves: Vec<Curve>) -> Self {
        let mut column_names_set: BTreeSet<String> = BTreeSet::new();
        let mut unique_values: BTreeMap<String, BTreeSet<CellValue>> = BTreeMap::new();

        for curve in &curves {
            for (col, val) in &curve.metadata {
                column_names_set.insert(col.clone());
                unique_values
                    .entry(col.clone())
                    .or_default()
                    .insert(val.clone());
            }
        }
        CurveSet {
            curves,
            column_names: column_names_set.into_iter().collect(),
            unique_values,
        }
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Group the curves at `indices` by regime, regimes in natural order and
    /// replicates in load order.
    pub fn group_by_regime(&self, indices: &[usize]) -> Vec<(String, Vec<&Curve>)> {
        let mut groups: Vec<(String, Vec<&Curve>)> = Vec::new();
        for &idx in indices {
            let curve = &self.curves[idx];
            match groups.iter_mut().find(|(regime, _)| *regime == curve.regime) {
                Some((_, members)) => members.push(curve),
                None => groups.push((curve.regime.clone(), vec![curve])),
            }
        }
        groups.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_puts_numeric_suffix_by_value() {
        let mut labels = vec!["C10", "L2", "C2", "C1", "L10", "L1"];
        labels.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(labels, vec!["C1", "C2", "C10", "L1", "L2", "L10"]);
    }

    #[test]
    fn natural_order_handles_plain_numbers_and_text() {
        assert_eq!(natural_cmp("9", "10"), Ordering::Less);
        assert_eq!(natural_cmp("chess", "linear"), Ordering::Less);
        assert_eq!(natural_cmp("C1", "C1"), Ordering::Equal);
    }

    #[test]
    fn labels_drop_integral_fraction() {
        assert_eq!(CellValue::Float(3.0).as_label().as_deref(), Some("3"));
        assert_eq!(CellValue::String(" L4 ".into()).as_label().as_deref(), Some("L4"));
        assert_eq!(CellValue::Null.as_label(), None);
    }

    #[test]
    fn text_cells_parse_with_decimal_comma() {
        let cell = CellValue::String("99,87".into());
        assert_eq!(cell.as_f64(DecimalSeparator::Comma), Some(99.87));
        assert_eq!(cell.as_f64(DecimalSeparator::Dot), None);
    }

    #[test]
    fn grouping_keeps_replicate_order() {
        let set = CurveSet::from_curves(vec![
            Curve::new("L4", vec![0.0], vec![1.0]).with_replicate(1),
            Curve::new("C1", vec![0.0], vec![2.0]).with_replicate(1),
            Curve::new("L4", vec![0.0], vec![3.0]).with_replicate(2),
        ]);
        let groups = set.group_by_regime(&[0, 1, 2]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "C1");
        assert_eq!(groups[1].1[0].y, vec![1.0]);
        assert_eq!(groups[1].1[1].y, vec![3.0]);
    }
}
