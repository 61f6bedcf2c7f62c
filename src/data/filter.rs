use std::collections::{BTreeMap, BTreeSet};

use super::model::{CellValue, CurveSet};

// ---------------------------------------------------------------------------
// Filter predicate: which unique values are selected per column
// ---------------------------------------------------------------------------

/// Per-column selection: maps column_name → set of accepted values.
/// The pseudo-column `regime` matches the curve's regime label even when the
/// source had no such metadata column.
pub type FilterState = BTreeMap<String, BTreeSet<CellValue>>;

/// Build a [`FilterState`] from the plain string lists of a job file.
/// Numeric-looking strings are typed the same way loaded cells are, so
/// `"replicate": ["1"]` matches an integer column.
pub fn filter_from_lists(lists: &BTreeMap<String, Vec<String>>) -> FilterState {
    lists
        .iter()
        .map(|(col, vals)| {
            let set = vals
                .iter()
                .flat_map(|v| [CellValue::guess(v), CellValue::String(v.clone())])
                .collect();
            (col.clone(), set)
        })
        .collect()
}

/// Return indices of curves that pass all filters.
///
/// A curve passes a column filter when:
/// * The filter set for that column is empty → nothing selected → fails
/// * The curve's value for that column is in the selected set → passes
/// * The curve lacks the column → passes only if `Null` is selected
pub fn filtered_indices(set: &CurveSet, filters: &FilterState) -> Vec<usize> {
    set.curves
        .iter()
        .enumerate()
        .filter(|(_, curve)| {
            filters.iter().all(|(col, selected)| {
                if selected.is_empty() {
                    return false;
                }
                // Everything selected means no effective constraint.
                if set
                    .unique_values
                    .get(col)
                    .is_some_and(|all| all.is_subset(selected))
                {
                    return true;
                }
                if col == "regime" {
                    return selected.contains(&CellValue::String(curve.regime.clone()));
                }
                match curve.metadata.get(col) {
                    Some(val) => selected.contains(val),
                    None => selected.contains(&CellValue::Null),
                }
            })
        })
        .map(|(i, _)| i)
        .collect()
}
