//! Equality-set row filters.

use polars::prelude::*;
use tracing::debug;

use super::cell::{CellValue, column_cells};
use crate::types::{FilterCondition, FilterValue};

/// Keep rows matching every condition (AND across conditions, OR within one).
///
/// Conditions naming a column absent from the table, or carrying no values,
/// are ignored. Row order is preserved.
pub fn apply_filters(df: &DataFrame, conditions: &[FilterCondition]) -> PolarsResult<DataFrame> {
    let mut mask = vec![true; df.height()];
    let mut applied = 0;

    for condition in conditions {
        if condition.values.is_empty() {
            continue;
        }
        let Ok(column) = df.column(&condition.col_key) else {
            debug!(column = %condition.col_key, "Ignoring filter on unknown column");
            continue;
        };

        let cells = column_cells(column.as_materialized_series())?;
        for (keep, cell) in mask.iter_mut().zip(&cells) {
            if *keep && !condition.values.iter().any(|v| matches_filter(cell, v)) {
                *keep = false;
            }
        }
        applied += 1;
    }

    if applied == 0 {
        return Ok(df.clone());
    }

    let mask = BooleanChunked::from_slice("mask".into(), &mask);
    let filtered = df.filter(&mask)?;
    debug!(
        conditions = applied,
        before = df.height(),
        after = filtered.height(),
        "Applied filters"
    );
    Ok(filtered)
}

/// Whether a cell equals a filter value.
///
/// Numbers compare numerically, booleans also match `0`/`1`, text compares
/// exactly and `null` selects missing cells.
pub fn matches_filter(cell: &CellValue, value: &FilterValue) -> bool {
    match (cell, value) {
        (CellValue::Missing, FilterValue::Null) => true,
        (CellValue::Number(a), FilterValue::Number(b)) => a == b,
        (CellValue::Number(a), FilterValue::Bool(b)) => *a == f64::from(u8::from(*b)),
        (CellValue::Bool(a), FilterValue::Bool(b)) => a == b,
        (CellValue::Bool(a), FilterValue::Number(b)) => f64::from(u8::from(*a)) == *b,
        (CellValue::Text(a), FilterValue::Text(b)) | (CellValue::Temporal(a), FilterValue::Text(b)) => {
            a == b
        }
        _ => false,
    }
}
