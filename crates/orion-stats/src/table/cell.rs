//! Typed cell values extracted from polars columns.

use polars::prelude::*;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::DtypeTag;
use crate::utils::numeric_values;

/// Label used for the missing category in group keys, crosstabs and frequencies.
pub const MISSING_LABEL: &str = "(missing)";

/// One cell of a table, with missing as its own variant.
///
/// Ordering is natural within a kind (numbers numerically, text
/// lexicographically) and `Missing` always sorts last.
#[derive(Debug, Clone)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Temporal(String),
    Text(String),
    Missing,
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    /// Display label (`(missing)` for missing cells).
    pub fn label(&self) -> String {
        self.to_string()
    }

    fn rank(&self) -> u8 {
        match self {
            CellValue::Bool(_) => 0,
            CellValue::Number(_) => 1,
            CellValue::Temporal(_) => 2,
            CellValue::Text(_) => 3,
            CellValue::Missing => 4,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Number(n) => f.write_str(&format_number(*n)),
            CellValue::Temporal(s) | CellValue::Text(s) => f.write_str(s),
            CellValue::Missing => f.write_str(MISSING_LABEL),
        }
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::Number(a), CellValue::Number(b)) => normalize_zero(*a).total_cmp(&normalize_zero(*b)),
            (CellValue::Temporal(a), CellValue::Temporal(b)) | (CellValue::Text(a), CellValue::Text(b)) => {
                a.cmp(b)
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            CellValue::Bool(b) => b.hash(state),
            CellValue::Number(n) => normalize_zero(*n).to_bits().hash(state),
            CellValue::Temporal(s) | CellValue::Text(s) => s.hash(state),
            CellValue::Missing => {}
        }
    }
}

#[inline]
fn normalize_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

/// Integral values print without a fractional part (`3`, not `3.0`).
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Extract every cell of a column, NaN and nulls becoming `Missing`.
pub fn column_cells(series: &Series) -> PolarsResult<Vec<CellValue>> {
    let tag = DtypeTag::from_dtype(series.dtype());
    let cells = match tag {
        DtypeTag::Integer | DtypeTag::Float => numeric_values(series)?
            .into_iter()
            .map(|v| v.map_or(CellValue::Missing, CellValue::Number))
            .collect(),
        DtypeTag::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(CellValue::Missing, CellValue::Bool))
            .collect(),
        DtypeTag::Text | DtypeTag::Temporal | DtypeTag::Other => {
            let as_text = series.cast(&DataType::String)?;
            as_text
                .str()?
                .into_iter()
                .map(|v| match v {
                    None => CellValue::Missing,
                    Some(s) if tag == DtypeTag::Temporal => CellValue::Temporal(s.to_string()),
                    Some(s) => CellValue::Text(s.to_string()),
                })
                .collect()
        }
    };
    Ok(cells)
}

/// Extract a column of a DataFrame by key.
pub fn frame_column_cells(df: &DataFrame, col_key: &str) -> PolarsResult<Vec<CellValue>> {
    column_cells(df.column(col_key)?.as_materialized_series())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sorts_last() {
        let mut values = vec![
            CellValue::Missing,
            CellValue::Text("b".to_string()),
            CellValue::Text("a".to_string()),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                CellValue::Text("a".to_string()),
                CellValue::Text("b".to_string()),
                CellValue::Missing,
            ]
        );
    }

    #[test]
    fn test_numbers_sort_numerically() {
        let mut values = vec![
            CellValue::Number(10.0),
            CellValue::Missing,
            CellValue::Number(2.0),
        ];
        values.sort();
        assert_eq!(values[0], CellValue::Number(2.0));
        assert_eq!(values[1], CellValue::Number(10.0));
        assert!(values[2].is_missing());
    }

    #[test]
    fn test_labels() {
        assert_eq!(CellValue::Number(3.0).label(), "3");
        assert_eq!(CellValue::Number(2.5).label(), "2.5");
        assert_eq!(CellValue::Missing.label(), MISSING_LABEL);
        assert_eq!(CellValue::Bool(true).label(), "true");
    }

    #[test]
    fn test_column_cells_by_dtype() {
        let ints = Series::new("a".into(), &[Some(1i32), None]);
        assert_eq!(
            column_cells(&ints).unwrap(),
            vec![CellValue::Number(1.0), CellValue::Missing]
        );

        let floats = Series::new("b".into(), &[f64::NAN, 2.0]);
        assert_eq!(
            column_cells(&floats).unwrap(),
            vec![CellValue::Missing, CellValue::Number(2.0)]
        );

        let text = Series::new("c".into(), &[Some("x"), None]);
        assert_eq!(
            column_cells(&text).unwrap(),
            vec![CellValue::Text("x".to_string()), CellValue::Missing]
        );
    }
}
