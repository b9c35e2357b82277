//! Variable type classification.

use polars::prelude::*;
use std::collections::HashSet;

use crate::config::TypeThresholds;
use crate::types::{DtypeTag, VarType};
use crate::utils::numeric_values;

/// Classify a column as categorical, discrete or continuous.
///
/// Non-numeric storage (text, boolean, temporal) is categorical. Numeric
/// columns with no observed values default to continuous; otherwise a column
/// is discrete when it has few distinct values in absolute terms or relative
/// to its size.
pub fn classify_column(series: &Series, thresholds: &TypeThresholds) -> PolarsResult<VarType> {
    if !DtypeTag::from_dtype(series.dtype()).is_numeric() {
        return Ok(VarType::Categorical);
    }

    let values: Vec<f64> = numeric_values(series)?.into_iter().flatten().collect();
    let unique = distinct_count(&values);
    Ok(classify_numeric(unique, values.len(), thresholds))
}

/// Classification rule for a numeric column given its distinct and non-missing counts.
pub fn classify_numeric(unique: usize, non_missing: usize, thresholds: &TypeThresholds) -> VarType {
    if non_missing == 0 {
        return VarType::Continuous;
    }
    let ratio = unique as f64 / non_missing as f64;
    if unique <= thresholds.discrete_threshold || ratio <= thresholds.discrete_ratio {
        VarType::Discrete
    } else {
        VarType::Continuous
    }
}

/// Number of distinct values, treating `0.0` and `-0.0` as equal.
pub(crate) fn distinct_count(values: &[f64]) -> usize {
    values
        .iter()
        .map(|v| if *v == 0.0 { 0u64 } else { v.to_bits() })
        .collect::<HashSet<_>>()
        .len()
}
