//! Shared numeric helpers used across the statistics modules.

use polars::prelude::*;
use statrs::statistics::Statistics;

use crate::config::MissingPolicy;

// =============================================================================
// Series Extraction
// =============================================================================

/// Extract a column as optional floats.
///
/// Numeric and boolean columns cast directly; text is parsed where possible and
/// unparseable entries become `None`.
pub fn numeric_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let float_series = series.cast(&DataType::Float64)?;
    Ok(float_series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Extract a column of a DataFrame as optional floats.
pub fn column_numeric_values(df: &DataFrame, col_key: &str) -> PolarsResult<Vec<Option<f64>>> {
    numeric_values(df.column(col_key)?.as_materialized_series())
}

/// A column coerced to numbers that remembers which entries were missing in the
/// raw data.
///
/// An entry with `values[i] == None` and `missing[i] == false` held something
/// that is not a number (text in a categorical column). Such entries are never
/// counted as missing and never enter a computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericColumn {
    pub values: Vec<Option<f64>>,
    pub missing: Vec<bool>,
}

impl NumericColumn {
    pub fn from_series(series: &Series) -> PolarsResult<Self> {
        let float_input = series.dtype().is_float();
        let cast = series.cast(&DataType::Float64)?;
        let (values, missing) = series
            .is_null()
            .into_iter()
            .zip(cast.f64()?)
            .map(|(null, value)| {
                let is_nan = value.is_some_and(f64::is_nan);
                (
                    value.filter(|x| !x.is_nan()),
                    null.unwrap_or(true) || (float_input && is_nan),
                )
            })
            .unzip();
        Ok(Self { values, missing })
    }

    pub fn from_frame(df: &DataFrame, col_key: &str) -> PolarsResult<Self> {
        Self::from_series(df.column(col_key)?.as_materialized_series())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.missing.iter().filter(|m| **m).count()
    }

    /// The entries at `rows`, in that order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            values: rows.iter().map(|&i| self.values[i]).collect(),
            missing: rows.iter().map(|&i| self.missing[i]).collect(),
        }
    }

    /// Parsed numbers and missing entries; unparseable entries are left out.
    pub fn usable(&self) -> Vec<Option<f64>> {
        self.values
            .iter()
            .zip(&self.missing)
            .filter(|(value, missing)| value.is_some() || **missing)
            .map(|(value, _)| *value)
            .collect()
    }

    /// The series a statistic is computed on under `policy`.
    pub fn effective(&self, policy: MissingPolicy) -> Vec<f64> {
        apply_missing_policy(&self.usable(), policy)
    }
}

/// Numeric data where every `None` is a missing entry.
impl From<Vec<Option<f64>>> for NumericColumn {
    fn from(values: Vec<Option<f64>>) -> Self {
        let missing = values.iter().map(Option::is_none).collect();
        Self { values, missing }
    }
}

/// Apply a missing-value policy: fill with 0 or drop.
pub fn apply_missing_policy(values: &[Option<f64>], policy: MissingPolicy) -> Vec<f64> {
    match policy {
        MissingPolicy::TreatAsZero => values.iter().map(|v| v.unwrap_or(0.0)).collect(),
        MissingPolicy::Drop => values.iter().filter_map(|v| *v).collect(),
    }
}

// =============================================================================
// Rounding
// =============================================================================

/// Round to `decimals` places; NaN and infinities become `None`.
#[inline]
pub fn safe_round(value: f64, decimals: i32) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round() / factor;
    rounded.is_finite().then_some(rounded)
}

/// [`safe_round`] lifted over an optional input.
#[inline]
pub fn safe_round_opt(value: Option<f64>, decimals: i32) -> Option<f64> {
    value.and_then(|v| safe_round(v, decimals))
}

/// Percentage `part / whole * 100` rounded to 2 decimals; 0 when `whole` is 0.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    safe_round(part as f64 / whole as f64 * 100.0, 2).unwrap_or(0.0)
}

/// Human-readable p-value: `p < 0.001` or `p = 0.0123`.
pub fn format_p_value(p: f64) -> String {
    if p < 0.001 {
        "p < 0.001".to_string()
    } else {
        format!("p = {p:.4}")
    }
}

// =============================================================================
// Sample Statistics
// =============================================================================

/// Arithmetic mean; NaN for empty input.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Sample variance (n - 1 denominator). NaN for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    values.iter().variance()
}

pub fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Copy and sort ascending (NaN-free input assumed).
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Quantile with linear interpolation between closest ranks; NaN for empty input.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    Float64Chunked::from_slice("values".into(), values)
        .quantile(q.clamp(0.0, 1.0), QuantileMethod::Linear)
        .ok()
        .flatten()
        .unwrap_or(f64::NAN)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Average ranks (1-based) with ties sharing the mean of their positions.
///
/// Returns the ranks in input order plus the sizes of every tie block.
pub fn average_ranks(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut ties = Vec::new();
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        ties.push(j - i + 1);
        i = j + 1;
    }
    (ranks, ties)
}

/// `sum(t^3 - t)` over tie block sizes.
pub fn tie_term(ties: &[usize]) -> f64 {
    ties.iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_round_handles_non_finite() {
        assert_eq!(safe_round(1.234_56, 4), Some(1.2346));
        assert_eq!(safe_round(f64::NAN, 4), None);
        assert_eq!(safe_round(f64::INFINITY, 2), None);
        assert_eq!(safe_round(-2.5, 0), Some(-3.0));
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 5), 100.0);
    }

    #[test]
    fn test_format_p_value() {
        assert_eq!(format_p_value(0.0004), "p < 0.001");
        assert_eq!(format_p_value(0.04567), "p = 0.0457");
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = [40.0, 0.0, 30.0, 10.0, 20.0];
        assert_eq!(quantile(&values, 0.25), 10.0);
        assert_eq!(median(&values), 20.0);
        assert!((quantile(&values, 0.1) - 4.0).abs() < 1e-12);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_sample_variance() {
        let variance = sample_variance(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((variance - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(mean(&[1.0, 2.0, 6.0]), 3.0);
        assert!(sample_variance(&[1.0]).is_nan());
    }

    #[test]
    fn test_average_ranks_with_ties() {
        let (ranks, ties) = average_ranks(&[10.0, 20.0, 10.0, 30.0]);
        assert_eq!(ranks, vec![1.5, 3.0, 1.5, 4.0]);
        assert_eq!(ties, vec![2, 1, 1]);
        assert_eq!(tie_term(&ties), 6.0);
    }

    #[test]
    fn test_apply_missing_policy() {
        let values = [Some(1.0), None, Some(3.0)];
        assert_eq!(
            apply_missing_policy(&values, MissingPolicy::TreatAsZero),
            vec![1.0, 0.0, 3.0]
        );
        assert_eq!(apply_missing_policy(&values, MissingPolicy::Drop), vec![1.0, 3.0]);
    }

    #[test]
    fn test_numeric_values_parses_text() {
        let series = Series::new("x".into(), &[Some("1.5"), Some("abc"), None, Some("3")]);
        let values = numeric_values(&series).unwrap();
        assert_eq!(values, vec![Some(1.5), None, None, Some(3.0)]);
    }

    #[test]
    fn test_numeric_column_keeps_text_out_of_missing() {
        let series = Series::new("region".into(), &[Some("North"), None, Some("12"), Some("East")]);
        let column = NumericColumn::from_series(&series).unwrap();

        assert_eq!(column.len(), 4);
        assert_eq!(column.missing_count(), 1);
        assert_eq!(column.usable(), vec![None, Some(12.0)]);
        assert_eq!(column.effective(MissingPolicy::TreatAsZero), vec![0.0, 12.0]);
        assert_eq!(column.effective(MissingPolicy::Drop), vec![12.0]);
    }

    #[test]
    fn test_numeric_column_counts_nan_as_missing() {
        let series = Series::new("x".into(), &[Some(1.0), Some(f64::NAN), None]);
        let column = NumericColumn::from_series(&series).unwrap();
        assert_eq!(column.missing, vec![false, true, true]);
        assert_eq!(column.select_rows(&[2, 0]).values, vec![None, Some(1.0)]);
    }
}
