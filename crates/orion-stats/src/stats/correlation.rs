//! Pearson correlation matrix over numeric variables.

use serde::Serialize;
use tracing::debug;

use crate::config::MissingPolicy;
use crate::utils::{mean, safe_round};

/// One variable's raw values, tagged with its key and display name.
#[derive(Debug, Clone)]
pub struct NamedSeries {
    pub col_key: String,
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl NamedSeries {
    pub fn new(col_key: impl Into<String>, name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            col_key: col_key.into(),
            name: name.into(),
            values,
        }
    }
}

/// Square matrix of coefficients. Empty when fewer than two variables survive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub col_keys: Vec<String>,
    pub variables: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Compute the Pearson matrix for aligned series.
///
/// `TreatAsZero` fills missing cells with 0; `Drop` removes every row where any
/// selected variable is missing. Variables left with no values or zero
/// variance are dropped from the matrix. Coefficients are rounded to 2
/// decimals and undefined ones become 0.
pub fn correlation_matrix(series: &[NamedSeries], policy: MissingPolicy) -> CorrelationMatrix {
    let rows = series.iter().map(|s| s.values.len()).min().unwrap_or(0);

    let kept_rows: Vec<usize> = match policy {
        MissingPolicy::TreatAsZero => (0..rows).collect(),
        MissingPolicy::Drop => (0..rows)
            .filter(|&i| series.iter().all(|s| s.values[i].is_some()))
            .collect(),
    };

    let columns: Vec<(&NamedSeries, Vec<f64>)> = series
        .iter()
        .map(|s| {
            let values = kept_rows
                .iter()
                .map(|&i| s.values[i].unwrap_or(0.0))
                .collect::<Vec<f64>>();
            (s, values)
        })
        .filter(|(s, values)| {
            let keep = has_spread(values);
            if !keep {
                debug!(col_key = %s.col_key, "Dropping constant or empty variable from correlation");
            }
            keep
        })
        .collect();

    if columns.len() < 2 {
        return CorrelationMatrix::default();
    }

    let matrix = columns
        .iter()
        .map(|(_, x)| {
            columns
                .iter()
                .map(|(_, y)| safe_round(pearson(x, y), 2).unwrap_or(0.0))
                .collect()
        })
        .collect();

    CorrelationMatrix {
        col_keys: columns.iter().map(|(s, _)| s.col_key.clone()).collect(),
        variables: columns.iter().map(|(s, _)| s.name.clone()).collect(),
        matrix,
    }
}

/// Pearson correlation coefficient; NaN when either side has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let (mx, my) = (mean(&x[..n]), mean(&y[..n]));
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

fn has_spread(values: &[f64]) -> bool {
    match values.split_first() {
        Some((first, rest)) if !rest.is_empty() => rest.iter().any(|v| v != first),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn series(key: &str, values: &[Option<f64>]) -> NamedSeries {
        NamedSeries::new(key, key.to_uppercase(), values.to_vec())
    }

    #[test]
    fn test_perfect_positive_and_negative() {
        let input = vec![
            series("a", &[Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            series("b", &[Some(2.0), Some(4.0), Some(6.0), Some(8.0)]),
            series("c", &[Some(4.0), Some(3.0), Some(2.0), Some(1.0)]),
        ];
        let result = correlation_matrix(&input, MissingPolicy::Drop);

        assert_eq!(result.variables, vec!["A", "B", "C"]);
        assert_eq!(
            result.matrix,
            vec![
                vec![1.0, 1.0, -1.0],
                vec![1.0, 1.0, -1.0],
                vec![-1.0, -1.0, 1.0],
            ]
        );
    }

    #[test]
    fn test_constant_column_is_dropped() {
        let input = vec![
            series("a", &[Some(1.0), Some(2.0), Some(3.0)]),
            series("flat", &[Some(5.0), Some(5.0), Some(5.0)]),
            series("b", &[Some(3.0), Some(1.0), Some(2.0)]),
        ];
        let result = correlation_matrix(&input, MissingPolicy::TreatAsZero);
        assert_eq!(result.col_keys, vec!["a", "b"]);
        assert_eq!(result.matrix.len(), 2);
        assert_eq!(result.matrix[0][1], -0.5);
    }

    #[test]
    fn test_fewer_than_two_survivors_is_empty() {
        let input = vec![
            series("a", &[Some(1.0), Some(2.0)]),
            series("flat", &[Some(5.0), Some(5.0)]),
        ];
        assert!(correlation_matrix(&input, MissingPolicy::Drop).is_empty());
    }

    #[test]
    fn test_drop_is_listwise() {
        let input = vec![
            series("a", &[Some(1.0), Some(2.0), None, Some(4.0)]),
            series("b", &[Some(1.0), Some(2.0), Some(100.0), Some(4.0)]),
        ];
        let dropped = correlation_matrix(&input, MissingPolicy::Drop);
        assert_eq!(dropped.matrix[0][1], 1.0);

        let zero_filled = correlation_matrix(&input, MissingPolicy::TreatAsZero);
        assert!(zero_filled.matrix[0][1] < 0.0);
    }

    #[test]
    fn test_pearson_undefined_without_variance() {
        assert!(pearson(&[1.0, 1.0], &[1.0, 2.0]).is_nan());
    }
}
