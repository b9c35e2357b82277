//! Descriptive statistics for a single numeric variable.

use polars::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::config::MissingPolicy;
use crate::types::ColumnStatistics;
use crate::utils::{NumericColumn, mean, percentage, safe_round, sorted_copy};

/// Values this close to zero are treated as floating point noise in moment sums.
const FP_NOISE: f64 = 1e-14;

/// Compute the full descriptive vector of one variable.
///
/// `column` is the raw column (or group slice). `count`, `missing_count` and
/// `missing_pct` describe the raw input; every other statistic is computed on
/// the series left after applying `policy`. Entries that are present but not
/// numeric never enter that series, so a text column yields counts only.
/// `group_total`, when given, is the denominator for `group_pct`.
pub fn calculate_column_stats(
    col_key: &str,
    name: &str,
    column: &NumericColumn,
    policy: MissingPolicy,
    confidence_level: f64,
    group_total: Option<usize>,
) -> ColumnStatistics {
    let count = column.len();
    let missing_count = column.missing_count();

    let mut stats = ColumnStatistics {
        col_key: col_key.to_string(),
        name: name.to_string(),
        count,
        missing_count,
        missing_pct: percentage(missing_count, count),
        group_pct: group_total
            .filter(|total| *total > 0)
            .map(|total| percentage(count, total)),
        ..Default::default()
    };

    let effective = column.effective(policy);
    if effective.is_empty() {
        return stats;
    }

    let n = effective.len();
    let ca = Float64Chunked::from_slice(col_key.into(), &effective);
    let quantile = |q: f64| {
        ca.quantile(q, QuantileMethod::Linear)
            .ok()
            .flatten()
            .unwrap_or(f64::NAN)
    };

    let avg = ca.mean().unwrap_or(f64::NAN);
    let variance = ca.var(1).unwrap_or(f64::NAN);
    let std = variance.sqrt();
    let sem = std / (n as f64).sqrt();
    let min = ca.min().unwrap_or(f64::NAN);
    let max = ca.max().unwrap_or(f64::NAN);
    let q1 = quantile(0.25);
    let q3 = quantile(0.75);

    stats.mean = safe_round(avg, 4);
    stats.median = safe_round(ca.median().unwrap_or(f64::NAN), 4);
    stats.mode = mode_sorted(&sorted_copy(&effective)).and_then(|m| safe_round(m, 4));
    stats.std = safe_round(std, 4);
    stats.variance = safe_round(variance, 4);
    stats.min = safe_round(min, 4);
    stats.max = safe_round(max, 4);
    stats.q1 = safe_round(q1, 4);
    stats.q3 = safe_round(q3, 4);
    stats.iqr = safe_round(q3 - q1, 4);
    stats.sem = safe_round(sem, 4);
    stats.cv = if avg != 0.0 {
        safe_round(std / avg * 100.0, 4)
    } else {
        None
    };
    stats.range = safe_round(max - min, 4);
    stats.p5 = safe_round(quantile(0.05), 4);
    stats.p10 = safe_round(quantile(0.10), 4);
    stats.p90 = safe_round(quantile(0.90), 4);
    stats.p95 = safe_round(quantile(0.95), 4);
    stats.skewness = skewness(&effective).and_then(|s| safe_round(s, 4));
    stats.kurtosis = excess_kurtosis(&effective).and_then(|k| safe_round(k, 4));
    stats.sum = safe_round(ca.sum().unwrap_or(0.0), 4);

    if let Some((lower, upper)) = mean_confidence_interval(avg, sem, n, confidence_level) {
        stats.ci_lower = safe_round(lower, 4);
        stats.ci_upper = safe_round(upper, 4);
    }

    stats
}

/// Most frequent value of sorted data; the smallest one wins ties.
pub fn mode_sorted(sorted: &[f64]) -> Option<f64> {
    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1] == sorted[i] {
            j += 1;
        }
        let run = j - i + 1;
        if best.is_none_or(|(_, count)| run > count) {
            best = Some((sorted[i], run));
        }
        i = j + 1;
    }
    best.map(|(value, _)| value)
}

/// Adjusted Fisher-Pearson sample skewness. Needs at least 3 values; 0 for constant data.
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let avg = mean(values);
    let (m2, m3) = values.iter().fold((0.0, 0.0), |(m2, m3), v| {
        let d = v - avg;
        (m2 + d * d, m3 + d * d * d)
    });
    let m2 = zero_out_noise(m2);
    let m3 = zero_out_noise(m3);
    if m2 == 0.0 {
        return Some(0.0);
    }

    let n = n as f64;
    Some((n * (n - 1.0).sqrt() / (n - 2.0)) * (m3 / m2.powf(1.5)))
}

/// Bias-adjusted sample excess kurtosis. Needs at least 4 values; 0 for constant data.
pub fn excess_kurtosis(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 4 {
        return None;
    }
    let avg = mean(values);
    let (m2, m4) = values.iter().fold((0.0, 0.0), |(m2, m4), v| {
        let d2 = (v - avg).powi(2);
        (m2 + d2, m4 + d2 * d2)
    });

    let n = n as f64;
    let adj = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
    let numerator = zero_out_noise(n * (n + 1.0) * (n - 1.0) * m4);
    let denominator = zero_out_noise((n - 2.0) * (n - 3.0) * m2 * m2);
    if denominator == 0.0 {
        return Some(0.0);
    }
    Some(numerator / denominator - adj)
}

/// Two-sided t-based interval for the mean, when `n > 1` and `sem > 0`.
pub fn mean_confidence_interval(
    mean: f64,
    sem: f64,
    n: usize,
    confidence_level: f64,
) -> Option<(f64, f64)> {
    if n < 2 || !(sem > 0.0) || !sem.is_finite() {
        return None;
    }
    let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64).ok()?;
    let critical = dist.inverse_cdf((1.0 + confidence_level) / 2.0);
    let margin = critical * sem;
    Some((mean - margin, mean + margin))
}

#[inline]
fn zero_out_noise(value: f64) -> f64 {
    if value.abs() < FP_NOISE { 0.0 } else { value }
}
