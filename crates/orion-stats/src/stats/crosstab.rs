//! Two-way contingency tables with a chi-square test of independence.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::inference::chi_square_independence;
use crate::config::MissingPolicy;
use crate::table::CellValue;
use crate::utils::{format_p_value, safe_round};

/// Row and column category limits for a crosstab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrosstabLimits {
    pub max_rows: usize,
    pub max_cols: usize,
}

/// Chi-square test attached to a crosstab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChiSquareSummary {
    pub chi_square: f64,
    pub p_value: f64,
    pub dof: usize,
    pub cramers_v: Option<f64>,
    pub significant: bool,
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Crosstab {
    pub row_variable: String,
    pub col_variable: String,
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
    /// Percent of the grand total, 2 decimals.
    pub percentages: Vec<Vec<f64>>,
    pub row_totals: Vec<usize>,
    pub col_totals: Vec<usize>,
    pub grand_total: usize,
    /// Present when both dimensions have at least two categories and the test is defined.
    pub chi_square: Option<ChiSquareSummary>,
}

/// Cross-tabulate two aligned columns.
///
/// `TreatAsZero` keeps missing cells as their own `(missing)` category, `Drop`
/// removes rows missing either value. Categories are in natural order; rows
/// are truncated to the largest totals first, then columns are truncated on
/// what remains.
pub fn crosstab(
    row_variable: &str,
    col_variable: &str,
    rows: &[CellValue],
    cols: &[CellValue],
    policy: MissingPolicy,
    limits: CrosstabLimits,
    alpha: f64,
) -> Crosstab {
    let mut cells: BTreeMap<(&CellValue, &CellValue), usize> = BTreeMap::new();
    for (r, c) in rows.iter().zip(cols) {
        if policy == MissingPolicy::Drop && (r.is_missing() || c.is_missing()) {
            continue;
        }
        *cells.entry((r, c)).or_default() += 1;
    }

    let mut row_totals: BTreeMap<&CellValue, usize> = BTreeMap::new();
    for ((r, _), count) in &cells {
        *row_totals.entry(*r).or_default() += count;
    }
    let row_keys = largest(row_totals, limits.max_rows);

    let mut col_totals: BTreeMap<&CellValue, usize> = BTreeMap::new();
    for ((r, c), count) in &cells {
        if row_keys.contains(r) {
            *col_totals.entry(*c).or_default() += count;
        }
    }
    let col_keys = largest(col_totals, limits.max_cols);

    let counts: Vec<Vec<usize>> = row_keys
        .iter()
        .map(|r| {
            col_keys
                .iter()
                .map(|c| cells.get(&(*r, *c)).copied().unwrap_or(0))
                .collect()
        })
        .collect();

    let row_totals: Vec<usize> = counts.iter().map(|row| row.iter().sum()).collect();
    let col_totals: Vec<usize> = (0..col_keys.len())
        .map(|j| counts.iter().map(|row| row[j]).sum())
        .collect();
    let grand_total: usize = row_totals.iter().sum();

    let percentages = counts
        .iter()
        .map(|row| {
            row.iter()
                .map(|&count| {
                    if grand_total == 0 {
                        0.0
                    } else {
                        safe_round(count as f64 / grand_total as f64 * 100.0, 2).unwrap_or(0.0)
                    }
                })
                .collect()
        })
        .collect();

    let chi_square = if row_keys.len() >= 2 && col_keys.len() >= 2 {
        chi_square_summary(row_variable, col_variable, &counts, grand_total, alpha)
    } else {
        None
    };

    Crosstab {
        row_variable: row_variable.to_string(),
        col_variable: col_variable.to_string(),
        row_labels: row_keys.iter().map(|k| k.label()).collect(),
        col_labels: col_keys.iter().map(|k| k.label()).collect(),
        counts,
        percentages,
        row_totals,
        col_totals,
        grand_total,
        chi_square,
    }
}

/// Keep the `limit` categories with the largest totals, returned in natural order.
fn largest(totals: BTreeMap<&CellValue, usize>, limit: usize) -> Vec<&CellValue> {
    let mut ranked: Vec<(&CellValue, usize)> = totals.into_iter().collect();
    if ranked.len() > limit {
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(limit);
        ranked.sort_by(|a, b| a.0.cmp(b.0));
    }
    ranked.into_iter().map(|(k, _)| k).collect()
}

fn chi_square_summary(
    row_variable: &str,
    col_variable: &str,
    counts: &[Vec<usize>],
    grand_total: usize,
    alpha: f64,
) -> Option<ChiSquareSummary> {
    let observed: Vec<Vec<f64>> = counts
        .iter()
        .map(|row| row.iter().map(|&c| c as f64).collect())
        .collect();

    let outcome = match chi_square_independence(&observed) {
        Ok(outcome) if outcome.is_finite() => outcome,
        Ok(_) => return None,
        Err(err) => {
            debug!(error = %err, "Chi-square not computed for crosstab");
            return None;
        }
    };

    let dof = outcome.df.map_or(0, |df| df as usize);
    let min_dim = counts.len().min(counts.first().map_or(0, Vec::len));
    let cramers_v = cramers_v(outcome.statistic, grand_total, min_dim);
    let significant = outcome.p_value < alpha;

    let strength = cramers_v.map_or("undetermined", association_strength);
    let verdict = if significant {
        "statistically significant"
    } else {
        "not statistically significant"
    };
    let interpretation = format!(
        "The association between {row_variable} and {col_variable} is {verdict} (chi-square = {:.2}, {}) with {strength} strength (Cramér's V = {}).",
        outcome.statistic,
        format_p_value(outcome.p_value),
        cramers_v.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
    );

    Some(ChiSquareSummary {
        chi_square: safe_round(outcome.statistic, 4)?,
        p_value: safe_round(outcome.p_value, 6)?,
        dof,
        cramers_v: cramers_v.and_then(|v| safe_round(v, 4)),
        significant,
        interpretation,
    })
}

/// Cramér's V for a table of `n` observations whose smaller side has `min_dim` categories.
pub fn cramers_v(chi_square: f64, n: usize, min_dim: usize) -> Option<f64> {
    if n == 0 || min_dim < 2 {
        return None;
    }
    let v = (chi_square / (n as f64 * (min_dim - 1) as f64)).sqrt();
    v.is_finite().then_some(v)
}

/// Verbal strength of a Cramér's V.
pub fn association_strength(v: f64) -> &'static str {
    if v < 0.1 {
        "weak"
    } else if v < 0.3 {
        "moderate"
    } else {
        "strong"
    }
}
