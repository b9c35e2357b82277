//! Frequency tables.

use serde::Serialize;
use std::collections::HashMap;

use crate::config::MissingPolicy;
use crate::table::CellValue;
use crate::utils::safe_round;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyRow {
    pub value: String,
    pub count: usize,
    pub percentage: f64,
    pub cumulative_count: usize,
    pub cumulative_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyTable {
    pub variable: String,
    pub variable_name: String,
    /// Observations counted (after the missing-value policy, before truncation).
    pub total: usize,
    /// Distinct values seen before truncation.
    pub distinct_values: usize,
    pub truncated: bool,
    pub rows: Vec<FrequencyRow>,
}

/// Count values of one column.
///
/// Rows are ordered by descending count, ties by first appearance. Only the
/// first `max_categories` rows are kept and percentages (cumulative ones
/// included) are computed against what is kept.
pub fn frequency_table(
    variable: &str,
    variable_name: &str,
    cells: &[CellValue],
    policy: MissingPolicy,
    max_categories: usize,
) -> FrequencyTable {
    let mut index: HashMap<&CellValue, usize> = HashMap::new();
    let mut counts: Vec<(&CellValue, usize)> = Vec::new();
    for cell in cells {
        if policy == MissingPolicy::Drop && cell.is_missing() {
            continue;
        }
        match index.get(cell) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                index.insert(cell, counts.len());
                counts.push((cell, 1));
            }
        }
    }

    let total: usize = counts.iter().map(|(_, c)| c).sum();
    let distinct_values = counts.len();

    // Stable sort keeps first appearance among equal counts.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    let truncated = counts.len() > max_categories;
    counts.truncate(max_categories);

    let kept_total: usize = counts.iter().map(|(_, c)| c).sum();
    let pct = |count: usize| {
        if kept_total == 0 {
            0.0
        } else {
            safe_round(count as f64 / kept_total as f64 * 100.0, 2).unwrap_or(0.0)
        }
    };

    let mut cumulative = 0;
    let rows = counts
        .into_iter()
        .map(|(value, count)| {
            cumulative += count;
            FrequencyRow {
                value: value.label(),
                count,
                percentage: pct(count),
                cumulative_count: cumulative,
                cumulative_percentage: pct(cumulative),
            }
        })
        .collect();

    FrequencyTable {
        variable: variable.to_string(),
        variable_name: variable_name.to_string(),
        total,
        distinct_values,
        truncated,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cells(values: &[Option<&str>]) -> Vec<CellValue> {
        values
            .iter()
            .map(|v| v.map_or(CellValue::Missing, |s| CellValue::Text(s.to_string())))
            .collect()
    }

    #[test]
    fn test_sorted_by_count_then_first_appearance() {
        let input = cells(&[Some("b"), Some("a"), Some("a"), Some("c"), Some("b"), Some("d")]);
        let table = frequency_table("x", "X", &input, MissingPolicy::Drop, 200);

        let values: Vec<&str> = table.rows.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["b", "a", "c", "d"]);
        assert_eq!(table.rows[0].count, 2);
        assert_eq!(table.rows[0].percentage, 33.33);
        assert_eq!(table.rows[1].cumulative_count, 4);
        assert_eq!(table.rows[3].cumulative_percentage, 100.0);
        assert!(!table.truncated);
    }

    #[test]
    fn test_missing_follows_policy() {
        let input = cells(&[Some("a"), None, None]);

        let kept = frequency_table("x", "X", &input, MissingPolicy::TreatAsZero, 200);
        assert_eq!(kept.rows[0].value, "(missing)");
        assert_eq!(kept.total, 3);

        let dropped = frequency_table("x", "X", &input, MissingPolicy::Drop, 200);
        assert_eq!(dropped.rows.len(), 1);
        assert_eq!(dropped.total, 1);
    }

    #[test]
    fn test_truncation_recomputes_percentages() {
        let input = cells(&[Some("a"), Some("a"), Some("a"), Some("b"), Some("c")]);
        let table = frequency_table("x", "X", &input, MissingPolicy::Drop, 2);

        assert!(table.truncated);
        assert_eq!(table.distinct_values, 3);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].percentage, 75.0);
        assert_eq!(table.rows[1].cumulative_percentage, 100.0);
    }

    #[test]
    fn test_numbers_use_plain_labels() {
        let input = vec![CellValue::Number(3.0), CellValue::Number(2.5), CellValue::Number(3.0)];
        let table = frequency_table("x", "X", &input, MissingPolicy::Drop, 200);
        assert_eq!(table.rows[0].value, "3");
        assert_eq!(table.rows[1].value, "2.5");
    }
}
