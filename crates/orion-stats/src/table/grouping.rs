//! Partitioning rows into groups by one or more key columns.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::cell::{CellValue, frame_column_cells};

/// Separator between per-column labels in a composite group key.
pub const GROUP_KEY_SEPARATOR: &str = " | ";

/// Order in which groups are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSort {
    /// Natural key order, missing last.
    #[default]
    Key,
    /// Largest groups first.
    Count,
    /// By mean of the reference variable, ascending.
    MeanAsc,
    /// By mean of the reference variable, descending.
    MeanDesc,
}

/// Composite key of a group: one normalized value per grouping column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(pub Vec<CellValue>);

impl GroupKey {
    /// Values joined with `" | "`.
    pub fn label(&self) -> String {
        self.0
            .iter()
            .map(CellValue::label)
            .collect::<Vec<_>>()
            .join(GROUP_KEY_SEPARATOR)
    }

    /// Map each grouping column key to this group's label for it.
    pub fn labels(&self, group_by: &[String]) -> BTreeMap<String, String> {
        group_by
            .iter()
            .zip(&self.0)
            .map(|(col, value)| (col.clone(), value.label()))
            .collect()
    }
}

/// Rows of the (filtered) table belonging to one group.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: GroupKey,
    /// Row indices into the table the partition was computed on.
    pub rows: Vec<usize>,
}

impl Group {
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Pick this group's entries out of a full-length column.
    pub fn select<T: Clone>(&self, values: &[T]) -> Vec<T> {
        self.rows.iter().map(|&i| values[i].clone()).collect()
    }
}

/// Normalize a grouping value so cosmetic whitespace differences merge.
///
/// Text collapses internal whitespace runs to one space and is trimmed; text
/// that ends up empty becomes missing. Other kinds pass through unchanged.
pub fn normalize_group_value(value: CellValue) -> CellValue {
    match value {
        CellValue::Text(s) => {
            let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
            if normalized.is_empty() {
                CellValue::Missing
            } else {
                CellValue::Text(normalized)
            }
        }
        other => other,
    }
}

/// Partition the table by the normalized values of `group_by`.
///
/// Every row lands in exactly one group (missing keys form their own group).
/// Groups come back in natural key order.
pub fn partition(df: &DataFrame, group_by: &[String]) -> PolarsResult<Vec<Group>> {
    let key_columns: Vec<Vec<CellValue>> = group_by
        .iter()
        .map(|col| {
            frame_column_cells(df, col)
                .map(|cells| cells.into_iter().map(normalize_group_value).collect())
        })
        .collect::<PolarsResult<_>>()?;

    let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
    for row in 0..df.height() {
        let key = GroupKey(key_columns.iter().map(|col| col[row].clone()).collect());
        groups.entry(key).or_default().push(row);
    }

    Ok(groups
        .into_iter()
        .map(|(key, rows)| Group { key, rows })
        .collect())
}

/// Mean of the numeric values a group holds in `reference`, or −∞ when it has none.
pub fn group_mean_for_sort(group: &Group, reference: &[Option<f64>]) -> f64 {
    let values: Vec<f64> = group.rows.iter().filter_map(|&i| reference[i]).collect();
    if values.is_empty() {
        f64::NEG_INFINITY
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Reorder groups in place. Sorting is stable so ties keep key order.
///
/// Mean-based orders need the reference variable's values (full table length);
/// without one they fall back to key order.
pub fn sort_groups(groups: &mut [Group], sort: GroupSort, reference: Option<&[Option<f64>]>) {
    match (sort, reference) {
        (GroupSort::Count, _) => groups.sort_by(|a, b| b.size().cmp(&a.size())),
        (GroupSort::MeanAsc | GroupSort::MeanDesc, Some(values)) => {
            let means: HashMap<GroupKey, f64> = groups
                .iter()
                .map(|g| (g.key.clone(), group_mean_for_sort(g, values)))
                .collect();
            groups.sort_by(|a, b| {
                let ordering = means[&a.key].total_cmp(&means[&b.key]);
                if sort == GroupSort::MeanDesc {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        _ => groups.sort_by(|a, b| a.key.cmp(&b.key)),
    }
}

/// Partition and order in one step.
pub fn group_table(
    df: &DataFrame,
    group_by: &[String],
    sort: GroupSort,
    reference: Option<&[Option<f64>]>,
) -> PolarsResult<Vec<Group>> {
    let mut groups = partition(df, group_by)?;
    sort_groups(&mut groups, sort, reference);
    Ok(groups)
}

/// Keep at most `max_groups` groups; returns the kept groups and the total count.
pub fn truncate_groups(mut groups: Vec<Group>, max_groups: usize) -> (Vec<Group>, usize) {
    let total = groups.len();
    groups.truncate(max_groups);
    (groups, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    // ==================== normalize_group_value tests ====================

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_group_value(text("  São   Paulo ")), text("São Paulo"));
        assert_eq!(normalize_group_value(text("a\tb\nc")), text("a b c"));
    }

    #[test]
    fn test_normalize_blank_becomes_missing() {
        assert!(normalize_group_value(text("   ")).is_missing());
        assert!(normalize_group_value(CellValue::Missing).is_missing());
    }

    #[test]
    fn test_normalize_leaves_numbers() {
        assert_eq!(
            normalize_group_value(CellValue::Number(4.0)),
            CellValue::Number(4.0)
        );
    }

    // ==================== partition tests ====================

    fn frame() -> DataFrame {
        df!(
            "city" => [Some("Rio "), Some(" Rio"), Some("Lima"), None, Some("Lima"), Some("Rio")],
            "tier" => [1i64, 1, 2, 2, 2, 1],
            "sales" => [Some(10.0), Some(20.0), Some(5.0), Some(7.0), None, Some(30.0)]
        )
        .unwrap()
    }

    #[test]
    fn test_partition_merges_whitespace_variants() {
        let df = frame();
        let groups = partition(&df, &["city".to_string()]).unwrap();

        let labels: Vec<String> = groups.iter().map(|g| g.key.label()).collect();
        assert_eq!(labels, vec!["Lima", "Rio", "(missing)"]);
        assert_eq!(groups[1].rows, vec![0, 1, 5]);
    }

    #[test]
    fn test_partition_covers_every_row() {
        let df = frame();
        let groups = partition(&df, &["city".to_string(), "tier".to_string()]).unwrap();
        let total: usize = groups.iter().map(Group::size).sum();
        assert_eq!(total, df.height());
        assert_eq!(groups[0].key.label(), "Lima | 2");
    }

    #[test]
    fn test_group_labels_map() {
        let df = frame();
        let group_by = vec!["city".to_string(), "tier".to_string()];
        let groups = partition(&df, &group_by).unwrap();
        let labels = groups[0].key.labels(&group_by);
        assert_eq!(labels.get("city").map(String::as_str), Some("Lima"));
        assert_eq!(labels.get("tier").map(String::as_str), Some("2"));
    }

    // ==================== sort_groups tests ====================

    #[test]
    fn test_sort_by_count_descending() {
        let df = frame();
        let mut groups = partition(&df, &["city".to_string()]).unwrap();
        sort_groups(&mut groups, GroupSort::Count, None);
        let labels: Vec<String> = groups.iter().map(|g| g.key.label()).collect();
        assert_eq!(labels, vec!["Rio", "Lima", "(missing)"]);
    }

    #[test]
    fn test_sort_by_mean_puts_empty_groups_at_negative_infinity() {
        let df = df!(
            "g" => ["a", "b", "c", "c"],
            "x" => [Some(5.0), None, Some(1.0), Some(2.0)]
        )
        .unwrap();
        let reference = crate::utils::column_numeric_values(&df, "x").unwrap();
        let mut groups = partition(&df, &["g".to_string()]).unwrap();

        sort_groups(&mut groups, GroupSort::MeanAsc, Some(&reference));
        let asc: Vec<String> = groups.iter().map(|g| g.key.label()).collect();
        assert_eq!(asc, vec!["b", "c", "a"]);

        sort_groups(&mut groups, GroupSort::MeanDesc, Some(&reference));
        let desc: Vec<String> = groups.iter().map(|g| g.key.label()).collect();
        assert_eq!(desc, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_group_table_sorts_partition() {
        let df = frame();
        let groups = group_table(&df, &["city".to_string()], GroupSort::Count, None).unwrap();
        assert_eq!(groups[0].key.label(), "Rio");
        assert_eq!(groups[0].size(), 3);
    }

    #[test]
    fn test_truncate_groups_reports_total() {
        let df = frame();
        let groups = partition(&df, &["city".to_string()]).unwrap();
        let (kept, total) = truncate_groups(groups, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(total, 3);
    }
}
