//! Filter & group engine.
//!
//! Rows are filtered with equality-set conditions, then partitioned by the
//! normalized values of one or more grouping columns. Missing values are a
//! first-class [`CellValue::Missing`] variant rather than a sentinel string.

mod cell;
mod filter;
mod grouping;

pub use cell::{CellValue, MISSING_LABEL, column_cells, format_number, frame_column_cells};
pub use filter::{apply_filters, matches_filter};
pub use grouping::{
    GROUP_KEY_SEPARATOR, Group, GroupKey, GroupSort, group_mean_for_sort, group_table, normalize_group_value,
    partition, sort_groups, truncate_groups,
};
