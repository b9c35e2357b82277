//! Column profiling for uploaded tables.
//!
//! This module provides:
//! - Column key sanitization (stable ASCII identifiers for arbitrary headers)
//! - Variable type classification (categorical / discrete / continuous)
//! - Per-column metadata (distinct and missing counts)

mod column_keys;
mod type_inference;

use polars::prelude::*;
use tracing::debug;

use crate::config::TypeThresholds;
use crate::types::{ColumnMeta, DtypeTag};
use crate::utils::numeric_values;

pub use column_keys::{sanitize_column_name, unique_column_keys};
pub use type_inference::{classify_column, classify_numeric};

use type_inference::distinct_count;

/// Column profiler producing [`ColumnMeta`] records.
pub struct DataProfiler;

impl DataProfiler {
    /// Profile every column of a freshly loaded table.
    ///
    /// Keys are derived from the headers and made unique within the table.
    pub fn analyze_columns(df: &DataFrame, thresholds: &TypeThresholds) -> PolarsResult<Vec<ColumnMeta>> {
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        let keys = unique_column_keys(names.iter().map(String::as_str));

        names
            .iter()
            .zip(keys)
            .map(|(name, key)| {
                let series = df.column(name)?.as_materialized_series();
                Self::profile_column(series, name, &key, thresholds)
            })
            .collect()
    }

    /// Profile a single column under an already assigned key.
    pub fn profile_column(
        series: &Series,
        name: &str,
        col_key: &str,
        thresholds: &TypeThresholds,
    ) -> PolarsResult<ColumnMeta> {
        let dtype = DtypeTag::from_dtype(series.dtype());

        let (unique_count, missing_count) = if dtype.is_numeric() {
            let values: Vec<f64> = numeric_values(series)?.into_iter().flatten().collect();
            (distinct_count(&values), series.len() - values.len())
        } else {
            (series.drop_nulls().n_unique()?, series.null_count())
        };

        let var_type = classify_column(series, thresholds)?;
        debug!(
            column = name,
            key = col_key,
            ?dtype,
            %var_type,
            unique_count,
            missing_count,
            "Profiled column"
        );

        Ok(ColumnMeta {
            name: name.to_string(),
            col_key: col_key.to_string(),
            dtype,
            var_type,
            unique_count,
            missing_count,
        })
    }

    /// Rename the table's columns to their keys, in column order.
    pub fn rename_columns_to_keys(df: &mut DataFrame, columns: &[ColumnMeta]) -> PolarsResult<()> {
        df.set_column_names(columns.iter().map(|c| c.col_key.as_str()))
    }
}
