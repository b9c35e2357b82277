//! Request layer tying the store, the cache and the calculators together.
//!
//! Every request follows the same steps: look up the dataset record, reject
//! unknown variables before doing any work, load the table through the
//! [`DatasetCache`], apply filters and run the calculator. Requests never
//! mutate shared state except the cache itself.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::DatasetCache;
use crate::config::{AnalysisConfig, MissingPolicy};
use crate::error::{Result, ResultExt, StatsError};
use crate::profiler::DataProfiler;
use crate::stats::comparison::{LabelledValues, compare_groups};
use crate::stats::correlation::{NamedSeries, correlation_matrix};
use crate::stats::crosstab::{Crosstab, CrosstabLimits, crosstab};
use crate::stats::descriptive::calculate_column_stats;
use crate::stats::frequency::{FrequencyTable, frequency_table};
use crate::stats::hypothesis::{HypothesisTestRequest, HypothesisTestResult, run_hypothesis_test};
use crate::stats::normality::{VariableNormality, assess_normality, recommendation};
use crate::store::DatasetStore;
use crate::table::{
    GroupSort, apply_filters, frame_column_cells, partition, sort_groups, truncate_groups,
};
use crate::types::{
    ColumnMeta, ColumnStatistics, ComparisonOutcome, DatasetId, DatasetRecord, FilterCondition,
    GroupComparisonTest, GroupSummary, SkippedComparison, VarType,
};
use crate::utils::{NumericColumn, column_numeric_values, percentage};

// =============================================================================
// Requests
// =============================================================================

/// Descriptive statistics, optionally per group with comparison tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveRequest {
    pub variables: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub run_comparison_tests: bool,
    /// Mean-based orders use the first variable as reference.
    #[serde(default)]
    pub sort_groups_by: GroupSort,
    #[serde(default)]
    pub max_groups: Option<usize>,
    #[serde(default)]
    pub missing_policy: Option<MissingPolicy>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub alpha: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRequest {
    pub variables: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default)]
    pub missing_policy: Option<MissingPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrosstabRequest {
    pub row_variable: String,
    pub col_variable: String,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default)]
    pub missing_policy: Option<MissingPolicy>,
    #[serde(default)]
    pub max_rows: Option<usize>,
    #[serde(default)]
    pub max_cols: Option<usize>,
    /// Significance level of the chi-square test.
    #[serde(default)]
    pub alpha: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalityRequest {
    pub variables: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default)]
    pub missing_policy: Option<MissingPolicy>,
    #[serde(default)]
    pub alpha: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRequest {
    pub variables: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default)]
    pub missing_policy: Option<MissingPolicy>,
    #[serde(default)]
    pub max_categories: Option<usize>,
}

// =============================================================================
// Responses
// =============================================================================

/// Statistics of every requested variable inside one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStatistics {
    pub group_key: String,
    pub statistics: Vec<ColumnStatistics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptiveResponse {
    pub sample_size: usize,
    pub statistics: Vec<ColumnStatistics>,
    /// In reported group order (after sorting and truncation).
    pub grouped_statistics: Option<Vec<GroupStatistics>>,
    pub group_summaries: Option<Vec<GroupSummary>>,
    pub group_comparison_tests: Option<Vec<GroupComparisonTest>>,
    pub skipped_comparisons: Vec<SkippedComparison>,
    pub group_by_columns: Option<Vec<String>>,
    /// Number of groups before truncation.
    pub total_groups: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResponse {
    pub sample_size: usize,
    pub variables: Vec<String>,
    pub col_keys: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrosstabResponse {
    pub sample_size: usize,
    #[serde(flatten)]
    pub table: Crosstab,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalityResponse {
    pub sample_size: usize,
    pub results: Vec<VariableNormality>,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyResponse {
    pub sample_size: usize,
    pub tables: Vec<FrequencyTable>,
}

// =============================================================================
// Service
// =============================================================================

/// Entry point for every analysis request.
pub struct AnalysisService {
    store: Arc<dyn DatasetStore>,
    cache: DatasetCache,
    config: AnalysisConfig,
}

impl AnalysisService {
    /// Create a service over `store`, validating `config`.
    pub fn new(store: Arc<dyn DatasetStore>, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            cache: DatasetCache::new(config.cache_capacity),
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.cache
    }

    /// Metadata of a dataset.
    pub fn dataset(&self, id: DatasetId) -> Result<DatasetRecord> {
        self.store.dataset(id)
    }

    // -------------------------------------------------------------------------
    // Descriptive statistics
    // -------------------------------------------------------------------------

    pub fn describe(&self, id: DatasetId, request: &DescriptiveRequest) -> Result<DescriptiveResponse> {
        let started = Instant::now();
        let record = self.store.dataset(id)?;

        require_variables(&request.variables, 1)?;
        require_columns(&record, &request.variables)?;
        require_columns(&record, &request.group_by)?;
        let policy = self.policy(request.missing_policy);
        let confidence_level = self.probability("confidence_level", request.confidence_level, self.config.confidence_level)?;
        let alpha = self.probability("alpha", request.alpha, self.config.alpha)?;
        let max_groups = self.limit("max_groups", request.max_groups, self.config.max_groups)?;

        let df = self.filtered_table(id, &request.filters)?;
        let sample_size = df.height();

        let columns: Vec<NumericColumn> = request
            .variables
            .iter()
            .map(|v| NumericColumn::from_frame(&df, v))
            .collect::<PolarsResult<_>>()?;

        let statistics = request
            .variables
            .iter()
            .zip(&columns)
            .map(|(key, column)| {
                calculate_column_stats(key, &record.display_name(key), column, policy, confidence_level, None)
            })
            .collect();

        let mut response = DescriptiveResponse {
            sample_size,
            statistics,
            grouped_statistics: None,
            group_summaries: None,
            group_comparison_tests: None,
            skipped_comparisons: Vec::new(),
            group_by_columns: None,
            total_groups: None,
        };

        if !request.group_by.is_empty() {
            let groups = partition(&df, &request.group_by)?;

            if request.run_comparison_tests && groups.len() >= 2 {
                let mut completed = Vec::new();
                for (key, column) in request.variables.iter().zip(&columns) {
                    let labelled: Vec<LabelledValues> = groups
                        .iter()
                        .map(|g| {
                            LabelledValues::new(g.key.label(), column.select_rows(&g.rows).usable())
                        })
                        .collect();
                    match compare_groups(key, &record.display_name(key), &labelled, policy, alpha) {
                        ComparisonOutcome::Completed(test) => completed.push(*test),
                        ComparisonOutcome::Skipped(skipped) => response.skipped_comparisons.push(skipped),
                    }
                }
                response.group_comparison_tests = Some(completed);
            }

            let mut groups = groups;
            sort_groups(&mut groups, request.sort_groups_by, columns.first().map(|c| c.values.as_slice()));
            let (groups, total_groups) = truncate_groups(groups, max_groups);
            if total_groups > groups.len() {
                debug!("Truncated {} groups to {}", total_groups, groups.len());
            }

            let mut grouped = Vec::with_capacity(groups.len());
            let mut summaries = Vec::with_capacity(groups.len());
            for group in &groups {
                let group_key = group.key.label();
                let statistics = request
                    .variables
                    .iter()
                    .zip(&columns)
                    .map(|(key, column)| {
                        calculate_column_stats(
                            key,
                            &record.display_name(key),
                            &column.select_rows(&group.rows),
                            policy,
                            confidence_level,
                            Some(sample_size),
                        )
                    })
                    .collect();
                summaries.push(GroupSummary {
                    group_key: group_key.clone(),
                    group_labels: group.key.labels(&request.group_by),
                    sample_size: group.size(),
                    pct_of_total: percentage(group.size(), sample_size),
                });
                grouped.push(GroupStatistics { group_key, statistics });
            }

            response.grouped_statistics = Some(grouped);
            response.group_summaries = Some(summaries);
            response.group_by_columns = Some(request.group_by.clone());
            response.total_groups = Some(total_groups);
        }

        info!(
            dataset_id = %id,
            variables = request.variables.len(),
            sample_size,
            groups = ?response.total_groups,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Descriptive statistics computed"
        );
        Ok(response)
    }

    // -------------------------------------------------------------------------
    // Correlation / crosstab
    // -------------------------------------------------------------------------

    pub fn correlation(&self, id: DatasetId, request: &CorrelationRequest) -> Result<CorrelationResponse> {
        let record = self.store.dataset(id)?;
        require_variables(&request.variables, 2)?;
        require_columns(&record, &request.variables)?;
        let policy = self.policy(request.missing_policy);

        let df = self.filtered_table(id, &request.filters)?;
        let series = request
            .variables
            .iter()
            .map(|key| {
                Ok(NamedSeries::new(
                    key.clone(),
                    record.display_name(key),
                    column_numeric_values(&df, key)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let matrix = correlation_matrix(&series, policy);
        if matrix.is_empty() {
            warn!(dataset_id = %id, "Fewer than two variables with variance, correlation matrix is empty");
        }
        Ok(CorrelationResponse {
            sample_size: df.height(),
            variables: matrix.variables,
            col_keys: matrix.col_keys,
            matrix: matrix.matrix,
        })
    }

    pub fn crosstab(&self, id: DatasetId, request: &CrosstabRequest) -> Result<CrosstabResponse> {
        let record = self.store.dataset(id)?;
        require_columns(&record, &[request.row_variable.clone(), request.col_variable.clone()])?;
        if request.row_variable == request.col_variable {
            return Err(StatsError::InvalidRequest(
                "row and column variables must differ".to_string(),
            ));
        }
        let limits = CrosstabLimits {
            max_rows: self.limit("max_rows", request.max_rows, self.config.crosstab_max_rows)?,
            max_cols: self.limit("max_cols", request.max_cols, self.config.crosstab_max_cols)?,
        };
        let alpha = self.probability("alpha", request.alpha, self.config.alpha)?;

        let df = self.filtered_table(id, &request.filters)?;
        let rows = frame_column_cells(&df, &request.row_variable)?;
        let cols = frame_column_cells(&df, &request.col_variable)?;

        let table = crosstab(
            &record.display_name(&request.row_variable),
            &record.display_name(&request.col_variable),
            &rows,
            &cols,
            self.policy(request.missing_policy),
            limits,
            alpha,
        );
        debug!(
            "Crosstab {} x {}: {} x {} categories",
            request.row_variable,
            request.col_variable,
            table.row_labels.len(),
            table.col_labels.len()
        );
        Ok(CrosstabResponse {
            sample_size: df.height(),
            table,
        })
    }

    // -------------------------------------------------------------------------
    // Normality / frequencies / hypothesis tests
    // -------------------------------------------------------------------------

    pub fn normality(&self, id: DatasetId, request: &NormalityRequest) -> Result<NormalityResponse> {
        let record = self.store.dataset(id)?;
        require_variables(&request.variables, 1)?;
        require_columns(&record, &request.variables)?;
        let policy = self.policy(request.missing_policy);
        let alpha = self.probability("alpha", request.alpha, self.config.alpha)?;

        let df = self.filtered_table(id, &request.filters)?;
        let results = request
            .variables
            .iter()
            .map(|key| {
                let values = NumericColumn::from_frame(&df, key)?.effective(policy);
                Ok(assess_normality(key, &record.display_name(key), &values, alpha))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NormalityResponse {
            sample_size: df.height(),
            recommendation: recommendation(&results),
            results,
        })
    }

    pub fn frequencies(&self, id: DatasetId, request: &FrequencyRequest) -> Result<FrequencyResponse> {
        let record = self.store.dataset(id)?;
        require_variables(&request.variables, 1)?;
        require_columns(&record, &request.variables)?;
        let policy = self.policy(request.missing_policy);
        let max_categories = self.limit("max_categories", request.max_categories, self.config.max_categories)?;

        let df = self.filtered_table(id, &request.filters)?;
        let tables = request
            .variables
            .iter()
            .map(|key| {
                let cells = frame_column_cells(&df, key)?;
                Ok(frequency_table(key, &record.display_name(key), &cells, policy, max_categories))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FrequencyResponse {
            sample_size: df.height(),
            tables,
        })
    }

    pub fn hypothesis_test(&self, id: DatasetId, request: &HypothesisTestRequest) -> Result<HypothesisTestResult> {
        let record = self.store.dataset(id)?;
        request.validate(&record)?;
        let policy = self.policy(request.missing_policy);
        let alpha = self.probability("alpha", request.alpha, self.config.alpha)?;

        let df = self.filtered_table(id, &request.filters)?;
        run_hypothesis_test(&df, &record, request, policy, alpha, self.config.confidence_level)
    }

    // -------------------------------------------------------------------------
    // Dataset mutations
    // -------------------------------------------------------------------------

    /// Change a column's variable type, or re-run the classifier when `var_type` is `None`.
    ///
    /// The cached table for the dataset is invalidated either way.
    pub fn reclassify_column(
        &self,
        id: DatasetId,
        col_key: &str,
        var_type: Option<VarType>,
    ) -> Result<ColumnMeta> {
        let record = self.store.dataset(id)?;
        let current = record
            .column(col_key)
            .ok_or_else(|| StatsError::ColumnNotFound(col_key.to_string()))?;

        let updated = match var_type {
            Some(var_type) => ColumnMeta {
                var_type,
                ..current.clone()
            },
            None => {
                let table = self.store.load_table(id)?;
                let series = table.column(col_key)?.as_materialized_series();
                DataProfiler::profile_column(series, &current.name, col_key, &self.config.type_thresholds())
                    .context(format!("Failed to reclassify column '{col_key}'"))?
            }
        };

        self.store.update_column(id, updated.clone())?;
        self.cache.invalidate(id);
        info!(
            "Column '{}' of dataset {} reclassified: {} -> {}",
            col_key, id, current.var_type, updated.var_type
        );
        Ok(updated)
    }

    /// Remove a dataset and its cache entry.
    pub fn delete_dataset(&self, id: DatasetId) -> Result<()> {
        self.store.delete(id)?;
        self.cache.invalidate(id);
        info!("Deleted dataset {}", id);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn filtered_table(&self, id: DatasetId, filters: &[FilterCondition]) -> Result<DataFrame> {
        let table = self.cache.get_or_load(id, || self.store.load_table(id))?;
        let filtered = apply_filters(&table, filters)?;
        if filtered.height() != table.height() {
            debug!("Filters kept {} of {} rows", filtered.height(), table.height());
        }
        Ok(filtered)
    }

    fn policy(&self, requested: Option<MissingPolicy>) -> MissingPolicy {
        requested.unwrap_or(self.config.missing_policy)
    }

    fn probability(&self, field: &str, requested: Option<f64>, default: f64) -> Result<f64> {
        let value = requested.unwrap_or(default);
        if value > 0.0 && value < 1.0 {
            Ok(value)
        } else {
            Err(StatsError::InvalidRequest(format!(
                "{field} must be between 0 and 1, got {value}"
            )))
        }
    }

    fn limit(&self, field: &str, requested: Option<usize>, default: usize) -> Result<usize> {
        match requested.unwrap_or(default) {
            0 => Err(StatsError::InvalidRequest(format!("{field} must be at least 1"))),
            value => Ok(value),
        }
    }
}

fn require_variables(variables: &[String], minimum: usize) -> Result<()> {
    if variables.len() < minimum {
        return Err(StatsError::InvalidRequest(format!(
            "at least {minimum} variable(s) required, got {}",
            variables.len()
        )));
    }
    Ok(())
}

fn require_columns(record: &DatasetRecord, keys: &[String]) -> Result<()> {
    match keys.iter().find(|k| record.column(k).is_none()) {
        Some(missing) => Err(StatsError::ColumnNotFound(missing.clone())),
        None => Ok(()),
    }
}
