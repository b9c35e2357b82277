//! Integration tests for the analysis service.
//!
//! These tests load fixture files, register them in an in-memory store and
//! run requests end to end through `AnalysisService`.

use orion_stats::ingest::read_table;
use orion_stats::{
    AnalysisConfig, AnalysisService, ComparisonTest, CorrelationRequest, CrosstabRequest,
    DatasetId, DatasetStore, Decision, DescriptiveRequest, EffectMagnitude, FilterCondition,
    FilterValue, FrequencyRequest, HypothesisTestRequest, HypothesisTestType, InMemoryStore,
    MissingPolicy, NormalityRequest, SkipReason, VarType,
};
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn service_for_fixture(filename: &str) -> (AnalysisService, Arc<InMemoryStore>, DatasetId) {
    let table = read_table(fixtures_path().join(filename)).expect("Failed to read fixture");
    service_for_table(filename, table)
}

fn service_for_table(name: &str, table: DataFrame) -> (AnalysisService, Arc<InMemoryStore>, DatasetId) {
    let store = Arc::new(InMemoryStore::default());
    let record = store.register(name, name, table).expect("Failed to register dataset");
    let service = AnalysisService::new(store.clone(), AnalysisConfig::default())
        .expect("Default config should be valid");
    (service, store, record.id)
}

fn vars(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Profiling
// ============================================================================

#[test]
fn test_fixture_profile() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let record = service.dataset(id).unwrap();

    assert_eq!(record.row_count, 10);
    assert_eq!(
        record.columns.iter().map(|c| c.col_key.as_str()).collect::<Vec<_>>(),
        vec!["region", "channel", "revenue", "units", "bonus"]
    );
    assert_eq!(record.column("region").unwrap().var_type, VarType::Categorical);
    assert_eq!(record.column("units").unwrap().var_type, VarType::Discrete);
    assert_eq!(record.column("revenue").unwrap().missing_count, 1);
}

// ============================================================================
// Descriptive statistics
// ============================================================================

#[test]
fn test_missing_policy_scenario() {
    let table = df! {
        "score" => &[Some(10.0), Some(20.0), Some(30.0), Some(40.0), None],
    }
    .unwrap();
    let (service, _, id) = service_for_table("scores", table);

    let mut request = DescriptiveRequest {
        variables: vars(&["score"]),
        ..Default::default()
    };
    let zero = service.describe(id, &request).unwrap().statistics.remove(0);
    assert_eq!(zero.count, 5);
    assert_eq!(zero.missing_count, 1);
    assert_eq!(zero.missing_pct, 20.0);
    assert_eq!(zero.mean, Some(20.0));
    assert_eq!(zero.median, Some(20.0));
    assert_eq!(zero.min, Some(0.0));
    assert_eq!(zero.sum, Some(100.0));

    request.missing_policy = Some(MissingPolicy::Drop);
    let dropped = service.describe(id, &request).unwrap().statistics.remove(0);
    assert_eq!(dropped.count, 5);
    assert_eq!(dropped.missing_count, 1);
    assert_eq!(dropped.mean, Some(25.0));
    assert_eq!(dropped.median, Some(25.0));
    assert_eq!(dropped.min, Some(10.0));
}

#[test]
fn test_categorical_variable_yields_counts_only() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = DescriptiveRequest {
        variables: vars(&["region", "revenue"]),
        group_by: vars(&["channel"]),
        run_comparison_tests: true,
        ..Default::default()
    };
    let response = service.describe(id, &request).unwrap();

    let region = &response.statistics[0];
    assert_eq!(region.count, 10);
    assert_eq!(region.missing_count, 0);
    assert_eq!(region.missing_pct, 0.0);
    assert_eq!(region.mean, None);
    assert_eq!(region.std, None);

    let grouped = response.grouped_statistics.unwrap();
    assert!(grouped.iter().all(|g| g.statistics[0].mean.is_none()));

    assert_eq!(response.skipped_comparisons.len(), 1);
    assert_eq!(response.skipped_comparisons[0].variable, "region");
    assert_eq!(
        response.skipped_comparisons[0].reason,
        SkipReason::InsufficientGroups { valid_groups: 0 }
    );
    assert_eq!(response.group_comparison_tests.unwrap().len(), 1);
}

#[test]
fn test_filtered_describe() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = DescriptiveRequest {
        variables: vars(&["revenue"]),
        filters: vec![FilterCondition::new("channel", vec![FilterValue::Text("online".into())])],
        ..Default::default()
    };
    let response = service.describe(id, &request).unwrap();

    assert_eq!(response.sample_size, 5);
    assert_eq!(response.statistics[0].missing_count, 0);
    assert_eq!(response.statistics[0].mean, Some(145.75));
    assert!(response.grouped_statistics.is_none());
}

#[test]
fn test_unknown_filter_column_is_ignored() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = DescriptiveRequest {
        variables: vars(&["units"]),
        filters: vec![FilterCondition::new("not_a_column", vec![FilterValue::Number(1.0)])],
        ..Default::default()
    };
    assert_eq!(service.describe(id, &request).unwrap().sample_size, 10);
}

#[test]
fn test_grouped_describe_with_comparison() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = DescriptiveRequest {
        variables: vars(&["revenue"]),
        group_by: vars(&["region"]),
        run_comparison_tests: true,
        ..Default::default()
    };
    let response = service.describe(id, &request).unwrap();

    let summaries = response.group_summaries.unwrap();
    assert_eq!(
        summaries.iter().map(|s| s.group_key.as_str()).collect::<Vec<_>>(),
        vec!["East", "North", "South", "West"]
    );
    assert_eq!(
        summaries.iter().map(|s| s.sample_size).collect::<Vec<_>>(),
        vec![2, 3, 4, 1]
    );
    let pct: f64 = summaries.iter().map(|s| s.pct_of_total).sum();
    assert!((pct - 100.0).abs() < 1e-9);

    let grouped = response.grouped_statistics.unwrap();
    assert_eq!(grouped[2].statistics[0].group_pct, Some(40.0));

    // West has a single row and is left out of the test.
    let tests = response.group_comparison_tests.unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].test, ComparisonTest::KruskalWallis);
    assert!(tests[0].p_value >= 0.0 && tests[0].p_value <= 1.0);
    assert!(response.skipped_comparisons.is_empty());
}

#[test]
fn test_max_groups_truncates_after_sorting() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = DescriptiveRequest {
        variables: vars(&["units"]),
        group_by: vars(&["region"]),
        sort_groups_by: orion_stats::GroupSort::Count,
        max_groups: Some(2),
        ..Default::default()
    };
    let response = service.describe(id, &request).unwrap();

    assert_eq!(response.total_groups, Some(4));
    let keys: Vec<String> = response
        .group_summaries
        .unwrap()
        .into_iter()
        .map(|s| s.group_key)
        .collect();
    assert_eq!(keys, vec!["South", "North"]);
}

#[test]
fn test_ab_scenario_selects_mann_whitney() {
    let (service, _, id) = service_for_fixture("ab_test.csv");
    let request = DescriptiveRequest {
        variables: vars(&["score"]),
        group_by: vars(&["variant"]),
        run_comparison_tests: true,
        ..Default::default()
    };
    let response = service.describe(id, &request).unwrap();
    let tests = response.group_comparison_tests.unwrap();

    assert_eq!(tests.len(), 1);
    let test = &tests[0];
    assert_eq!(test.test, ComparisonTest::MannWhitney);
    assert!(test.significant);
    assert_eq!(test.effect_size_interpretation, Some(EffectMagnitude::Large));
    assert!(!test.assumptions_met.normality);
}

// ============================================================================
// Secondary analyses
// ============================================================================

#[test]
fn test_correlation_drops_constant_column() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = CorrelationRequest {
        variables: vars(&["revenue", "units", "bonus"]),
        ..Default::default()
    };
    let response = service.correlation(id, &request).unwrap();

    assert_eq!(response.variables, vars(&["revenue", "units"]));
    assert_eq!(response.matrix.len(), 2);
    assert_eq!(response.matrix[0][0], 1.0);
    assert_eq!(response.matrix[0][1], response.matrix[1][0]);
    assert!(response.matrix[0][1].abs() <= 1.0);
}

#[test]
fn test_crosstab_channel_by_units() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = CrosstabRequest {
        row_variable: "channel".to_string(),
        col_variable: "units".to_string(),
        ..Default::default()
    };
    let response = service.crosstab(id, &request).unwrap();
    let table = &response.table;

    assert_eq!(table.row_labels, vec!["online", "store"]);
    assert_eq!(table.row_totals, vec![5, 5]);
    assert_eq!(table.grand_total, 10);
    assert_eq!(table.col_labels.len(), 6);
    assert_eq!(table.chi_square.as_ref().unwrap().dof, 5);
}

#[test]
fn test_crosstab_same_variable_rejected() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = CrosstabRequest {
        row_variable: "channel".to_string(),
        col_variable: "channel".to_string(),
        ..Default::default()
    };
    assert!(service.crosstab(id, &request).unwrap_err().is_validation());
}

#[test]
fn test_frequencies() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = FrequencyRequest {
        variables: vars(&["channel"]),
        ..Default::default()
    };
    let response = service.frequencies(id, &request).unwrap();
    let table = &response.tables[0];

    assert_eq!(table.total, 10);
    assert_eq!(table.rows[0].value, "online");
    assert_eq!(table.rows[0].percentage, 50.0);
    assert_eq!(table.rows[1].cumulative_percentage, 100.0);
    assert!(!table.truncated);
}

#[test]
fn test_normality_report() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = NormalityRequest {
        variables: vars(&["revenue", "units"]),
        missing_policy: Some(MissingPolicy::Drop),
        ..Default::default()
    };
    let response = service.normality(id, &request).unwrap();

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].n, 9);
    assert_eq!(response.results[1].n, 10);
    assert!(!response.recommendation.is_empty());
}

#[test]
fn test_independent_t_through_service() {
    let (service, _, id) = service_for_fixture("ab_test.csv");
    let request = HypothesisTestRequest::new(HypothesisTestType::IndependentT, "score")
        .with_group_variable("variant");
    let result = service.hypothesis_test(id, &request).unwrap();

    assert_eq!(result.decision, Decision::RejectNull);
    assert!(result.p_value.unwrap() < 0.05);
    assert_eq!(result.group_summaries.len(), 2);
    assert_eq!(result.group_summaries[0].group, "A");
    assert_eq!(result.group_summaries[0].mean, Some(3.0));
}

#[test]
fn test_hypothesis_missing_group_variable() {
    let (service, _, id) = service_for_fixture("ab_test.csv");
    let request = HypothesisTestRequest::new(HypothesisTestType::MannWhitney, "score");
    assert!(service.hypothesis_test(id, &request).unwrap_err().is_validation());
}

// ============================================================================
// Dataset lifecycle
// ============================================================================

#[test]
fn test_reclassify_refreshes_metadata_and_cache() {
    let (service, store, id) = service_for_fixture("sales.csv");
    let request = FrequencyRequest {
        variables: vars(&["units"]),
        ..Default::default()
    };
    service.frequencies(id, &request).unwrap();
    assert!(service.cache().contains(id));

    service
        .reclassify_column(id, "units", Some(VarType::Categorical))
        .unwrap();
    assert!(!service.cache().contains(id));
    assert_eq!(
        store.dataset(id).unwrap().column("units").unwrap().var_type,
        VarType::Categorical
    );

    let err = service.reclassify_column(id, "nope", None).unwrap_err();
    assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
}

#[test]
fn test_deleted_dataset_is_not_found() {
    let (service, _, id) = service_for_fixture("sales.csv");
    service.delete_dataset(id).unwrap();

    let request = DescriptiveRequest {
        variables: vars(&["units"]),
        ..Default::default()
    };
    let err = service.describe(id, &request).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.error_code(), "DATASET_NOT_FOUND");
}

#[test]
fn test_error_serializes_with_code() {
    let (service, _, id) = service_for_fixture("sales.csv");
    let request = CorrelationRequest {
        variables: vars(&["revenue"]),
        ..Default::default()
    };
    let err = service.correlation(id, &request).unwrap_err();
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["code"], "INVALID_REQUEST");
}
