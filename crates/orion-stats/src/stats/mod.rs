//! Statistical calculators.
//!
//! - [`descriptive`]: the per-variable descriptive vector
//! - [`assumptions`] and [`comparison`]: automatic group comparison
//! - [`correlation`], [`crosstab`], [`normality`], [`frequency`]: secondary pipelines
//! - [`hypothesis`]: tests named explicitly by the caller
//! - [`inference`]: the test primitives everything above builds on

pub mod assumptions;
pub mod comparison;
pub mod correlation;
pub mod crosstab;
pub mod descriptive;
pub mod frequency;
pub mod hypothesis;
pub mod inference;
pub mod normality;

pub use assumptions::{AssumptionCheck, check_group_assumptions};
pub use comparison::{LabelledValues, compare_groups, select_test};
pub use correlation::{CorrelationMatrix, NamedSeries, correlation_matrix};
pub use crosstab::{ChiSquareSummary, Crosstab, CrosstabLimits, crosstab};
pub use descriptive::calculate_column_stats;
pub use frequency::{FrequencyRow, FrequencyTable, frequency_table};
pub use hypothesis::{
    Decision, HypothesisTestRequest, HypothesisTestResult, HypothesisTestType, SampleSummary,
    run_hypothesis_test,
};
pub use inference::{Alternative, TestOutcome};
pub use normality::{NormalityTestResult, VariableNormality, assess_normality, recommendation};
