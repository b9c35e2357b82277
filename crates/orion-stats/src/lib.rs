//! Orion statistics engine
//!
//! Descriptive and inferential statistics over uploaded tabular datasets,
//! built on Polars.
//!
//! # Overview
//!
//! - **Profiling**: every column gets a stable key and a variable type
//!   (categorical, discrete or continuous)
//! - **Descriptive statistics**: the full per-variable vector, optionally per
//!   group, with filters and a configurable missing-value policy
//! - **Group comparison**: assumption checks (normality, homogeneity of
//!   variance) pick the test; effect sizes and a plain-language interpretation
//!   come with every result
//! - **Secondary analyses**: correlation matrices, crosstabs with chi-square,
//!   normality reports, frequency tables and explicitly requested hypothesis tests
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use orion_stats::{AnalysisConfig, AnalysisService, DescriptiveRequest, InMemoryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::default());
//! let table = orion_stats::ingest::read_table("sales.csv")?;
//! let record = store.register("sales", "sales.csv", table)?;
//!
//! let service = AnalysisService::new(store, AnalysisConfig::default())?;
//! let response = service.describe(
//!     record.id,
//!     &DescriptiveRequest {
//!         variables: vec!["revenue".to_string()],
//!         group_by: vec!["region".to_string()],
//!         run_comparison_tests: true,
//!         ..Default::default()
//!     },
//! )?;
//!
//! for test in response.group_comparison_tests.unwrap_or_default() {
//!     println!("{}: {}", test.variable_name, test.interpretation);
//! }
//! ```
//!
//! # Configuration
//!
//! [`AnalysisConfig`] holds the defaults every request falls back to. It can be
//! built in code or read from `ORION_*` environment variables:
//!
//! ```rust,ignore
//! use orion_stats::config::*;
//!
//! let config = AnalysisConfig::builder()
//!     .missing_policy(MissingPolicy::Drop)
//!     .alpha(0.01)
//!     .max_groups(50)
//!     .build()?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod profiler;
pub mod service;
pub mod stats;
pub mod store;
pub mod table;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use cache::{DEFAULT_CACHE_CAPACITY, DatasetCache};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, ConfigValidationError, MissingPolicy, TypeThresholds};
pub use error::{Result as StatsResult, ResultExt, StatsError};
pub use profiler::DataProfiler;
pub use service::{
    AnalysisService, CorrelationRequest, CorrelationResponse, CrosstabRequest, CrosstabResponse,
    DescriptiveRequest, DescriptiveResponse, FrequencyRequest, FrequencyResponse, GroupStatistics,
    NormalityRequest, NormalityResponse,
};
pub use stats::{
    Alternative, Decision, HypothesisTestRequest, HypothesisTestResult, HypothesisTestType,
};
pub use store::{DatasetStore, InMemoryStore};
pub use table::{CellValue, GroupSort};
pub use types::{
    ColumnMeta, ColumnStatistics, ComparisonOutcome, ComparisonTest, DatasetId, DatasetRecord,
    DtypeTag, EffectMagnitude, FilterCondition, FilterValue, GroupComparisonTest, GroupSummary,
    SkipReason, SkippedComparison, VarType,
};
