//! Core data types shared across the analysis engine.
//!
//! Column metadata, filters and the result records produced by the descriptive
//! and group-comparison calculators. Everything here is plain data and derives
//! `Serialize` so results can be handed to any presentation layer as JSON.

use chrono::{DateTime, Utc};
use polars::prelude::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::StatsError;

// =============================================================================
// Dataset metadata
// =============================================================================

/// Identifier of a stored dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub u64);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic category of a column, driving which statistics apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarType {
    /// Labels or free text; counted, never averaged.
    Categorical,
    /// Numeric with few distinct values (counts, scores, codes).
    Discrete,
    /// Numeric measurement.
    Continuous,
}

impl VarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VarType::Categorical => "categorical",
            VarType::Discrete => "discrete",
            VarType::Continuous => "continuous",
        }
    }

    /// Whether descriptive statistics make sense for this type.
    pub fn is_numeric(&self) -> bool {
        matches!(self, VarType::Discrete | VarType::Continuous)
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VarType {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "categorical" => Ok(VarType::Categorical),
            "discrete" => Ok(VarType::Discrete),
            "continuous" => Ok(VarType::Continuous),
            _ => Err(StatsError::InvalidVarType(s.to_string())),
        }
    }
}

/// Storage type of a column, reduced to what the engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtypeTag {
    Integer,
    Float,
    Boolean,
    Text,
    Temporal,
    Other,
}

impl DtypeTag {
    pub fn from_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => DtypeTag::Integer,
            DataType::Float32 | DataType::Float64 => DtypeTag::Float,
            DataType::Boolean => DtypeTag::Boolean,
            DataType::String | DataType::Categorical(_, _) | DataType::Enum(_, _) => {
                DtypeTag::Text
            }
            DataType::Date | DataType::Datetime(_, _) | DataType::Time | DataType::Duration(_) => {
                DtypeTag::Temporal
            }
            _ => DtypeTag::Other,
        }
    }

    /// Integer or float storage.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DtypeTag::Integer | DtypeTag::Float)
    }
}

/// Metadata describing one column of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Original header as uploaded.
    pub name: String,
    /// Sanitized identifier, unique within the dataset.
    pub col_key: String,
    pub dtype: DtypeTag,
    pub var_type: VarType,
    /// Distinct non-missing values.
    pub unique_count: usize,
    pub missing_count: usize,
}

/// A stored dataset: metadata plus bookkeeping. The table itself lives in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: DatasetId,
    pub name: String,
    pub original_filename: String,
    pub row_count: usize,
    pub col_count: usize,
    pub columns: Vec<ColumnMeta>,
    pub created_at: DateTime<Utc>,
}

impl DatasetRecord {
    /// Find a column by key.
    pub fn column(&self, col_key: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.col_key == col_key)
    }

    /// Display name for a key, falling back to the key itself.
    pub fn display_name(&self, col_key: &str) -> String {
        self.column(col_key)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| col_key.to_string())
    }

    /// Map of `col_key -> name` for every column.
    pub fn column_names(&self) -> BTreeMap<String, String> {
        self.columns
            .iter()
            .map(|c| (c.col_key.clone(), c.name.clone()))
            .collect()
    }
}

// =============================================================================
// Filters
// =============================================================================

/// A single value in a filter's accepted set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Number(f64),
    Text(String),
    /// Matches missing cells.
    Null,
}

/// Keep rows whose `col_key` value is one of `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub col_key: String,
    #[serde(default)]
    pub values: Vec<FilterValue>,
}

impl FilterCondition {
    pub fn new(col_key: impl Into<String>, values: Vec<FilterValue>) -> Self {
        Self {
            col_key: col_key.into(),
            values,
        }
    }
}

// =============================================================================
// Descriptive statistics
// =============================================================================

/// Full descriptive vector for one numeric variable (optionally within one group).
///
/// Numeric fields are `None` when the statistic is undefined for the sample
/// (empty series, a single observation, zero variance, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub col_key: String,
    pub name: String,
    pub count: usize,
    pub missing_count: usize,
    pub missing_pct: f64,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub mode: Option<f64>,
    pub std: Option<f64>,
    pub variance: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub iqr: Option<f64>,
    pub sem: Option<f64>,
    pub cv: Option<f64>,
    pub range: Option<f64>,
    pub p5: Option<f64>,
    pub p10: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub sum: Option<f64>,
    pub group_pct: Option<f64>,
}

/// Size and labels of one group in a grouped descriptive request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Composite label, values joined with `" | "`.
    pub group_key: String,
    /// Per grouping column label.
    pub group_labels: BTreeMap<String, String>,
    pub sample_size: usize,
    pub pct_of_total: f64,
}

// =============================================================================
// Group comparison
// =============================================================================

/// Test chosen by the selector for a group comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonTest {
    StudentT,
    WelchT,
    MannWhitney,
    OneWayAnova,
    WelchAnova,
    KruskalWallis,
}

impl ComparisonTest {
    pub fn display_name(&self) -> &'static str {
        match self {
            ComparisonTest::StudentT => "Student's t-test",
            ComparisonTest::WelchT => "Welch's t-test",
            ComparisonTest::MannWhitney => "Mann-Whitney U",
            ComparisonTest::OneWayAnova => "One-way ANOVA",
            ComparisonTest::WelchAnova => "Welch's ANOVA",
            ComparisonTest::KruskalWallis => "Kruskal-Wallis H",
        }
    }

    /// Rank-based tests summarize groups by median rather than mean.
    pub fn is_parametric(&self) -> bool {
        !matches!(self, ComparisonTest::MannWhitney | ComparisonTest::KruskalWallis)
    }

    /// Name of the effect size reported alongside this test.
    pub fn effect_size_name(&self) -> &'static str {
        match self {
            ComparisonTest::StudentT | ComparisonTest::WelchT | ComparisonTest::MannWhitney => {
                "Cohen's d"
            }
            ComparisonTest::OneWayAnova | ComparisonTest::WelchAnova => "Eta squared",
            ComparisonTest::KruskalWallis => "Epsilon squared",
        }
    }
}

impl fmt::Display for ComparisonTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Conventional magnitude label of an effect size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectMagnitude {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectMagnitude {
    /// Label a Cohen's d (absolute value is used).
    pub fn from_cohens_d(d: f64) -> Self {
        match d.abs() {
            d if d < 0.2 => EffectMagnitude::Negligible,
            d if d < 0.5 => EffectMagnitude::Small,
            d if d < 0.8 => EffectMagnitude::Medium,
            _ => EffectMagnitude::Large,
        }
    }

    /// Label a proportion-of-variance effect (eta squared, epsilon squared).
    pub fn from_variance_explained(value: f64) -> Self {
        match value {
            v if v < 0.01 => EffectMagnitude::Negligible,
            v if v < 0.06 => EffectMagnitude::Small,
            v if v < 0.14 => EffectMagnitude::Medium,
            _ => EffectMagnitude::Large,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectMagnitude::Negligible => "negligible",
            EffectMagnitude::Small => "small",
            EffectMagnitude::Medium => "medium",
            EffectMagnitude::Large => "large",
        }
    }
}

impl fmt::Display for EffectMagnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the assumption checks that drove test selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssumptionsMet {
    pub normality: bool,
    pub homogeneity: bool,
}

/// Result of one automatically selected group comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupComparisonTest {
    pub variable: String,
    pub variable_name: String,
    pub test: ComparisonTest,
    pub test_name: String,
    pub statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    pub alpha: f64,
    pub effect_size: Option<f64>,
    pub effect_size_name: String,
    pub effect_size_interpretation: Option<EffectMagnitude>,
    pub assumptions_met: AssumptionsMet,
    pub interpretation: String,
    pub practical_explanation: String,
}

/// Why a comparison was not produced for a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Fewer than two groups had at least two numeric observations.
    InsufficientGroups { valid_groups: usize },
    /// The selected test raised an error (degenerate samples and the like).
    TestFailed { message: String },
    /// The statistic or p-value came out NaN or infinite.
    NonFiniteResult,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientGroups { valid_groups } => write!(
                f,
                "need at least 2 groups with 2+ observations, found {valid_groups}"
            ),
            SkipReason::TestFailed { message } => write!(f, "test failed: {message}"),
            SkipReason::NonFiniteResult => f.write_str("test produced a non-finite result"),
        }
    }
}

/// A variable for which no comparison result was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedComparison {
    pub variable: String,
    pub variable_name: String,
    pub reason: SkipReason,
}

/// Per-variable result of the comparison runner.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonOutcome {
    Completed(Box<GroupComparisonTest>),
    Skipped(SkippedComparison),
}

impl ComparisonOutcome {
    pub fn completed(&self) -> Option<&GroupComparisonTest> {
        match self {
            ComparisonOutcome::Completed(test) => Some(test),
            ComparisonOutcome::Skipped(_) => None,
        }
    }
}
