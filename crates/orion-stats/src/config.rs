//! Configuration types for the analysis engine.
//!
//! All thresholds and limits are injected through [`AnalysisConfig`]; nothing in
//! the engine reads global state. Use [`AnalysisConfig::builder()`] for a
//! validated configuration or [`AnalysisConfig::from_env()`] to pick up
//! `ORION_*` environment variables.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::StatsError;

/// How missing numeric values are treated before computing statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Replace missing values with 0 (and keep missing categories as their own label).
    #[default]
    TreatAsZero,
    /// Remove missing values before computing.
    Drop,
}

impl MissingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingPolicy::TreatAsZero => "treat_as_zero",
            MissingPolicy::Drop => "drop",
        }
    }
}

impl FromStr for MissingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "treat_as_zero" | "zero" => Ok(MissingPolicy::TreatAsZero),
            "drop" => Ok(MissingPolicy::Drop),
            other => Err(format!("unknown missing policy '{other}'")),
        }
    }
}

/// Thresholds used by the variable type classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeThresholds {
    /// Numeric columns with at most this many distinct values are discrete.
    pub discrete_threshold: usize,
    /// Numeric columns whose distinct/non-missing ratio is at most this are discrete.
    pub discrete_ratio: f64,
}

impl Default for TypeThresholds {
    fn default() -> Self {
        Self {
            discrete_threshold: 30,
            discrete_ratio: 0.02,
        }
    }
}

/// Configuration for the analysis engine.
///
/// # Example
///
/// ```rust,ignore
/// use orion_stats::config::{AnalysisConfig, MissingPolicy};
///
/// let config = AnalysisConfig::builder()
///     .missing_policy(MissingPolicy::Drop)
///     .alpha(0.01)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Distinct-value count at or below which a numeric column is discrete.
    /// Default: 30
    pub discrete_threshold: usize,

    /// Distinct/non-missing ratio at or below which a numeric column is discrete.
    /// Default: 0.02
    pub discrete_ratio: f64,

    /// Policy used when a request does not specify one.
    /// Default: TreatAsZero
    pub missing_policy: MissingPolicy,

    /// Confidence level for mean confidence intervals.
    /// Default: 0.95
    pub confidence_level: f64,

    /// Significance level for assumption checks and comparison tests.
    /// Default: 0.05
    pub alpha: f64,

    /// Maximum number of groups returned by a descriptive request.
    /// Default: 200
    pub max_groups: usize,

    /// Maximum number of categories in a frequency table.
    /// Default: 200
    pub max_categories: usize,

    /// Maximum number of crosstab rows kept (largest totals first).
    /// Default: 30
    pub crosstab_max_rows: usize,

    /// Maximum number of crosstab columns kept (largest totals first).
    /// Default: 30
    pub crosstab_max_cols: usize,

    /// Number of dataset tables kept in the in-process cache.
    /// Default: 5
    pub cache_capacity: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let thresholds = TypeThresholds::default();
        Self {
            discrete_threshold: thresholds.discrete_threshold,
            discrete_ratio: thresholds.discrete_ratio,
            missing_policy: MissingPolicy::default(),
            confidence_level: 0.95,
            alpha: 0.05,
            max_groups: 200,
            max_categories: 200,
            crosstab_max_rows: 30,
            crosstab_max_cols: 30,
            cache_capacity: 5,
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Build a configuration from `ORION_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are reported.
    pub fn from_env() -> Result<Self, ConfigValidationError> {
        let mut builder = Self::builder();
        if let Some(v) = env_value("ORION_DISCRETE_THRESHOLD")? {
            builder = builder.discrete_threshold(v);
        }
        if let Some(v) = env_value("ORION_DISCRETE_RATIO")? {
            builder = builder.discrete_ratio(v);
        }
        if let Some(v) = env_value("ORION_MISSING_POLICY")? {
            builder = builder.missing_policy(v);
        }
        if let Some(v) = env_value("ORION_CONFIDENCE_LEVEL")? {
            builder = builder.confidence_level(v);
        }
        if let Some(v) = env_value("ORION_ALPHA")? {
            builder = builder.alpha(v);
        }
        if let Some(v) = env_value("ORION_MAX_GROUPS")? {
            builder = builder.max_groups(v);
        }
        if let Some(v) = env_value("ORION_MAX_CATEGORIES")? {
            builder = builder.max_categories(v);
        }
        if let Some(v) = env_value("ORION_CROSSTAB_MAX_ROWS")? {
            builder = builder.crosstab_max_rows(v);
        }
        if let Some(v) = env_value("ORION_CROSSTAB_MAX_COLS")? {
            builder = builder.crosstab_max_cols(v);
        }
        if let Some(v) = env_value("ORION_CACHE_CAPACITY")? {
            builder = builder.cache_capacity(v);
        }
        builder.build()
    }

    /// Thresholds for the variable type classifier.
    pub fn type_thresholds(&self) -> TypeThresholds {
        TypeThresholds {
            discrete_threshold: self.discrete_threshold,
            discrete_ratio: self.discrete_ratio,
        }
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for (field, value) in [
            ("discrete_ratio", self.discrete_ratio),
            ("confidence_level", self.confidence_level),
            ("alpha", self.alpha),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigValidationError::InvalidProbability {
                    field: field.to_string(),
                    value,
                });
            }
        }

        for (field, value) in [
            ("max_groups", self.max_groups),
            ("max_categories", self.max_categories),
            ("crosstab_max_rows", self.crosstab_max_rows),
            ("crosstab_max_cols", self.crosstab_max_cols),
            ("cache_capacity", self.cache_capacity),
        ] {
            if value == 0 {
                return Err(ConfigValidationError::ZeroLimit(field.to_string()));
            }
        }

        Ok(())
    }
}

fn env_value<T>(var: &str) -> Result<Option<T>, ConfigValidationError>
where
    T: FromStr,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigValidationError::InvalidEnvValue {
                var: var.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid value for '{field}': {value} (must be strictly between 0.0 and 1.0)")]
    InvalidProbability { field: String, value: f64 },

    #[error("Invalid limit for '{0}': must be at least 1")]
    ZeroLimit(String),

    #[error("Environment variable {var} has an invalid value '{value}'")]
    InvalidEnvValue { var: String, value: String },
}

impl From<ConfigValidationError> for StatsError {
    fn from(err: ConfigValidationError) -> Self {
        StatsError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`AnalysisConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    discrete_threshold: Option<usize>,
    discrete_ratio: Option<f64>,
    missing_policy: Option<MissingPolicy>,
    confidence_level: Option<f64>,
    alpha: Option<f64>,
    max_groups: Option<usize>,
    max_categories: Option<usize>,
    crosstab_max_rows: Option<usize>,
    crosstab_max_cols: Option<usize>,
    cache_capacity: Option<usize>,
}

impl AnalysisConfigBuilder {
    /// Set the distinct-value count at or below which numeric columns are discrete.
    pub fn discrete_threshold(mut self, threshold: usize) -> Self {
        self.discrete_threshold = Some(threshold);
        self
    }

    /// Set the distinct/non-missing ratio at or below which numeric columns are discrete.
    pub fn discrete_ratio(mut self, ratio: f64) -> Self {
        self.discrete_ratio = Some(ratio);
        self
    }

    /// Set the default missing-value policy.
    pub fn missing_policy(mut self, policy: MissingPolicy) -> Self {
        self.missing_policy = Some(policy);
        self
    }

    /// Set the default confidence level (e.g. 0.95).
    pub fn confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = Some(level);
        self
    }

    /// Set the significance level.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn max_groups(mut self, max: usize) -> Self {
        self.max_groups = Some(max);
        self
    }

    pub fn max_categories(mut self, max: usize) -> Self {
        self.max_categories = Some(max);
        self
    }

    pub fn crosstab_max_rows(mut self, max: usize) -> Self {
        self.crosstab_max_rows = Some(max);
        self
    }

    pub fn crosstab_max_cols(mut self, max: usize) -> Self {
        self.crosstab_max_cols = Some(max);
        self
    }

    /// Set how many dataset tables the service keeps cached.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `AnalysisConfig` or an error if validation fails.
    pub fn build(self) -> Result<AnalysisConfig, ConfigValidationError> {
        let defaults = AnalysisConfig::default();
        let config = AnalysisConfig {
            discrete_threshold: self.discrete_threshold.unwrap_or(defaults.discrete_threshold),
            discrete_ratio: self.discrete_ratio.unwrap_or(defaults.discrete_ratio),
            missing_policy: self.missing_policy.unwrap_or_default(),
            confidence_level: self.confidence_level.unwrap_or(defaults.confidence_level),
            alpha: self.alpha.unwrap_or(defaults.alpha),
            max_groups: self.max_groups.unwrap_or(defaults.max_groups),
            max_categories: self.max_categories.unwrap_or(defaults.max_categories),
            crosstab_max_rows: self.crosstab_max_rows.unwrap_or(defaults.crosstab_max_rows),
            crosstab_max_cols: self.crosstab_max_cols.unwrap_or(defaults.crosstab_max_cols),
            cache_capacity: self.cache_capacity.unwrap_or(defaults.cache_capacity),
        };

        config.validate()?;
        Ok(config)
    }
}
