//! Explicitly requested hypothesis tests.
//!
//! Unlike the automatic group comparison, the caller names the test. Missing
//! parameters are rejected before any data is touched and test failures fail
//! the request.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use super::descriptive::mean_confidence_interval;
use super::inference::{
    Alternative, TestOutcome, cohens_d, epsilon_squared, eta_squared, kruskal_wallis,
    mann_whitney_u, one_sample_t_test, one_way_anova, paired_t_test, welch_t_test,
    wilcoxon_signed_rank,
};
use crate::config::MissingPolicy;
use crate::error::{Result, StatsError};
use crate::table::partition;
use crate::types::{DatasetRecord, EffectMagnitude, FilterCondition};
use crate::utils::{
    NumericColumn, column_numeric_values, format_p_value, mean, safe_round, sample_std,
};

/// The test a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisTestType {
    OneSampleT,
    /// Welch's two-sample t-test on the first two groups.
    IndependentT,
    MannWhitney,
    PairedT,
    OneWayAnova,
    KruskalWallis,
    Wilcoxon,
}

impl HypothesisTestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HypothesisTestType::OneSampleT => "one_sample_t",
            HypothesisTestType::IndependentT => "independent_t",
            HypothesisTestType::MannWhitney => "mann_whitney",
            HypothesisTestType::PairedT => "paired_t",
            HypothesisTestType::OneWayAnova => "one_way_anova",
            HypothesisTestType::KruskalWallis => "kruskal_wallis",
            HypothesisTestType::Wilcoxon => "wilcoxon",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            HypothesisTestType::OneSampleT => "One-sample t-test",
            HypothesisTestType::IndependentT => "Independent t-test (Welch)",
            HypothesisTestType::MannWhitney => "Mann-Whitney U",
            HypothesisTestType::PairedT => "Paired t-test",
            HypothesisTestType::OneWayAnova => "One-way ANOVA",
            HypothesisTestType::KruskalWallis => "Kruskal-Wallis H",
            HypothesisTestType::Wilcoxon => "Wilcoxon signed-rank",
        }
    }

    fn needs_groups(&self) -> bool {
        matches!(
            self,
            HypothesisTestType::IndependentT
                | HypothesisTestType::MannWhitney
                | HypothesisTestType::OneWayAnova
                | HypothesisTestType::KruskalWallis
        )
    }

    fn needs_pair(&self) -> bool {
        matches!(self, HypothesisTestType::PairedT | HypothesisTestType::Wilcoxon)
    }
}

impl fmt::Display for HypothesisTestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HypothesisTestType {
    type Err = StatsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "one_sample_t" => Ok(HypothesisTestType::OneSampleT),
            "independent_t" => Ok(HypothesisTestType::IndependentT),
            "mann_whitney" => Ok(HypothesisTestType::MannWhitney),
            "paired_t" => Ok(HypothesisTestType::PairedT),
            "one_way_anova" => Ok(HypothesisTestType::OneWayAnova),
            "kruskal_wallis" => Ok(HypothesisTestType::KruskalWallis),
            "wilcoxon" => Ok(HypothesisTestType::Wilcoxon),
            _ => Err(StatsError::InvalidRequest(format!("unknown test type '{s}'"))),
        }
    }
}

/// Parameters of a hypothesis test request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisTestRequest {
    pub test_type: HypothesisTestType,
    pub variable: String,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    /// Grouping column for two-sample and k-sample tests.
    #[serde(default)]
    pub group_variable: Option<String>,
    /// Second measurement for paired tests.
    #[serde(default)]
    pub paired_variable: Option<String>,
    /// Hypothesized mean for the one-sample t-test.
    #[serde(default)]
    pub test_value: Option<f64>,
    #[serde(default)]
    pub alternative: Alternative,
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default)]
    pub missing_policy: Option<MissingPolicy>,
}

impl HypothesisTestRequest {
    pub fn new(test_type: HypothesisTestType, variable: impl Into<String>) -> Self {
        Self {
            test_type,
            variable: variable.into(),
            filters: Vec::new(),
            group_variable: None,
            paired_variable: None,
            test_value: None,
            alternative: Alternative::default(),
            alpha: None,
            missing_policy: None,
        }
    }

    pub fn with_group_variable(mut self, col_key: impl Into<String>) -> Self {
        self.group_variable = Some(col_key.into());
        self
    }

    pub fn with_paired_variable(mut self, col_key: impl Into<String>) -> Self {
        self.paired_variable = Some(col_key.into());
        self
    }

    pub fn with_test_value(mut self, value: f64) -> Self {
        self.test_value = Some(value);
        self
    }

    pub fn with_alternative(mut self, alternative: Alternative) -> Self {
        self.alternative = alternative;
        self
    }

    /// Check that the parameters the chosen test needs are present and exist.
    pub fn validate(&self, columns: &DatasetRecord) -> Result<()> {
        let require_column = |col_key: &str| {
            columns
                .column(col_key)
                .map(|_| ())
                .ok_or_else(|| StatsError::ColumnNotFound(col_key.to_string()))
        };

        require_column(&self.variable)?;

        if self.test_type == HypothesisTestType::OneSampleT {
            match self.test_value {
                Some(v) if v.is_finite() => {}
                _ => {
                    return Err(StatsError::InvalidRequest(
                        "test_value is required for the one-sample t-test".to_string(),
                    ));
                }
            }
        }
        if self.test_type.needs_groups() {
            let group = self.group_variable.as_deref().ok_or_else(|| {
                StatsError::InvalidRequest(format!("group_variable is required for {}", self.test_type))
            })?;
            require_column(group)?;
        }
        if self.test_type.needs_pair() {
            let paired = self.paired_variable.as_deref().ok_or_else(|| {
                StatsError::InvalidRequest(format!("paired_variable is required for {}", self.test_type))
            })?;
            require_column(paired)?;
        }
        if let Some(alpha) = self.alpha
            && !(alpha > 0.0 && alpha < 1.0)
        {
            return Err(StatsError::InvalidRequest(format!(
                "alpha must be between 0 and 1, got {alpha}"
            )));
        }
        Ok(())
    }
}

/// Outcome of the H0 decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "reject H0")]
    RejectNull,
    #[serde(rename = "fail to reject H0")]
    FailToReject,
}

impl Decision {
    fn from_p(p_value: f64, alpha: f64) -> Self {
        if p_value < alpha {
            Decision::RejectNull
        } else {
            Decision::FailToReject
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::RejectNull => "reject H0",
            Decision::FailToReject => "fail to reject H0",
        }
    }
}

/// Size, mean and standard deviation of one group entering a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    pub group: String,
    pub n: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

impl SampleSummary {
    fn of(group: impl Into<String>, values: &[f64]) -> Self {
        Self {
            group: group.into(),
            n: values.len(),
            mean: if values.is_empty() { None } else { safe_round(mean(values), 4) },
            std: safe_round(sample_std(values), 4),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HypothesisTestResult {
    pub test_type: HypothesisTestType,
    pub test_name: String,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub significant: bool,
    pub alpha: f64,
    pub effect_size: Option<f64>,
    pub effect_size_name: Option<String>,
    pub effect_size_interpretation: Option<EffectMagnitude>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub decision: Decision,
    pub interpretation: String,
    pub group_summaries: Vec<SampleSummary>,
}

/// Effect size with its name and magnitude label.
struct Effect {
    value: f64,
    name: &'static str,
    magnitude: EffectMagnitude,
}

impl Effect {
    fn cohens_d(value: f64) -> Self {
        Self {
            value,
            name: "Cohen's d",
            magnitude: EffectMagnitude::from_cohens_d(value),
        }
    }

    fn variance_explained(value: f64, name: &'static str) -> Self {
        Self {
            value,
            name,
            magnitude: EffectMagnitude::from_variance_explained(value),
        }
    }
}

/// Everything a finished test contributes before the shared formatting.
struct Computed {
    outcome: TestOutcome,
    effect: Option<Effect>,
    ci: Option<(f64, f64)>,
    summaries: Vec<SampleSummary>,
    /// Sentence fragment ending the interpretation, e.g. "between A and B".
    subject: String,
}

/// Run a validated request on an already filtered table.
pub fn run_hypothesis_test(
    df: &DataFrame,
    record: &DatasetRecord,
    request: &HypothesisTestRequest,
    policy: MissingPolicy,
    alpha: f64,
    confidence_level: f64,
) -> Result<HypothesisTestResult> {
    request.validate(record)?;
    let test = request.test_type;
    let var_name = record.display_name(&request.variable);
    debug!(test = %test, variable = %request.variable, rows = df.height(), "Running hypothesis test");

    let computed = match test {
        HypothesisTestType::OneSampleT => {
            let mu = request.test_value.unwrap_or_default();
            let values = NumericColumn::from_frame(df, &request.variable)?.effective(policy);
            let outcome = one_sample_t_test(&values, mu)?;
            let avg = mean(&values);
            let std = sample_std(&values);
            let effect = if std > 0.0 { (avg - mu).abs() / std } else { 0.0 };
            let sem = std / (values.len() as f64).sqrt();
            Computed {
                outcome,
                effect: Some(Effect::cohens_d(effect)),
                ci: mean_confidence_interval(avg, sem, values.len(), confidence_level),
                summaries: vec![SampleSummary::of(var_name.clone(), &values)],
                subject: format!("mean of {var_name} ({avg:.2}) against {mu}"),
            }
        }
        HypothesisTestType::IndependentT | HypothesisTestType::MannWhitney => {
            let groups = grouped_values(df, request, policy)?;
            if groups.len() < 2 {
                return Err(StatsError::InvalidRequest(format!(
                    "{} needs at least 2 groups, found {}",
                    test.display_name(),
                    groups.len()
                )));
            }
            let (first, second) = (&groups[0], &groups[1]);
            let outcome = if test == HypothesisTestType::IndependentT {
                welch_t_test(&first.1, &second.1)?
            } else {
                mann_whitney_u(&first.1, &second.1, request.alternative)?
            };
            Computed {
                outcome,
                effect: Some(Effect::cohens_d(cohens_d(&first.1, &second.1))),
                ci: None,
                summaries: vec![
                    SampleSummary::of(first.0.clone(), &first.1),
                    SampleSummary::of(second.0.clone(), &second.1),
                ],
                subject: format!("{var_name} between {} and {}", first.0, second.0),
            }
        }
        HypothesisTestType::OneWayAnova | HypothesisTestType::KruskalWallis => {
            let groups: Vec<(String, Vec<f64>)> = grouped_values(df, request, policy)?
                .into_iter()
                .filter(|(_, values)| values.len() >= 2)
                .collect();
            if groups.len() < 2 {
                return Err(StatsError::InvalidRequest(format!(
                    "{} needs at least 2 groups with 2+ values, found {}",
                    test.display_name(),
                    groups.len()
                )));
            }
            let data: Vec<Vec<f64>> = groups.iter().map(|(_, v)| v.clone()).collect();
            let (outcome, effect) = if test == HypothesisTestType::OneWayAnova {
                let outcome = one_way_anova(&data)?;
                (outcome, Effect::variance_explained(eta_squared(&data), "Eta squared"))
            } else {
                let outcome = kruskal_wallis(&data)?;
                let n = data.iter().map(Vec::len).sum();
                let eps = epsilon_squared(outcome.statistic, n, data.len());
                (outcome, Effect::variance_explained(eps, "Epsilon squared"))
            };
            Computed {
                outcome,
                effect: Some(effect),
                ci: None,
                summaries: groups.iter().map(|(label, v)| SampleSummary::of(label.clone(), v)).collect(),
                subject: format!("{var_name} across the {} groups", groups.len()),
            }
        }
        HypothesisTestType::PairedT | HypothesisTestType::Wilcoxon => {
            let paired_key = request.paired_variable.as_deref().unwrap_or_default();
            let paired_name = record.display_name(paired_key);
            let (a, b) = paired_values(df, &request.variable, paired_key)?;
            let diffs: Vec<f64> = a.iter().zip(&b).map(|(x, y)| x - y).collect();
            let (outcome, effect) = if test == HypothesisTestType::PairedT {
                let outcome = paired_t_test(&a, &b)?;
                let std = sample_std(&diffs);
                let d = if std > 0.0 { mean(&diffs).abs() / std } else { 0.0 };
                (outcome, Some(Effect::cohens_d(d)))
            } else {
                (wilcoxon_signed_rank(&diffs, request.alternative)?, None)
            };
            Computed {
                outcome,
                effect,
                ci: None,
                summaries: vec![
                    SampleSummary::of(var_name.clone(), &a),
                    SampleSummary::of(paired_name.clone(), &b),
                ],
                subject: format!("between {var_name} and {paired_name}"),
            }
        }
    };

    let result = finish(test, computed, alpha);
    info!(
        test = %test,
        variable = %request.variable,
        p_value = ?result.p_value,
        decision = result.decision.as_str(),
        "Hypothesis test completed"
    );
    Ok(result)
}

fn finish(test: HypothesisTestType, computed: Computed, alpha: f64) -> HypothesisTestResult {
    let Computed {
        outcome,
        effect,
        ci,
        summaries,
        subject,
    } = computed;

    let significant = outcome.p_value < alpha;
    let decision = Decision::from_p(outcome.p_value, alpha);
    let verdict = if significant {
        "a significant difference"
    } else {
        "no significant difference"
    };
    let mut interpretation = format!(
        "{}: {verdict} for {subject} (statistic = {:.2}, {}).",
        test.display_name(),
        outcome.statistic,
        format_p_value(outcome.p_value)
    );
    if let Some(effect) = &effect {
        interpretation.push_str(&format!(
            " Effect size ({} = {:.3}): {}.",
            effect.name, effect.value, effect.magnitude
        ));
    }

    HypothesisTestResult {
        test_type: test,
        test_name: test.display_name().to_string(),
        statistic: safe_round(outcome.statistic, 4),
        p_value: safe_round(outcome.p_value, 6),
        significant,
        alpha,
        effect_size: effect.as_ref().and_then(|e| safe_round(e.value, 4)),
        effect_size_name: effect.as_ref().map(|e| e.name.to_string()),
        effect_size_interpretation: effect.as_ref().map(|e| e.magnitude),
        ci_lower: ci.and_then(|(lower, _)| safe_round(lower, 4)),
        ci_upper: ci.and_then(|(_, upper)| safe_round(upper, 4)),
        decision,
        interpretation,
        group_summaries: summaries,
    }
}

/// Values of the request variable per group of `group_variable`, in key order.
fn grouped_values(
    df: &DataFrame,
    request: &HypothesisTestRequest,
    policy: MissingPolicy,
) -> Result<Vec<(String, Vec<f64>)>> {
    let group_key = request.group_variable.clone().unwrap_or_default();
    let column = NumericColumn::from_frame(df, &request.variable)?;
    let groups = partition(df, &[group_key])?;
    Ok(groups
        .iter()
        .map(|g| (g.key.label(), column.select_rows(&g.rows).effective(policy)))
        .collect())
}

/// Rows where both measurements are present.
fn paired_values(df: &DataFrame, first: &str, second: &str) -> Result<(Vec<f64>, Vec<f64>)> {
    let a = column_numeric_values(df, first)?;
    let b = column_numeric_values(df, second)?;
    Ok(a.iter()
        .zip(&b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::DataProfiler;
    use crate::types::DatasetId;
    use chrono::Utc;

    fn record(df: &DataFrame) -> DatasetRecord {
        let columns = DataProfiler::analyze_columns(df, &Default::default()).unwrap();
        DatasetRecord {
            id: DatasetId(1),
            name: "test".to_string(),
            original_filename: "test.csv".to_string(),
            row_count: df.height(),
            col_count: df.width(),
            columns,
            created_at: Utc::now(),
        }
    }

    fn sample() -> DataFrame {
        df! {
            "group" => &["a", "a", "a", "a", "b", "b", "b", "b"],
            "before" => &[1.0, 2.0, 3.0, 4.0, 10.0, 11.0, 12.0, 13.0],
            "after" => &[2.0, 4.0, 6.0, 8.0, 11.0, 13.0, 15.0, 17.0],
        }
        .unwrap()
    }

    fn run(request: HypothesisTestRequest) -> Result<HypothesisTestResult> {
        let df = sample();
        let record = record(&df);
        run_hypothesis_test(&df, &record, &request, MissingPolicy::Drop, 0.05, 0.95)
    }

    // ==================== validation tests ====================

    #[test]
    fn test_missing_parameters_are_rejected() {
        let err = run(HypothesisTestRequest::new(HypothesisTestType::OneSampleT, "before")).unwrap_err();
        assert!(err.is_validation());

        let err = run(HypothesisTestRequest::new(HypothesisTestType::MannWhitney, "before")).unwrap_err();
        assert!(err.to_string().contains("group_variable"));

        let err = run(HypothesisTestRequest::new(HypothesisTestType::PairedT, "before")
            .with_paired_variable("nope"))
        .unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_parse_test_type() {
        assert_eq!(
            "kruskal-wallis".parse::<HypothesisTestType>().unwrap(),
            HypothesisTestType::KruskalWallis
        );
        assert!("chi_square".parse::<HypothesisTestType>().is_err());
    }

    // ==================== test execution tests ====================

    #[test]
    fn test_one_sample_with_confidence_interval() {
        let result = run(HypothesisTestRequest::new(HypothesisTestType::OneSampleT, "before")
            .with_test_value(0.0))
        .unwrap();
        assert!(result.significant);
        assert_eq!(result.decision, Decision::RejectNull);
        let (lower, upper) = (result.ci_lower.unwrap(), result.ci_upper.unwrap());
        assert!(lower < 7.0 && 7.0 < upper);
        assert_eq!(result.group_summaries[0].mean, Some(7.0));
    }

    #[test]
    fn test_mann_whitney_uses_first_two_groups() {
        let result = run(HypothesisTestRequest::new(HypothesisTestType::MannWhitney, "before")
            .with_group_variable("group"))
        .unwrap();
        assert_eq!(result.statistic, Some(0.0));
        // exact two-sided p for complete separation of 4 vs 4 is 2/70
        assert!((result.p_value.unwrap() - 0.028571).abs() < 1e-6);
        assert_eq!(result.group_summaries.len(), 2);
        assert_eq!(result.group_summaries[0].group, "a");
        assert_eq!(result.effect_size_interpretation, Some(EffectMagnitude::Large));
    }

    #[test]
    fn test_one_sided_mann_whitney() {
        let result = run(HypothesisTestRequest::new(HypothesisTestType::MannWhitney, "before")
            .with_group_variable("group")
            .with_alternative(Alternative::Less))
        .unwrap();
        assert!((result.p_value.unwrap() - 0.014286).abs() < 1e-6);
    }

    #[test]
    fn test_paired_t_and_wilcoxon() {
        let paired = run(HypothesisTestRequest::new(HypothesisTestType::PairedT, "after")
            .with_paired_variable("before"))
        .unwrap();
        assert!(paired.significant);
        assert_eq!(paired.effect_size_name.as_deref(), Some("Cohen's d"));

        let wilcoxon = run(HypothesisTestRequest::new(HypothesisTestType::Wilcoxon, "after")
            .with_paired_variable("before"))
        .unwrap();
        assert_eq!(wilcoxon.effect_size, None);
        assert!(wilcoxon.interpretation.starts_with("Wilcoxon signed-rank"));
    }

    #[test]
    fn test_anova_reports_eta_squared() {
        let result = run(HypothesisTestRequest::new(HypothesisTestType::OneWayAnova, "before")
            .with_group_variable("group"))
        .unwrap();
        assert!(result.significant);
        assert_eq!(result.effect_size_name.as_deref(), Some("Eta squared"));
        let eta = result.effect_size.unwrap();
        assert!(eta > 0.9 && eta <= 1.0);
    }
}
