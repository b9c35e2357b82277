//! Per-variable normality diagnostics.

use serde::Serialize;
use tracing::debug;

use super::descriptive::{excess_kurtosis, skewness};
use super::inference::{TestOutcome, dagostino_pearson, ks_normal, shapiro_wilk};
use crate::error::Result;
use crate::utils::{mean, safe_round, sample_std};

const MIN_SAMPLE: usize = 3;
const SHAPIRO_MAX: usize = 5000;
const DAGOSTINO_MIN: usize = 20;

/// One normality test as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalityTestResult {
    pub test_name: String,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub is_normal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableNormality {
    pub variable: String,
    pub variable_name: String,
    pub n: usize,
    pub tests: Vec<NormalityTestResult>,
    pub overall_normal: bool,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub interpretation: String,
}

/// Run the applicable normality tests on an already policy-filtered sample.
///
/// Shapiro-Wilk runs below 5000 values, Kolmogorov-Smirnov against the fitted
/// normal always, D'Agostino-Pearson from 20 values. The verdict needs strictly
/// more than half of the tests that ran to say normal.
pub fn assess_normality(variable: &str, variable_name: &str, values: &[f64], alpha: f64) -> VariableNormality {
    let n = values.len();
    if n < MIN_SAMPLE {
        return VariableNormality {
            variable: variable.to_string(),
            variable_name: variable_name.to_string(),
            n,
            tests: Vec::new(),
            overall_normal: false,
            skewness: None,
            kurtosis: None,
            interpretation: format!(
                "{variable_name}: sample too small (n = {n}) to assess normality; at least {MIN_SAMPLE} values are needed."
            ),
        };
    }

    let mut tests = Vec::new();
    if n < SHAPIRO_MAX {
        push_test(&mut tests, "Shapiro-Wilk", shapiro_wilk(values), alpha);
    }
    push_test(
        &mut tests,
        "Kolmogorov-Smirnov",
        ks_normal(values, mean(values), sample_std(values)),
        alpha,
    );
    if n >= DAGOSTINO_MIN {
        push_test(&mut tests, "D'Agostino-Pearson", dagostino_pearson(values), alpha);
    }

    let passed = tests.iter().filter(|t| t.is_normal).count();
    let overall_normal = passed * 2 > tests.len();

    let skew = skewness(values).and_then(|s| safe_round(s, 4));
    let kurt = excess_kurtosis(values).and_then(|k| safe_round(k, 4));

    let interpretation = if overall_normal {
        format!(
            "{variable_name} appears normally distributed ({passed} of {} tests). Parametric tests are appropriate.",
            tests.len()
        )
    } else {
        format!(
            "{variable_name} does not appear normally distributed ({passed} of {} tests). Prefer non-parametric tests.",
            tests.len()
        )
    };

    VariableNormality {
        variable: variable.to_string(),
        variable_name: variable_name.to_string(),
        n,
        tests,
        overall_normal,
        skewness: skew,
        kurtosis: kurt,
        interpretation,
    }
}

fn push_test(tests: &mut Vec<NormalityTestResult>, name: &str, outcome: Result<TestOutcome>, alpha: f64) {
    match outcome {
        Ok(outcome) => tests.push(NormalityTestResult {
            test_name: name.to_string(),
            statistic: safe_round(outcome.statistic, 4),
            p_value: safe_round(outcome.p_value, 6),
            is_normal: outcome.p_value.is_finite() && outcome.p_value > alpha,
        }),
        Err(err) => debug!(test = name, error = %err, "Normality test skipped"),
    }
}

/// Summary sentence splitting variables into parametric and non-parametric use.
pub fn recommendation(results: &[VariableNormality]) -> String {
    let (normal, other): (Vec<&VariableNormality>, Vec<&VariableNormality>) =
        results.iter().partition(|r| r.overall_normal);
    let names = |items: &[&VariableNormality]| {
        items
            .iter()
            .map(|r| r.variable_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    match (normal.is_empty(), other.is_empty()) {
        (true, true) => "No variables were analyzed.".to_string(),
        (false, true) => "All variables look normal: parametric tests (t-test, ANOVA) are appropriate.".to_string(),
        (true, false) => {
            "No variable looks normal: prefer non-parametric tests (Mann-Whitney, Kruskal-Wallis).".to_string()
        }
        (false, false) => format!(
            "Use parametric tests for {} and non-parametric tests for {}.",
            names(&normal),
            names(&other)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::distribution::{ContinuousCDF, Normal};

    fn normal_sample(n: usize) -> Vec<f64> {
        let dist = Normal::new(50.0, 5.0).unwrap();
        (1..=n)
            .map(|i| dist.inverse_cdf(i as f64 / (n as f64 + 1.0)))
            .collect()
    }

    #[test]
    fn test_too_small_sample() {
        let result = assess_normality("x", "X", &[1.0, 2.0], 0.05);
        assert!(result.tests.is_empty());
        assert!(!result.overall_normal);
        assert!(result.interpretation.contains("too small"));
    }

    #[test]
    fn test_normal_sample_runs_three_tests() {
        let result = assess_normality("x", "X", &normal_sample(50), 0.05);
        let names: Vec<&str> = result.tests.iter().map(|t| t.test_name.as_str()).collect();
        assert_eq!(names, vec!["Shapiro-Wilk", "Kolmogorov-Smirnov", "D'Agostino-Pearson"]);
        assert!(result.overall_normal);
        assert!(result.skewness.unwrap().abs() < 0.1);
    }

    #[test]
    fn test_skewed_sample_is_not_normal() {
        let values: Vec<f64> = (0..40).map(|i| (i as f64 / 4.0).exp()).collect();
        let result = assess_normality("x", "X", &values, 0.05);
        assert!(!result.overall_normal);
        assert!(result.skewness.unwrap() > 1.0);
    }

    #[test]
    fn test_small_sample_skips_dagostino() {
        let result = assess_normality("x", "X", &normal_sample(10), 0.05);
        assert_eq!(result.tests.len(), 2);
    }

    #[test]
    fn test_recommendation_lists_both_kinds() {
        let normal = assess_normality("a", "Height", &normal_sample(30), 0.05);
        let skewed_values: Vec<f64> = (0..30).map(|i| (i as f64 / 3.0).exp()).collect();
        let skewed = assess_normality("b", "Income", &skewed_values, 0.05);

        let text = recommendation(&[normal, skewed]);
        assert_eq!(
            text,
            "Use parametric tests for Height and non-parametric tests for Income."
        );
        assert_eq!(recommendation(&[]), "No variables were analyzed.");
    }
}
