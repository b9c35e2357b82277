//! Automatic test selection and execution for group comparisons.
//!
//! For every variable the runner keeps groups with at least two values, checks
//! normality and homogeneity, picks the matching test from the decision table
//! below and reports the test together with an effect size:
//!
//! | groups | normal | homogeneous | test              | effect size     |
//! |--------|--------|-------------|-------------------|-----------------|
//! | 2      | yes    | yes         | Student's t       | Cohen's d       |
//! | 2      | yes    | no          | Welch's t         | Cohen's d       |
//! | 2      | no     | any         | Mann-Whitney U    | Cohen's d       |
//! | 3+     | yes    | yes         | one-way ANOVA     | eta squared     |
//! | 3+     | yes    | no          | Welch's ANOVA     | eta squared     |
//! | 3+     | no     | any         | Kruskal-Wallis H  | epsilon squared |
//!
//! Failures never escape: they become a [`ComparisonOutcome::Skipped`] with a
//! reason.

use tracing::{debug, warn};

use super::assumptions::{AssumptionCheck, check_group_assumptions};
use super::inference::{
    Alternative, TestOutcome, cohens_d, epsilon_squared, eta_squared, kruskal_wallis,
    mann_whitney_u, one_way_anova, student_t_test, welch_anova, welch_t_test,
};
use crate::config::MissingPolicy;
use crate::error::Result;
use crate::types::{
    AssumptionsMet, ComparisonOutcome, ComparisonTest, EffectMagnitude, GroupComparisonTest,
    SkipReason, SkippedComparison,
};
use crate::utils::{apply_missing_policy, format_p_value, mean, median, safe_round};

/// A group must have at least this many values to take part in a comparison.
pub const MIN_GROUP_SIZE: usize = 2;

/// Groups smaller than this trigger a caution in the practical explanation.
const SMALL_GROUP_WARNING: usize = 10;

/// One group's raw values for the variable under comparison.
#[derive(Debug, Clone)]
pub struct LabelledValues {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

impl LabelledValues {
    pub fn new(label: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }
}

/// Pick the comparison test for the given number of valid groups and assumptions.
pub fn select_test(n_groups: usize, is_normal: bool, is_homogeneous: bool) -> ComparisonTest {
    match (n_groups, is_normal, is_homogeneous) {
        (2, true, true) => ComparisonTest::StudentT,
        (2, true, false) => ComparisonTest::WelchT,
        (2, false, _) => ComparisonTest::MannWhitney,
        (_, true, true) => ComparisonTest::OneWayAnova,
        (_, true, false) => ComparisonTest::WelchAnova,
        (_, false, _) => ComparisonTest::KruskalWallis,
    }
}

/// Run the selected test on groups that already passed the size filter.
pub fn run_test(test: ComparisonTest, groups: &[Vec<f64>]) -> Result<TestOutcome> {
    match test {
        ComparisonTest::StudentT => student_t_test(&groups[0], &groups[1]),
        ComparisonTest::WelchT => welch_t_test(&groups[0], &groups[1]),
        ComparisonTest::MannWhitney => {
            mann_whitney_u(&groups[0], &groups[1], Alternative::TwoSided)
        }
        ComparisonTest::OneWayAnova => one_way_anova(groups),
        ComparisonTest::WelchAnova => welch_anova(groups),
        ComparisonTest::KruskalWallis => kruskal_wallis(groups),
    }
}

/// Effect size matching `test` and its conventional magnitude label.
pub fn effect_size(
    test: ComparisonTest,
    groups: &[Vec<f64>],
    outcome: &TestOutcome,
) -> (f64, EffectMagnitude) {
    match test {
        ComparisonTest::StudentT | ComparisonTest::WelchT | ComparisonTest::MannWhitney => {
            let d = cohens_d(&groups[0], &groups[1]);
            (d, EffectMagnitude::from_cohens_d(d))
        }
        ComparisonTest::OneWayAnova | ComparisonTest::WelchAnova => {
            let eta = eta_squared(groups);
            (eta, EffectMagnitude::from_variance_explained(eta))
        }
        ComparisonTest::KruskalWallis => {
            let n = groups.iter().map(Vec::len).sum();
            let eps = epsilon_squared(outcome.statistic, n, groups.len());
            (eps, EffectMagnitude::from_variance_explained(eps))
        }
    }
}

/// Compare one variable across groups.
///
/// `groups` holds every group of the partition in the order results should
/// refer to them; groups with fewer than [`MIN_GROUP_SIZE`] values after the
/// missing-value policy are dropped before anything else happens.
pub fn compare_groups(
    variable: &str,
    variable_name: &str,
    groups: &[LabelledValues],
    policy: MissingPolicy,
    alpha: f64,
) -> ComparisonOutcome {
    let skip = |reason: SkipReason| {
        debug!(variable, %reason, "Skipping group comparison");
        ComparisonOutcome::Skipped(SkippedComparison {
            variable: variable.to_string(),
            variable_name: variable_name.to_string(),
            reason,
        })
    };

    let (labels, data): (Vec<&str>, Vec<Vec<f64>>) = groups
        .iter()
        .map(|g| (g.label.as_str(), apply_missing_policy(&g.values, policy)))
        .filter(|(_, values)| values.len() >= MIN_GROUP_SIZE)
        .unzip();

    if data.len() < 2 {
        return skip(SkipReason::InsufficientGroups {
            valid_groups: data.len(),
        });
    }

    let check = check_group_assumptions(&data, alpha);
    let test = select_test(data.len(), check.is_normal, check.is_homogeneous);

    let outcome = match run_test(test, &data) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(variable, test = test.display_name(), error = %err, "Comparison test failed");
            return skip(SkipReason::TestFailed {
                message: err.to_string(),
            });
        }
    };

    let (Some(statistic), Some(p_value)) =
        (safe_round(outcome.statistic, 4), safe_round(outcome.p_value, 6))
    else {
        return skip(SkipReason::NonFiniteResult);
    };

    let (effect, magnitude) = effect_size(test, &data, &outcome);
    let significant = outcome.p_value < alpha;

    let interpretation = interpretation_text(
        variable_name,
        test,
        &outcome,
        significant,
        effect,
        magnitude,
        check.is_normal,
    );
    let practical_explanation =
        practical_explanation(variable_name, significant, magnitude, check.is_normal, &labels, &data);

    debug!(
        variable,
        test = test.display_name(),
        statistic,
        p_value,
        significant,
        "Group comparison completed"
    );

    ComparisonOutcome::Completed(Box::new(GroupComparisonTest {
        variable: variable.to_string(),
        variable_name: variable_name.to_string(),
        test,
        test_name: test.display_name().to_string(),
        statistic,
        p_value,
        significant,
        alpha,
        effect_size: safe_round(effect, 4),
        effect_size_name: test.effect_size_name().to_string(),
        effect_size_interpretation: Some(magnitude),
        assumptions_met: assumptions_met(&check),
        interpretation,
        practical_explanation,
    }))
}

fn assumptions_met(check: &AssumptionCheck) -> AssumptionsMet {
    AssumptionsMet {
        normality: check.is_normal,
        homogeneity: check.is_homogeneous,
    }
}

fn interpretation_text(
    variable_name: &str,
    test: ComparisonTest,
    outcome: &TestOutcome,
    significant: bool,
    effect: f64,
    magnitude: EffectMagnitude,
    is_normal: bool,
) -> String {
    let details = format!(
        "({}, statistic = {:.2}, {})",
        test.display_name(),
        outcome.statistic,
        format_p_value(outcome.p_value)
    );
    let mut text = if significant {
        format!(
            "There is a statistically significant difference in {variable_name} between groups {details}."
        )
    } else {
        format!("There is no significant difference in {variable_name} between groups {details}.")
    };
    text.push_str(&format!(
        " Effect size ({} = {effect:.3}): {magnitude}.",
        test.effect_size_name()
    ));
    if !is_normal {
        text.push_str(" A non-parametric test was used because normality was not met.");
    }
    text
}

/// Plain-language summary naming the groups with the highest and lowest centre.
///
/// The centre is the mean when the data looked normal and the median otherwise.
pub fn practical_explanation(
    variable_name: &str,
    significant: bool,
    magnitude: EffectMagnitude,
    is_normal: bool,
    labels: &[&str],
    groups: &[Vec<f64>],
) -> String {
    if groups.len() < 2 || labels.len() < 2 {
        return format!(
            "In practice, there are not enough groups yet to explain the impact of {variable_name} reliably."
        );
    }

    let center_label = if is_normal { "mean" } else { "median" };
    let centers: Vec<f64> = groups
        .iter()
        .map(|g| if is_normal { mean(g) } else { median(g) })
        .collect();

    // First occurrence wins on ties.
    let mut top = 0;
    let mut bottom = 0;
    for (i, c) in centers.iter().enumerate() {
        if *c > centers[top] {
            top = i;
        }
        if *c < centers[bottom] {
            bottom = i;
        }
    }
    let delta = centers[top] - centers[bottom];

    let (intro, action) = if significant {
        match magnitude {
            EffectMagnitude::Large | EffectMagnitude::Medium => (
                format!(
                    "In practice, the groups really do behave differently in {variable_name}. The impact was rated {magnitude}."
                ),
                format!(
                    " Look into why group '{}' is ahead of '{}' and try to replicate what works.",
                    labels[top], labels[bottom]
                ),
            ),
            EffectMagnitude::Small => (
                format!(
                    "In practice, there is a difference in {variable_name}, but the impact tends to be small."
                ),
                " Treat this as supporting evidence and check cost, process and targets before changing anything."
                    .to_string(),
            ),
            EffectMagnitude::Negligible => (
                format!(
                    "In practice, a difference in {variable_name} was detected, but it is very small."
                ),
                " Avoid deciding on this test alone; combine it with business indicators.".to_string(),
            ),
        }
    } else {
        (
            format!("In practice, with the current data, the groups look alike in {variable_name}."),
            " There is no strong signal to treat the groups differently right now; keep monitoring."
                .to_string(),
        )
    };

    let context = if top == bottom || delta.abs() < 1e-12 {
        format!(" The group {center_label}s are very close to each other.")
    } else {
        format!(
            " Quick reference: highest {center_label} in group '{}' ({}) and lowest in group '{}' ({}), a gap of about {}.",
            labels[top],
            format_two_decimals(centers[top]),
            labels[bottom],
            format_two_decimals(centers[bottom]),
            format_two_decimals(delta)
        )
    };

    let normality_note = if is_normal {
        ""
    } else {
        " Since the data did not look normal, groups were compared by rank, which is more robust to outliers."
    };

    let sample_note = if groups.iter().any(|g| g.len() < SMALL_GROUP_WARNING) {
        " At least one group has few records; confirm with more data before a final decision."
    } else {
        ""
    };

    format!("{intro}{context}{action}{normality_note}{sample_note}")
}

fn format_two_decimals(value: f64) -> String {
    safe_round(value, 2).map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}
