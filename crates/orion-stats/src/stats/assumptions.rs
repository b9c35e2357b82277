//! Normality and variance-homogeneity checks across groups.

use serde::Serialize;
use tracing::debug;

use super::inference::{dagostino_pearson, levene_median, shapiro_wilk};

/// Shapiro-Wilk is used for groups with at least this many values...
const SHAPIRO_MIN: usize = 8;
/// ...and fewer than this many.
const SHAPIRO_MAX: usize = 5000;
/// D'Agostino-Pearson needs at least this many values.
const DAGOSTINO_MIN: usize = 20;

/// Result of checking the assumptions behind parametric group comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssumptionCheck {
    /// At least half of all groups passed their normality test.
    pub is_normal: bool,
    /// Levene's test (median centred) did not reject equal variances.
    pub is_homogeneous: bool,
    /// Groups whose normality test said "normal".
    pub normal_votes: usize,
    /// Groups for which a normality test could be run.
    pub evaluated_groups: usize,
}

/// Normality vote for one group, or `None` when no test applies or it fails.
pub fn group_normality_vote(values: &[f64], alpha: f64) -> Option<bool> {
    let n = values.len();
    let outcome = if (SHAPIRO_MIN..SHAPIRO_MAX).contains(&n) {
        shapiro_wilk(values)
    } else if n >= DAGOSTINO_MIN {
        dagostino_pearson(values)
    } else {
        return None;
    };

    match outcome {
        Ok(result) if result.p_value.is_finite() => Some(result.p_value > alpha),
        Ok(_) => None,
        Err(err) => {
            debug!(n, error = %err, "Normality test unavailable for group");
            None
        }
    }
}

/// Check normality (majority vote over groups) and homogeneity of variances.
///
/// The vote denominator is the number of groups, so groups too small to test
/// count against normality.
pub fn check_group_assumptions(groups: &[Vec<f64>], alpha: f64) -> AssumptionCheck {
    let votes: Vec<bool> = groups
        .iter()
        .filter_map(|g| group_normality_vote(g, alpha))
        .collect();
    let normal_votes = votes.iter().filter(|v| **v).count();
    let is_normal = !groups.is_empty() && normal_votes as f64 >= groups.len() as f64 * 0.5;

    let is_homogeneous = match levene_median(groups) {
        Ok(result) => result.p_value.is_finite() && result.p_value > alpha,
        Err(err) => {
            debug!(error = %err, "Levene test failed, assuming unequal variances");
            false
        }
    };

    AssumptionCheck {
        is_normal,
        is_homogeneous,
        normal_votes,
        evaluated_groups: votes.len(),
    }
}
