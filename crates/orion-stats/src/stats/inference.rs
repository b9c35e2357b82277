//! Statistical test primitives.
//!
//! Every test returns a [`TestOutcome`] or a [`StatsError::TestFailed`] when
//! the samples make it undefined. Distribution functions come from `statrs`;
//! p-values follow the usual SciPy defaults (two-sided unless stated,
//! Mann-Whitney with continuity correction, Wilcoxon without).

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

use crate::error::{Result, StatsError};
use crate::utils::{average_ranks, mean, median, sample_variance, sorted_copy, tie_term};

/// Direction of the alternative hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alternative {
    #[default]
    TwoSided,
    Greater,
    Less,
}

/// Statistic and p-value of a test, with degrees of freedom where they apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
    pub df: Option<f64>,
    /// Denominator degrees of freedom for F tests.
    pub df2: Option<f64>,
}

impl TestOutcome {
    fn new(statistic: f64, p_value: f64) -> Self {
        Self {
            statistic,
            p_value: p_value.clamp(0.0, 1.0),
            df: None,
            df2: None,
        }
    }

    fn with_df(mut self, df: f64) -> Self {
        self.df = Some(df);
        self
    }

    fn with_df2(mut self, df2: f64) -> Self {
        self.df2 = Some(df2);
        self
    }

    /// Both statistic and p-value are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.statistic.is_finite() && self.p_value.is_finite()
    }
}

// =============================================================================
// Distribution helpers
// =============================================================================

fn t_p_value(t: f64, df: f64, alternative: Alternative, test: &str) -> Result<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| StatsError::test_failed(test, e.to_string()))?;
    Ok(match alternative {
        Alternative::TwoSided => 2.0 * dist.sf(t.abs()),
        Alternative::Greater => dist.sf(t),
        Alternative::Less => dist.cdf(t),
    })
}

fn f_p_value(f: f64, df1: f64, df2: f64, test: &str) -> Result<f64> {
    let dist = FisherSnedecor::new(df1, df2).map_err(|e| StatsError::test_failed(test, e.to_string()))?;
    Ok(dist.sf(f))
}

fn chi2_p_value(x: f64, df: f64, test: &str) -> Result<f64> {
    let dist = ChiSquared::new(df).map_err(|e| StatsError::test_failed(test, e.to_string()))?;
    Ok(dist.sf(x))
}

fn standard_normal() -> Normal {
    Normal::standard()
}

fn require(condition: bool, test: &str, reason: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(StatsError::test_failed(test, reason))
    }
}

// =============================================================================
// t-tests
// =============================================================================

/// Two-sample t-test assuming equal variances.
pub fn student_t_test(a: &[f64], b: &[f64]) -> Result<TestOutcome> {
    const TEST: &str = "Student's t-test";
    require(a.len() >= 2 && b.len() >= 2, TEST, "each group needs at least 2 values")?;

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let df = n1 + n2 - 2.0;
    let pooled = ((n1 - 1.0) * sample_variance(a) + (n2 - 1.0) * sample_variance(b)) / df;
    let se = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();
    require(se > 0.0, TEST, "both groups have zero variance")?;

    let t = (mean(a) - mean(b)) / se;
    let p = t_p_value(t, df, Alternative::TwoSided, TEST)?;
    Ok(TestOutcome::new(t, p).with_df(df))
}

/// Two-sample t-test with Welch-Satterthwaite degrees of freedom.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<TestOutcome> {
    const TEST: &str = "Welch's t-test";
    require(a.len() >= 2 && b.len() >= 2, TEST, "each group needs at least 2 values")?;

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let v1 = sample_variance(a) / n1;
    let v2 = sample_variance(b) / n2;
    let se = (v1 + v2).sqrt();
    require(se > 0.0, TEST, "both groups have zero variance")?;

    let t = (mean(a) - mean(b)) / se;
    let df = (v1 + v2).powi(2) / (v1.powi(2) / (n1 - 1.0) + v2.powi(2) / (n2 - 1.0));
    let p = t_p_value(t, df, Alternative::TwoSided, TEST)?;
    Ok(TestOutcome::new(t, p).with_df(df))
}

/// One-sample t-test of the mean against `mu`.
pub fn one_sample_t_test(values: &[f64], mu: f64) -> Result<TestOutcome> {
    const TEST: &str = "One-sample t-test";
    require(values.len() >= 2, TEST, "need at least 2 values")?;

    let n = values.len() as f64;
    let se = (sample_variance(values) / n).sqrt();
    require(se > 0.0, TEST, "sample has zero variance")?;

    let t = (mean(values) - mu) / se;
    let df = n - 1.0;
    let p = t_p_value(t, df, Alternative::TwoSided, TEST)?;
    Ok(TestOutcome::new(t, p).with_df(df))
}

/// Paired t-test on matched observations.
pub fn paired_t_test(a: &[f64], b: &[f64]) -> Result<TestOutcome> {
    const TEST: &str = "Paired t-test";
    require(a.len() == b.len(), TEST, "samples must have the same length")?;
    let diffs: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
    one_sample_t_test(&diffs, 0.0).map_err(|_| {
        StatsError::test_failed(TEST, "need at least 2 pairs with non-constant differences")
    })
}

// =============================================================================
// Rank tests
// =============================================================================

/// Mann-Whitney U test. The statistic is U of the first sample.
///
/// Uses the exact null distribution when there are no ties and the smaller
/// sample has at most 8 values, else the normal approximation with tie and
/// continuity corrections.
pub fn mann_whitney_u(a: &[f64], b: &[f64], alternative: Alternative) -> Result<TestOutcome> {
    const TEST: &str = "Mann-Whitney U";
    require(!a.is_empty() && !b.is_empty(), TEST, "both samples must be non-empty")?;

    let (n1, n2) = (a.len(), b.len());
    let combined: Vec<f64> = a.iter().chain(b).copied().collect();
    let (ranks, ties) = average_ranks(&combined);
    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;

    let u = match alternative {
        Alternative::TwoSided => u1.max(u2),
        Alternative::Greater => u1,
        Alternative::Less => u2,
    };

    let has_ties = ties.iter().any(|&t| t > 1);
    let one_sided_p = if !has_ties && n1.min(n2) <= 8 {
        let dist = mann_whitney_null_counts(n1.min(n2), n1.max(n2));
        upper_tail(&dist, u.round() as usize)
    } else {
        let n = (n1 + n2) as f64;
        let mu = (n1 * n2) as f64 / 2.0;
        let s = ((n1 * n2) as f64 / 12.0 * ((n + 1.0) - tie_term(&ties) / (n * (n - 1.0)))).sqrt();
        if s > 0.0 {
            let z = (u - mu - 0.5) / s;
            standard_normal().sf(z)
        } else {
            // Every value tied: no evidence of a shift.
            1.0
        }
    };

    let p = match alternative {
        Alternative::TwoSided => 2.0 * one_sided_p,
        _ => one_sided_p,
    };
    Ok(TestOutcome::new(u1, p))
}

/// Number of arrangements giving each U in `0..=m*n` (Gaussian binomial coefficients).
fn mann_whitney_null_counts(m: usize, n: usize) -> Vec<f64> {
    let max_u = m * n;
    let mut counts = vec![0.0; max_u + 1];
    counts[0] = 1.0;
    for i in 1..=m {
        let shift = n + i;
        for u in (shift..=max_u).rev() {
            counts[u] -= counts[u - shift];
        }
        for u in i..=max_u {
            counts[u] += counts[u - i];
        }
    }
    counts
}

/// P(X >= k) for a distribution given as counts.
fn upper_tail(counts: &[f64], k: usize) -> f64 {
    let total: f64 = counts.iter().sum();
    if k >= counts.len() {
        return 0.0;
    }
    counts[k..].iter().sum::<f64>() / total
}

/// P(X <= k) for a distribution given as counts.
fn lower_tail(counts: &[f64], k: usize) -> f64 {
    let total: f64 = counts.iter().sum();
    let end = k.min(counts.len() - 1);
    counts[..=end].iter().sum::<f64>() / total
}

/// Kruskal-Wallis H test with tie correction.
pub fn kruskal_wallis(groups: &[Vec<f64>]) -> Result<TestOutcome> {
    const TEST: &str = "Kruskal-Wallis H";
    require(groups.len() >= 2, TEST, "need at least 2 groups")?;
    require(groups.iter().all(|g| !g.is_empty()), TEST, "every group must be non-empty")?;

    let combined: Vec<f64> = groups.iter().flatten().copied().collect();
    let n = combined.len() as f64;
    let (ranks, ties) = average_ranks(&combined);

    let mut offset = 0;
    let mut rank_term = 0.0;
    for group in groups {
        let rank_sum: f64 = ranks[offset..offset + group.len()].iter().sum();
        rank_term += rank_sum * rank_sum / group.len() as f64;
        offset += group.len();
    }

    let h = 12.0 / (n * (n + 1.0)) * rank_term - 3.0 * (n + 1.0);
    let correction = 1.0 - tie_term(&ties) / (n * n * n - n);
    require(correction > 0.0, TEST, "all values are identical")?;
    let h = h / correction;

    let df = (groups.len() - 1) as f64;
    let p = chi2_p_value(h, df, TEST)?;
    Ok(TestOutcome::new(h, p).with_df(df))
}

/// Wilcoxon signed-rank test on paired differences.
///
/// Zero differences are discarded. For a two-sided test the statistic is the
/// smaller of the positive and negative rank sums, otherwise the positive sum.
pub fn wilcoxon_signed_rank(differences: &[f64], alternative: Alternative) -> Result<TestOutcome> {
    const TEST: &str = "Wilcoxon signed-rank";
    let original_n = differences.len();
    let nonzero: Vec<f64> = differences.iter().copied().filter(|d| *d != 0.0).collect();
    require(!nonzero.is_empty(), TEST, "all differences are zero")?;

    let abs: Vec<f64> = nonzero.iter().map(|d| d.abs()).collect();
    let (ranks, ties) = average_ranks(&abs);
    let r_plus: f64 = nonzero
        .iter()
        .zip(&ranks)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, r)| r)
        .sum();
    let count = nonzero.len();
    let total = (count * (count + 1)) as f64 / 2.0;
    let r_minus = total - r_plus;

    let statistic = match alternative {
        Alternative::TwoSided => r_plus.min(r_minus),
        _ => r_plus,
    };

    let has_ties = ties.iter().any(|&t| t > 1);
    let exact = original_n <= 50 && count == original_n && !has_ties;

    let p = if exact {
        let dist = signed_rank_null_counts(count);
        let k = statistic.round() as usize;
        match alternative {
            Alternative::TwoSided => 2.0 * lower_tail(&dist, k),
            Alternative::Greater => upper_tail(&dist, k),
            Alternative::Less => lower_tail(&dist, k),
        }
    } else {
        let n = count as f64;
        let mn = n * (n + 1.0) / 4.0;
        let mut se = n * (n + 1.0) * (2.0 * n + 1.0);
        se -= 0.5 * tie_term(&ties);
        let se = (se / 24.0).sqrt();
        require(se > 0.0, TEST, "degenerate rank variance")?;
        let z = (statistic - mn) / se;
        let normal = standard_normal();
        match alternative {
            Alternative::TwoSided => 2.0 * normal.sf(z.abs()),
            Alternative::Greater => normal.sf(z),
            Alternative::Less => normal.cdf(z),
        }
    };

    Ok(TestOutcome::new(statistic, p))
}

/// Number of sign assignments giving each positive rank sum for ranks `1..=n`.
fn signed_rank_null_counts(n: usize) -> Vec<f64> {
    let max_sum = n * (n + 1) / 2;
    let mut counts = vec![0.0; max_sum + 1];
    counts[0] = 1.0;
    for rank in 1..=n {
        for s in (rank..=max_sum).rev() {
            counts[s] += counts[s - rank];
        }
    }
    counts
}

// =============================================================================
// Variance-based tests
// =============================================================================

/// One-way ANOVA F test.
pub fn one_way_anova(groups: &[Vec<f64>]) -> Result<TestOutcome> {
    const TEST: &str = "One-way ANOVA";
    require(groups.len() >= 2, TEST, "need at least 2 groups")?;
    require(groups.iter().all(|g| !g.is_empty()), TEST, "every group must be non-empty")?;

    let k = groups.len() as f64;
    let n: f64 = groups.iter().map(|g| g.len() as f64).sum();
    require(n > k, TEST, "not enough observations for within-group variance")?;

    let (ss_between, ss_within) = sums_of_squares(groups);
    let df_between = k - 1.0;
    let df_within = n - k;
    require(ss_within > 0.0, TEST, "no variance within groups")?;

    let f = (ss_between / df_between) / (ss_within / df_within);
    let p = f_p_value(f, df_between, df_within, TEST)?;
    Ok(TestOutcome::new(f, p).with_df(df_between).with_df2(df_within))
}

/// Welch's heteroscedastic one-way ANOVA.
pub fn welch_anova(groups: &[Vec<f64>]) -> Result<TestOutcome> {
    const TEST: &str = "Welch's ANOVA";
    require(groups.len() >= 2, TEST, "need at least 2 groups")?;
    require(groups.iter().all(|g| g.len() >= 2), TEST, "each group needs at least 2 values")?;

    let k = groups.len() as f64;
    let weights: Vec<f64> = groups
        .iter()
        .map(|g| g.len() as f64 / sample_variance(g))
        .collect();
    require(
        weights.iter().all(|w| w.is_finite()),
        TEST,
        "a group has zero variance",
    )?;

    let means: Vec<f64> = groups.iter().map(|g| mean(g)).collect();
    let total_weight: f64 = weights.iter().sum();
    let weighted_mean: f64 = weights.iter().zip(&means).map(|(w, m)| w * m).sum::<f64>() / total_weight;

    let between: f64 = weights
        .iter()
        .zip(&means)
        .map(|(w, m)| w * (m - weighted_mean).powi(2))
        .sum::<f64>()
        / (k - 1.0);
    let lambda: f64 = groups
        .iter()
        .zip(&weights)
        .map(|(g, w)| (1.0 - w / total_weight).powi(2) / (g.len() as f64 - 1.0))
        .sum();

    let f = between / (1.0 + 2.0 * (k - 2.0) / (k * k - 1.0) * lambda);
    let df1 = k - 1.0;
    let df2 = (k * k - 1.0) / (3.0 * lambda);
    let p = f_p_value(f, df1, df2, TEST)?;
    Ok(TestOutcome::new(f, p).with_df(df1).with_df2(df2))
}

/// Levene's test centred on group medians (Brown-Forsythe variant).
pub fn levene_median(groups: &[Vec<f64>]) -> Result<TestOutcome> {
    const TEST: &str = "Levene";
    require(groups.len() >= 2, TEST, "need at least 2 groups")?;
    require(groups.iter().all(|g| !g.is_empty()), TEST, "every group must be non-empty")?;

    let deviations: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| {
            let center = median(g);
            g.iter().map(|v| (v - center).abs()).collect()
        })
        .collect();

    let k = groups.len() as f64;
    let n: f64 = groups.iter().map(|g| g.len() as f64).sum();
    require(n > k, TEST, "not enough observations")?;

    let (between, within) = sums_of_squares(&deviations);
    require(within > 0.0, TEST, "no spread around group medians")?;

    let w = (n - k) / (k - 1.0) * between / within;
    let p = f_p_value(w, k - 1.0, n - k, TEST)?;
    Ok(TestOutcome::new(w, p).with_df(k - 1.0).with_df2(n - k))
}

/// Between- and within-group sums of squares.
fn sums_of_squares(groups: &[Vec<f64>]) -> (f64, f64) {
    let all: Vec<f64> = groups.iter().flatten().copied().collect();
    let grand_mean = mean(&all);
    groups.iter().fold((0.0, 0.0), |(between, within), g| {
        let m = mean(g);
        (
            between + g.len() as f64 * (m - grand_mean).powi(2),
            within + g.iter().map(|v| (v - m).powi(2)).sum::<f64>(),
        )
    })
}

// =============================================================================
// Contingency and goodness of fit
// =============================================================================

/// Chi-square test of independence on an observed count table.
///
/// Yates' continuity correction is applied when the table has one degree of
/// freedom. Fails when any expected count is zero.
pub fn chi_square_independence(observed: &[Vec<f64>]) -> Result<TestOutcome> {
    const TEST: &str = "Chi-square";
    let rows = observed.len();
    let cols = observed.first().map_or(0, Vec::len);
    require(rows >= 2 && cols >= 2, TEST, "table must be at least 2x2")?;

    let row_totals: Vec<f64> = observed.iter().map(|r| r.iter().sum()).collect();
    let col_totals: Vec<f64> = (0..cols).map(|j| observed.iter().map(|r| r[j]).sum()).collect();
    let total: f64 = row_totals.iter().sum();
    require(total > 0.0, TEST, "table is empty")?;

    let dof = (rows - 1) * (cols - 1);
    let mut chi2 = 0.0;
    for (i, row) in observed.iter().enumerate() {
        for (j, &obs) in row.iter().enumerate() {
            let expected = row_totals[i] * col_totals[j] / total;
            require(expected > 0.0, TEST, "an expected frequency is zero")?;
            let obs = if dof == 1 {
                let diff = expected - obs;
                obs + diff.signum() * diff.abs().min(0.5)
            } else {
                obs
            };
            chi2 += (obs - expected).powi(2) / expected;
        }
    }

    let p = chi2_p_value(chi2, dof as f64, TEST)?;
    Ok(TestOutcome::new(chi2, p).with_df(dof as f64))
}

/// Largest sample for which KS p-values come from the exact distribution.
const KS_EXACT_MAX_N: usize = 140;

/// Kolmogorov-Smirnov test against a normal with the given parameters.
///
/// Up to [`KS_EXACT_MAX_N`] values the p-value comes from the exact
/// distribution of D; larger samples use the asymptotic Kolmogorov
/// distribution with Stephens' correction.
pub fn ks_normal(values: &[f64], mu: f64, sigma: f64) -> Result<TestOutcome> {
    const TEST: &str = "Kolmogorov-Smirnov";
    require(!values.is_empty(), TEST, "sample is empty")?;
    require(sigma > 0.0 && sigma.is_finite(), TEST, "standard deviation must be positive")?;

    let dist = Normal::new(mu, sigma).map_err(|e| StatsError::test_failed(TEST, e.to_string()))?;
    let sorted = sorted_copy(values);
    let n = sorted.len() as f64;
    let d = sorted
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let cdf = dist.cdf(x);
            let above = (i as f64 + 1.0) / n - cdf;
            let below = cdf - i as f64 / n;
            above.max(below)
        })
        .fold(0.0, f64::max);

    let p = if sorted.len() <= KS_EXACT_MAX_N {
        1.0 - kolmogorov_exact_cdf(sorted.len(), d)
    } else {
        let sqrt_n = n.sqrt();
        kolmogorov_sf((sqrt_n + 0.12 + 0.11 / sqrt_n) * d)
    };
    Ok(TestOutcome::new(d, p))
}

/// `P(D_n < d)` for the one-sample KS statistic (Marsaglia, Tsang and Wang, 2003).
///
/// Entries of the matrix power are rescaled by `1e140` and the exponent kept
/// apart, so the result stays finite for every `n` this is called with.
fn kolmogorov_exact_cdf(n: usize, d: f64) -> f64 {
    if d <= 0.0 {
        return 0.0;
    }
    if d >= 1.0 {
        return 1.0;
    }
    let nf = n as f64;
    let s = d * d * nf;
    if s > 7.24 || (s > 3.76 && n > 99) {
        // Right tail, accurate to about 7 digits.
        return 1.0 - 2.0 * (-(2.000071 + 0.331 / nf.sqrt() + 1.409 / nf) * s).exp();
    }

    let nd = nf * d;
    let k = nd.floor() as usize + 1;
    let m = 2 * k - 1;
    let h = k as f64 - nd;

    let mut matrix = vec![0.0; m * m];
    for i in 0..m {
        for j in 0..=(i + 1).min(m - 1) {
            matrix[i * m + j] = 1.0;
        }
    }
    for i in 0..m {
        matrix[i * m] -= h.powi(i as i32 + 1);
        matrix[(m - 1) * m + i] -= h.powi((m - i) as i32);
    }
    if 2.0 * h - 1.0 > 0.0 {
        matrix[(m - 1) * m] += (2.0 * h - 1.0).powi(m as i32);
    }
    for i in 0..m {
        for j in 0..=i {
            let factorial: f64 = (1..=(i + 1 - j)).map(|g| g as f64).product();
            matrix[i * m + j] /= factorial;
        }
    }

    let (power, mut exponent) = matrix_power(&matrix, 0, m, n);
    let mut cdf = power[(k - 1) * m + k - 1];
    for i in 1..=n {
        cdf = cdf * i as f64 / nf;
        if cdf < 1e-140 {
            cdf *= 1e140;
            exponent -= 140;
        }
    }
    (cdf * 10f64.powi(exponent)).clamp(0.0, 1.0)
}

/// `a^n` for a square `m x m` matrix, as a scaled matrix and a power-of-ten exponent.
fn matrix_power(a: &[f64], a_exp: i32, m: usize, n: usize) -> (Vec<f64>, i32) {
    if n == 1 {
        return (a.to_vec(), a_exp);
    }
    let (half, half_exp) = matrix_power(a, a_exp, m, n / 2);
    let mut result = matrix_multiply(&half, &half, m);
    let mut exp = 2 * half_exp;
    if n % 2 == 1 {
        result = matrix_multiply(a, &result, m);
        exp += a_exp;
    }
    if result[(m / 2) * m + m / 2] > 1e140 {
        result.iter_mut().for_each(|x| *x *= 1e-140);
        exp += 140;
    }
    (result, exp)
}

fn matrix_multiply(a: &[f64], b: &[f64], m: usize) -> Vec<f64> {
    let mut out = vec![0.0; m * m];
    for i in 0..m {
        for k in 0..m {
            let aik = a[i * m + k];
            if aik == 0.0 {
                continue;
            }
            for j in 0..m {
                out[i * m + j] += aik * b[k * m + j];
            }
        }
    }
    out
}

/// Survival function of the Kolmogorov distribution.
fn kolmogorov_sf(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    if lambda < 1.18 {
        let y = (-std::f64::consts::PI.powi(2) / (8.0 * lambda * lambda)).exp();
        let cdf = (2.0 * std::f64::consts::PI).sqrt() / lambda * (y + y.powi(9) + y.powi(25) + y.powi(49));
        (1.0 - cdf).clamp(0.0, 1.0)
    } else {
        let x = (-2.0 * lambda * lambda).exp();
        (2.0 * (x - x.powi(4) + x.powi(9) - x.powi(16))).clamp(0.0, 1.0)
    }
}

/// Shapiro-Wilk W test.
pub fn shapiro_wilk(values: &[f64]) -> Result<TestOutcome> {
    let result = normality::shapiro_wilk(values.to_vec())
        .map_err(|e| StatsError::test_failed("Shapiro-Wilk", format!("{e:?}")))?;
    Ok(TestOutcome::new(result.statistic, result.p_value))
}

/// D'Agostino-Pearson K² omnibus test.
pub fn dagostino_pearson(values: &[f64]) -> Result<TestOutcome> {
    let result = normality::dagostino_k_squared(values.to_vec())
        .map_err(|e| StatsError::test_failed("D'Agostino-Pearson", format!("{e:?}")))?;
    Ok(TestOutcome::new(result.statistic, result.p_value))
}

// =============================================================================
// Effect sizes
// =============================================================================

/// Cohen's d with the average of the two sample variances; 0 when both are 0.
pub fn cohens_d(a: &[f64], b: &[f64]) -> f64 {
    let pooled = ((sample_variance(a) + sample_variance(b)) / 2.0).sqrt();
    if pooled > 0.0 {
        (mean(a) - mean(b)).abs() / pooled
    } else {
        0.0
    }
}

/// Share of total variance explained by group membership.
pub fn eta_squared(groups: &[Vec<f64>]) -> f64 {
    let (between, within) = sums_of_squares(groups);
    let total = between + within;
    if total > 0.0 { between / total } else { 0.0 }
}

/// Rank-based effect size for Kruskal-Wallis, clamped to `[0, 1]`.
pub fn epsilon_squared(h: f64, n: usize, k: usize) -> f64 {
    if n <= k {
        return 0.0;
    }
    ((h - k as f64 + 1.0) / (n - k) as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {expected}, got {actual}"
        );
    }

    // ==================== t-test tests ====================

    #[test]
    fn test_student_t_matches_reference() {
        // scipy.stats.ttest_ind([1,2,3,4,5], [2,4,6,8,10]) -> t=-1.8974, p=0.0943
        let out = student_t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 4.0, 6.0, 8.0, 10.0]).unwrap();
        assert_close(out.statistic, -1.8974, 1e-3);
        assert_close(out.p_value, 0.0943, 1e-3);
        assert_eq!(out.df, Some(8.0));
    }

    #[test]
    fn test_welch_t_df_is_fractional() {
        let out = welch_t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 4.0, 6.0, 8.0, 10.0]).unwrap();
        assert_close(out.statistic, -1.8974, 1e-3);
        // Welch-Satterthwaite: 5.882
        assert_close(out.df.unwrap(), 5.882, 1e-2);
    }

    #[test]
    fn test_t_tests_reject_constant_groups() {
        assert!(student_t_test(&[1.0, 1.0], &[1.0, 1.0]).is_err());
        assert!(welch_t_test(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_one_sample_and_paired() {
        let out = one_sample_t_test(&[5.1, 4.9, 5.3, 5.2, 4.8], 5.0).unwrap();
        assert!(out.p_value > 0.3);

        let before = [10.0, 12.0, 9.0, 11.0, 13.0];
        let after = [12.0, 14.5, 10.0, 13.0, 15.5];
        let paired = paired_t_test(&before, &after).unwrap();
        assert!(paired.statistic < 0.0);
        assert!(paired.p_value < 0.01);
    }

    // ==================== rank test tests ====================

    #[test]
    fn test_mann_whitney_exact_complete_separation() {
        // scipy: mannwhitneyu([1..5], [100..500]) -> U=0, p=0.00794 (exact)
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [100.0, 200.0, 300.0, 400.0, 500.0];
        let out = mann_whitney_u(&a, &b, Alternative::TwoSided).unwrap();
        assert_eq!(out.statistic, 0.0);
        assert_close(out.p_value, 2.0 / 252.0, 1e-9);
    }

    #[test]
    fn test_mann_whitney_one_sided() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [100.0, 200.0, 300.0, 400.0, 500.0];
        let less = mann_whitney_u(&a, &b, Alternative::Less).unwrap();
        let greater = mann_whitney_u(&a, &b, Alternative::Greater).unwrap();
        assert_close(less.p_value, 1.0 / 252.0, 1e-9);
        assert_close(greater.p_value, 1.0, 1e-9);
    }

    #[test]
    fn test_mann_whitney_identical_constant_samples() {
        let a = [5.0, 5.0, 5.0];
        for alternative in [Alternative::TwoSided, Alternative::Less, Alternative::Greater] {
            let out = mann_whitney_u(&a, &a, alternative).unwrap();
            assert_eq!(out.statistic, 4.5);
            assert_eq!(out.p_value, 1.0);
        }
    }

    #[test]
    fn test_mann_whitney_null_counts_sum_to_binomial() {
        let counts = mann_whitney_null_counts(3, 4);
        assert_eq!(counts.len(), 13);
        assert_eq!(counts.iter().sum::<f64>(), 35.0);
        assert_eq!(counts[0], 1.0);
        assert_eq!(counts[12], 1.0);
    }

    #[test]
    fn test_mann_whitney_asymptotic_with_ties() {
        let a = [1.0, 2.0, 2.0, 3.0, 3.0, 3.0, 4.0, 4.0, 5.0, 6.0];
        let b = [3.0, 4.0, 5.0, 5.0, 6.0, 6.0, 7.0, 7.0, 8.0, 9.0];
        let out = mann_whitney_u(&a, &b, Alternative::TwoSided).unwrap();
        assert!(out.p_value < 0.05);
        assert!(out.statistic < 50.0);
    }

    #[test]
    fn test_kruskal_wallis_reference() {
        // scipy.stats.kruskal([1,2,3],[4,5,6],[7,8,9]) -> H=7.2, p=0.0273
        let groups = vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ];
        let out = kruskal_wallis(&groups).unwrap();
        assert_close(out.statistic, 7.2, 1e-9);
        assert_close(out.p_value, 0.0273, 1e-3);
    }

    #[test]
    fn test_kruskal_wallis_all_identical_fails() {
        let groups = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        assert!(kruskal_wallis(&groups).is_err());
    }

    #[test]
    fn test_wilcoxon_exact_all_positive() {
        // 6 positive differences: two-sided exact p = 2/64
        let diffs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let out = wilcoxon_signed_rank(&diffs, Alternative::TwoSided).unwrap();
        assert_eq!(out.statistic, 0.0);
        assert_close(out.p_value, 2.0 / 64.0, 1e-12);

        let greater = wilcoxon_signed_rank(&diffs, Alternative::Greater).unwrap();
        assert_eq!(greater.statistic, 21.0);
        assert_close(greater.p_value, 1.0 / 64.0, 1e-12);
    }

    #[test]
    fn test_wilcoxon_all_zero_fails() {
        assert!(wilcoxon_signed_rank(&[0.0, 0.0], Alternative::TwoSided).is_err());
    }

    // ==================== variance test tests ====================

    #[test]
    fn test_one_way_anova_reference() {
        // scipy.stats.f_oneway([1,2,3],[4,5,6],[7,8,9]) -> F=27.0, p=0.001
        let groups = vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ];
        let out = one_way_anova(&groups).unwrap();
        assert_close(out.statistic, 27.0, 1e-9);
        assert_close(out.p_value, 0.001, 1e-4);
        assert_close(eta_squared(&groups), 0.9, 1e-9);
    }

    #[test]
    fn test_welch_anova_equal_variances() {
        let groups = vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ];
        let out = welch_anova(&groups).unwrap();
        // equal weights: between = 27, denominator = 1 + (2/8)(2/3) = 7/6
        assert_close(out.statistic, 27.0 * 6.0 / 7.0, 1e-9);
        assert_eq!(out.df, Some(2.0));
        assert_close(out.df2.unwrap(), 4.0, 1e-9);
    }

    #[test]
    fn test_welch_anova_zero_variance_fails() {
        let groups = vec![vec![1.0, 1.0], vec![2.0, 3.0]];
        assert!(welch_anova(&groups).is_err());
    }

    #[test]
    fn test_levene_homogeneous_and_heterogeneous() {
        let similar = vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![2.0, 3.0, 4.0, 5.0, 6.0],
        ];
        assert!(levene_median(&similar).unwrap().p_value > 0.5);

        let spread = vec![
            vec![10.0, 10.1, 9.9, 10.0, 10.2, 9.8, 10.0, 10.1],
            vec![0.0, 25.0, 3.0, 30.0, -5.0, 18.0, 40.0, -12.0],
        ];
        assert!(levene_median(&spread).unwrap().p_value < 0.05);
    }

    // ==================== contingency tests ====================

    #[test]
    fn test_chi_square_with_yates_correction() {
        // scipy.stats.chi2_contingency([[10, 20], [20, 10]]) -> chi2=5.4, p=0.0201
        let table = vec![vec![10.0, 20.0], vec![20.0, 10.0]];
        let out = chi_square_independence(&table).unwrap();
        assert_close(out.statistic, 5.4, 1e-9);
        assert_close(out.p_value, 0.0201, 1e-3);
        assert_eq!(out.df, Some(1.0));
    }

    #[test]
    fn test_chi_square_without_correction_for_larger_tables() {
        let table = vec![vec![10.0, 10.0, 10.0], vec![10.0, 10.0, 10.0]];
        let out = chi_square_independence(&table).unwrap();
        assert_close(out.statistic, 0.0, 1e-12);
        assert_close(out.p_value, 1.0, 1e-12);
        assert_eq!(out.df, Some(2.0));
    }

    #[test]
    fn test_chi_square_zero_expected_fails() {
        let table = vec![vec![0.0, 0.0], vec![5.0, 5.0]];
        assert!(chi_square_independence(&table).is_err());
    }

    #[test]
    fn test_ks_normal_on_normal_quantiles() {
        let normal = Normal::standard();
        let values: Vec<f64> = (1..=50)
            .map(|i| normal.inverse_cdf(i as f64 / 51.0))
            .collect();
        let out = ks_normal(&values, mean(&values), sample_variance(&values).sqrt()).unwrap();
        assert!(out.statistic < 0.05);
        assert!(out.p_value > 0.9);
    }

    #[test]
    fn test_kolmogorov_exact_cdf_matches_tables() {
        // n = 1: P(D < d) = 2d - 1
        assert_close(kolmogorov_exact_cdf(1, 0.75), 0.5, 1e-12);
        // n = 5, d = 1/5: 5! / 5^5
        assert_close(kolmogorov_exact_cdf(5, 0.2), 120.0 / 3125.0, 1e-12);
        // Two-sided 5% critical values
        assert_close(1.0 - kolmogorov_exact_cdf(10, 0.40925), 0.05, 1e-4);
        assert_close(1.0 - kolmogorov_exact_cdf(20, 0.29408), 0.05, 1e-4);
        assert_eq!(kolmogorov_exact_cdf(10, 1.0), 1.0);
        assert_eq!(kolmogorov_exact_cdf(10, 0.0), 0.0);
    }

    #[test]
    fn test_ks_normal_small_sample_uses_exact_distribution() {
        let values = [-1.5, -0.5, 0.2, 0.9, 1.1, 2.4];
        let out = ks_normal(&values, 0.0, 1.0).unwrap();
        assert_close(out.statistic, 0.31594, 1e-5);
        // The asymptotic formula gives 0.5025 here.
        assert_close(out.p_value, 0.48901, 1e-4);
    }

    #[test]
    fn test_kolmogorov_sf_bounds() {
        assert_eq!(kolmogorov_sf(0.0), 1.0);
        assert!(kolmogorov_sf(3.0) < 1e-6);
        assert_close(kolmogorov_sf(1.36), 0.049, 2e-3);
    }

    // ==================== effect size tests ====================

    #[test]
    fn test_cohens_d() {
        let d = cohens_d(&[1.0, 2.0, 3.0, 4.0, 5.0], &[100.0, 200.0, 300.0, 400.0, 500.0]);
        assert!(d > 0.8);
        assert_eq!(cohens_d(&[2.0, 2.0], &[2.0, 2.0]), 0.0);
    }

    #[test]
    fn test_epsilon_squared_is_clamped() {
        assert_eq!(epsilon_squared(0.5, 30, 3), 0.0);
        assert_close(epsilon_squared(7.2, 9, 3), (7.2 - 2.0) / 6.0, 1e-12);
        assert_eq!(epsilon_squared(100.0, 9, 3), 1.0);
    }
}
