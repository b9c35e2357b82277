//! CLI entry point for the statistics engine.

use anyhow::{Context, Result, anyhow};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use orion_stats::{
    Alternative, AnalysisConfig, AnalysisService, CorrelationRequest, CrosstabRequest,
    DatasetRecord, DescriptiveRequest, FilterCondition, FilterValue, FrequencyRequest, GroupSort,
    HypothesisTestRequest, HypothesisTestType, InMemoryStore, MissingPolicy, NormalityRequest,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// CLI-compatible missing-value policy
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMissingPolicy {
    /// Count missing numeric values as 0
    Zero,
    /// Drop missing values before computing
    Drop,
}

impl From<CliMissingPolicy> for MissingPolicy {
    fn from(cli: CliMissingPolicy) -> Self {
        match cli {
            CliMissingPolicy::Zero => MissingPolicy::TreatAsZero,
            CliMissingPolicy::Drop => MissingPolicy::Drop,
        }
    }
}

/// CLI-compatible group ordering
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliGroupSort {
    /// Natural order of the group keys
    Key,
    /// Largest groups first
    Count,
    /// Ascending mean of the first variable
    MeanAsc,
    /// Descending mean of the first variable
    MeanDesc,
}

impl From<CliGroupSort> for GroupSort {
    fn from(cli: CliGroupSort) -> Self {
        match cli {
            CliGroupSort::Key => GroupSort::Key,
            CliGroupSort::Count => GroupSort::Count,
            CliGroupSort::MeanAsc => GroupSort::MeanAsc,
            CliGroupSort::MeanDesc => GroupSort::MeanDesc,
        }
    }
}

/// CLI-compatible alternative hypothesis
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliAlternative {
    TwoSided,
    Greater,
    Less,
}

impl From<CliAlternative> for Alternative {
    fn from(cli: CliAlternative) -> Self {
        match cli {
            CliAlternative::TwoSided => Alternative::TwoSided,
            CliAlternative::Greater => Alternative::Greater,
            CliAlternative::Less => Alternative::Less,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author = "Orion Analytics Team",
    version,
    about = "Descriptive and inferential statistics for tabular datasets",
    long_about = "Profile a CSV or Parquet file and run statistical analyses on it.\n\n\
                  Columns can be referenced by their original header or by their key.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  ORION_MISSING_POLICY    treat_as_zero or drop\n  \
                  ORION_ALPHA             significance level (default 0.05)\n  \
                  ORION_MAX_GROUPS        groups reported per request (default 200)\n\n\
                  EXAMPLES:\n  \
                  # Column keys and variable types\n  \
                  orion-stats -i sales.csv profile\n\n  \
                  # Revenue per region with automatic comparison tests\n  \
                  orion-stats -i sales.csv describe revenue --group-by region --compare\n\n  \
                  # Welch's t-test between the first two groups\n  \
                  orion-stats -i sales.csv test independent_t revenue --group region"
)]
struct Args {
    /// Path to the CSV or Parquet file to analyze
    #[arg(short, long)]
    input: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable tables
    ///
    /// Disables all logs; useful for piping: `... --json | jq .statistics`
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by every analysis
#[derive(ClapArgs, Debug, Clone)]
struct CommonOpts {
    /// Keep rows where COLUMN equals one of the values: `column=v1,v2`
    #[arg(short, long = "filter", value_name = "COLUMN=VALUES")]
    filters: Vec<String>,

    /// Missing-value policy (defaults to ORION_MISSING_POLICY or zero)
    #[arg(long, value_enum)]
    missing: Option<CliMissingPolicy>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show column keys, types and missing counts
    Profile,

    /// Descriptive statistics, optionally per group
    Describe {
        #[arg(required = true)]
        variables: Vec<String>,
        #[arg(short, long)]
        group_by: Vec<String>,
        /// Run automatic group comparison tests
        #[arg(long)]
        compare: bool,
        #[arg(long, value_enum, default_value = "key")]
        sort: CliGroupSort,
        #[arg(long)]
        max_groups: Option<usize>,
        #[command(flatten)]
        common: CommonOpts,
    },

    /// Pearson correlation matrix
    Correlate {
        #[arg(required = true, num_args = 2..)]
        variables: Vec<String>,
        #[command(flatten)]
        common: CommonOpts,
    },

    /// Contingency table with a chi-square test
    Crosstab {
        row: String,
        col: String,
        #[arg(long)]
        alpha: Option<f64>,
        #[command(flatten)]
        common: CommonOpts,
    },

    /// Normality tests per variable
    Normality {
        #[arg(required = true)]
        variables: Vec<String>,
        #[command(flatten)]
        common: CommonOpts,
    },

    /// Frequency tables
    Frequencies {
        #[arg(required = true)]
        variables: Vec<String>,
        #[arg(long)]
        max_categories: Option<usize>,
        #[command(flatten)]
        common: CommonOpts,
    },

    /// Run a named hypothesis test
    Test {
        /// one_sample_t, independent_t, mann_whitney, paired_t, one_way_anova, kruskal_wallis, wilcoxon
        test_type: HypothesisTestType,
        variable: String,
        /// Grouping column for two-sample and k-sample tests
        #[arg(long)]
        group: Option<String>,
        /// Second measurement for paired tests
        #[arg(long)]
        paired: Option<String>,
        /// Hypothesized mean for the one-sample t-test
        #[arg(long)]
        value: Option<f64>,
        #[arg(long, value_enum, default_value = "two-sided")]
        alternative: CliAlternative,
        #[arg(long)]
        alpha: Option<f64>,
        #[command(flatten)]
        common: CommonOpts,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only carries JSON.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    // Load environment variables from .env file
    dotenv().ok();
    let config = AnalysisConfig::from_env().context("Invalid ORION_* configuration")?;
    debug!(?config, "Loaded configuration");

    info!("Loading dataset from: {}", args.input.display());
    let table = orion_stats::ingest::read_table(&args.input)?;
    let name = orion_stats::ingest::dataset_name(&args.input);
    let filename = args
        .input
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.clone());

    let store = Arc::new(InMemoryStore::new(config.type_thresholds()));
    let record = store.register(name, filename, table)?;
    let service = AnalysisService::new(store, config)?;
    let id = record.id;

    match args.command {
        Command::Profile => {
            if args.json {
                return emit_json(&record);
            }
            print_profile(&record);
        }
        Command::Describe {
            variables,
            group_by,
            compare,
            sort,
            max_groups,
            common,
        } => {
            let request = DescriptiveRequest {
                variables: resolve_all(&record, &variables)?,
                filters: parse_filters(&record, &common.filters)?,
                group_by: resolve_all(&record, &group_by)?,
                run_comparison_tests: compare,
                sort_groups_by: sort.into(),
                max_groups,
                missing_policy: common.missing.map(Into::into),
                ..Default::default()
            };
            let response = service.describe(id, &request)?;
            if args.json {
                return emit_json(&response);
            }
            print_describe(&response);
        }
        Command::Correlate { variables, common } => {
            let request = CorrelationRequest {
                variables: resolve_all(&record, &variables)?,
                filters: parse_filters(&record, &common.filters)?,
                missing_policy: common.missing.map(Into::into),
            };
            let response = service.correlation(id, &request)?;
            if args.json {
                return emit_json(&response);
            }
            print_correlation(&response);
        }
        Command::Crosstab {
            row,
            col,
            alpha,
            common,
        } => {
            let request = CrosstabRequest {
                row_variable: resolve(&record, &row)?,
                col_variable: resolve(&record, &col)?,
                filters: parse_filters(&record, &common.filters)?,
                missing_policy: common.missing.map(Into::into),
                alpha,
                ..Default::default()
            };
            let response = service.crosstab(id, &request)?;
            if args.json {
                return emit_json(&response);
            }
            print_crosstab(&response);
        }
        Command::Normality { variables, common } => {
            let request = NormalityRequest {
                variables: resolve_all(&record, &variables)?,
                filters: parse_filters(&record, &common.filters)?,
                missing_policy: common.missing.map(Into::into),
                alpha: None,
            };
            let response = service.normality(id, &request)?;
            if args.json {
                return emit_json(&response);
            }
            print_normality(&response);
        }
        Command::Frequencies {
            variables,
            max_categories,
            common,
        } => {
            let request = FrequencyRequest {
                variables: resolve_all(&record, &variables)?,
                filters: parse_filters(&record, &common.filters)?,
                missing_policy: common.missing.map(Into::into),
                max_categories,
            };
            let response = service.frequencies(id, &request)?;
            if args.json {
                return emit_json(&response);
            }
            print_frequencies(&response);
        }
        Command::Test {
            test_type,
            variable,
            group,
            paired,
            value,
            alternative,
            alpha,
            common,
        } => {
            let mut request = HypothesisTestRequest::new(test_type, resolve(&record, &variable)?)
                .with_alternative(alternative.into());
            if let Some(group) = group {
                request = request.with_group_variable(resolve(&record, &group)?);
            }
            if let Some(paired) = paired {
                request = request.with_paired_variable(resolve(&record, &paired)?);
            }
            if let Some(value) = value {
                request = request.with_test_value(value);
            }
            request.alpha = alpha;
            request.filters = parse_filters(&record, &common.filters)?;
            request.missing_policy = common.missing.map(Into::into);

            let result = service.hypothesis_test(id, &request)?;
            if args.json {
                return emit_json(&result);
            }
            print_hypothesis(&result);
        }
    }

    Ok(())
}

/// Map a column reference (key or original header) to its key.
fn resolve(record: &DatasetRecord, column: &str) -> Result<String> {
    record
        .columns
        .iter()
        .find(|c| c.col_key == column)
        .or_else(|| record.columns.iter().find(|c| c.name == column))
        .map(|c| c.col_key.clone())
        .ok_or_else(|| anyhow!("Column '{}' not found. Available: {:?}", column, record.column_names()))
}

fn resolve_all(record: &DatasetRecord, columns: &[String]) -> Result<Vec<String>> {
    columns.iter().map(|c| resolve(record, c)).collect()
}

/// Parse `column=v1,v2` filters. `null` selects missing cells, numbers compare numerically.
fn parse_filters(record: &DatasetRecord, raw: &[String]) -> Result<Vec<FilterCondition>> {
    raw.iter()
        .map(|raw_filter| {
            let (column, values) = raw_filter
                .split_once('=')
                .ok_or_else(|| anyhow!("Invalid filter '{}', expected column=value[,value]", raw_filter))?;
            let values = values
                .split(',')
                .map(|v| match v.trim() {
                    "null" => FilterValue::Null,
                    "true" => FilterValue::Bool(true),
                    "false" => FilterValue::Bool(false),
                    other => other
                        .parse::<f64>()
                        .map(FilterValue::Number)
                        .unwrap_or_else(|_| FilterValue::Text(other.to_string())),
                })
                .collect();
            Ok(FilterCondition::new(resolve(record, column.trim())?, values))
        })
        .collect()
}

fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

fn section(title: &str) {
    println!("\n{title}");
    println!("{}", "-".repeat(70));
}

// =============================================================================
// Human-readable output
//
// These use `println!` on purpose: this is the CLI's output, not logging.
// =============================================================================

fn print_profile(record: &DatasetRecord) {
    println!("\n{}", "=".repeat(80));
    println!("DATASET {} ({} rows x {} columns)", record.name, record.row_count, record.col_count);
    println!("{}", "=".repeat(80));
    println!(
        "{:<20} {:<20} {:<12} {:<10} {:<10} {:<10}",
        "Column", "Key", "Type", "Dtype", "Unique", "Missing"
    );
    println!("{}", "-".repeat(86));
    for col in &record.columns {
        println!(
            "{:<20} {:<20} {:<12} {:<10} {:<10} {:<10}",
            truncate_str(&col.name, 19),
            truncate_str(&col.col_key, 19),
            col.var_type,
            format!("{:?}", col.dtype),
            col.unique_count,
            col.missing_count
        );
    }
}

fn print_stats_table(statistics: &[orion_stats::ColumnStatistics]) {
    println!(
        "{:<20} {:>8} {:>8} {:>12} {:>12} {:>12} {:>12} {:>12}",
        "Variable", "N", "Missing", "Mean", "Median", "Std", "Min", "Max"
    );
    for s in statistics {
        println!(
            "{:<20} {:>8} {:>8} {:>12} {:>12} {:>12} {:>12} {:>12}",
            truncate_str(&s.name, 19),
            s.count,
            s.missing_count,
            fmt_opt(s.mean),
            fmt_opt(s.median),
            fmt_opt(s.std),
            fmt_opt(s.min),
            fmt_opt(s.max)
        );
    }
}

fn print_describe(response: &orion_stats::DescriptiveResponse) {
    section(&format!("DESCRIPTIVE STATISTICS (n = {})", response.sample_size));
    print_stats_table(&response.statistics);

    if let (Some(groups), Some(summaries)) = (&response.grouped_statistics, &response.group_summaries) {
        for (group, summary) in groups.iter().zip(summaries) {
            section(&format!(
                "GROUP {} (n = {}, {:.2}%)",
                group.group_key, summary.sample_size, summary.pct_of_total
            ));
            print_stats_table(&group.statistics);
        }
        if let Some(total) = response.total_groups
            && total > groups.len()
        {
            println!("\nShowing {} of {} groups", groups.len(), total);
        }
    }

    if let Some(tests) = &response.group_comparison_tests {
        section("GROUP COMPARISONS");
        for test in tests {
            println!("  {} - {}", test.variable_name, test.test_name);
            println!("    {}", test.interpretation);
            println!("    {}", test.practical_explanation);
        }
    }
    for skipped in &response.skipped_comparisons {
        println!("  {} skipped: {}", skipped.variable_name, skipped.reason);
    }
}

fn print_correlation(response: &orion_stats::CorrelationResponse) {
    section(&format!("CORRELATION MATRIX (n = {})", response.sample_size));
    if response.variables.is_empty() {
        println!("  Fewer than two variables have variance");
        return;
    }
    print!("{:<20}", "");
    for name in &response.variables {
        print!(" {:>12}", truncate_str(name, 12));
    }
    println!();
    for (name, row) in response.variables.iter().zip(&response.matrix) {
        print!("{:<20}", truncate_str(name, 19));
        for r in row {
            print!(" {:>12.2}", r);
        }
        println!();
    }
}

fn print_crosstab(response: &orion_stats::CrosstabResponse) {
    let table = &response.table;
    section(&format!("{} x {} (n = {})", table.row_variable, table.col_variable, table.grand_total));
    print!("{:<20}", "");
    for label in &table.col_labels {
        print!(" {:>10}", truncate_str(label, 10));
    }
    println!(" {:>10}", "Total");
    for ((label, counts), total) in table.row_labels.iter().zip(&table.counts).zip(&table.row_totals) {
        print!("{:<20}", truncate_str(label, 19));
        for count in counts {
            print!(" {:>10}", count);
        }
        println!(" {:>10}", total);
    }
    if let Some(chi) = &table.chi_square {
        println!("\n  {}", chi.interpretation);
    }
}

fn print_normality(response: &orion_stats::NormalityResponse) {
    section(&format!("NORMALITY (n = {})", response.sample_size));
    for result in &response.results {
        println!("  {} (n = {})", result.variable_name, result.n);
        for test in &result.tests {
            println!(
                "    {:<22} statistic = {:>10}  p = {:>10}  {}",
                test.test_name,
                fmt_opt(test.statistic),
                fmt_opt(test.p_value),
                if test.is_normal { "normal" } else { "not normal" }
            );
        }
        println!("    {}", result.interpretation);
    }
    println!("\n  {}", response.recommendation);
}

fn print_frequencies(response: &orion_stats::FrequencyResponse) {
    for table in &response.tables {
        section(&format!("{} ({} values, {} distinct)", table.variable_name, table.total, table.distinct_values));
        println!("{:<20} {:>8} {:>10} {:>10}", "Value", "Count", "Percent", "Cum. %");
        for row in &table.rows {
            println!(
                "{:<20} {:>8} {:>10.2} {:>10.2}",
                truncate_str(&row.value, 19),
                row.count,
                row.percentage,
                row.cumulative_percentage
            );
        }
        if table.truncated {
            println!("  (truncated)");
        }
    }
}

fn print_hypothesis(result: &orion_stats::HypothesisTestResult) {
    section(&result.test_name);
    for summary in &result.group_summaries {
        println!(
            "  {:<20} n = {:<8} mean = {:<12} std = {}",
            truncate_str(&summary.group, 19),
            summary.n,
            fmt_opt(summary.mean),
            fmt_opt(summary.std)
        );
    }
    println!("  statistic = {}  p = {}", fmt_opt(result.statistic), fmt_opt(result.p_value));
    if let (Some(lower), Some(upper)) = (result.ci_lower, result.ci_upper) {
        println!("  CI: [{lower:.4}, {upper:.4}]");
    }
    println!("  Decision: {}", result.decision.as_str());
    println!("  {}", result.interpretation);
}
