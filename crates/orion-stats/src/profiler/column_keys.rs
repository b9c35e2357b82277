//! Column key sanitization.
//!
//! Uploaded headers are arbitrary text ("Preço Médio (R$)", "2023 sales").
//! Every column gets a stable ASCII identifier used as the table column name
//! and as the key in requests.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

static INVALID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("Invalid regex: invalid chars"));
static UNDERSCORE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_+").expect("Invalid regex: underscore runs"));

/// Turn an arbitrary header into a lowercase `[a-z0-9_]` identifier.
///
/// Accents are stripped through NFKD decomposition, every other character
/// outside `[A-Za-z0-9_]` becomes `_`, runs of `_` collapse and are trimmed.
/// Keys that would start with a digit get a `col_` prefix; empty results
/// become `unnamed`.
pub fn sanitize_column_name(name: &str) -> String {
    let ascii: String = name.nfkd().filter(|c| c.is_ascii()).collect();
    let replaced = INVALID_CHARS.replace_all(&ascii, "_");
    let collapsed = UNDERSCORE_RUNS.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');

    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let key = if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("col_{trimmed}")
    } else {
        trimmed.to_string()
    };
    key.to_lowercase()
}

/// Sanitize every header and make the keys unique by suffixing `_2`, `_3`, ...
pub fn unique_column_keys<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    let mut keys = Vec::new();
    for name in names {
        let base = sanitize_column_name(name);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while taken.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        taken.insert(candidate.clone());
        keys.push(candidate);
    }
    keys
}
