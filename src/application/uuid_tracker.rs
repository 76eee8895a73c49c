use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::domain::error::{ClassificationWarning, PatternOrigin};
use crate::domain::reconciliation::{IdPattern, UuidColumnStatistics, UuidStatistics};
use crate::domain::value::Row;
use crate::infrastructure::config::NormalizationRule;

/// Share of sampled values a template must match to be reported.
const TEMPLATE_RATIO: f64 = 0.8;

const TEMPLATES: &[(IdPattern, &str)] = &[
    (IdPattern::PrefixNumber, r"^[A-Za-z]+-\d+$"),
    (IdPattern::NumberSuffix, r"^\d+-[A-Za-z]+$"),
    (IdPattern::PrefixUnderscoreNumber, r"^[A-Za-z]+_\d+$"),
    (IdPattern::NumberUnderscoreSuffix, r"^\d+_[A-Za-z]+$"),
    (IdPattern::CodeNumber, r"^[A-Za-z]+\d+$"),
    (IdPattern::TimestampSerial, r"^\d+-\d+$"),
];

// ─── Normalizer ───

/// Rewrites `\1`-style group references into the `${1}` form the regex
/// crate expects. `$1` and `${1}` pass through untouched; `\\` is a literal
/// backslash.
fn to_regex_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 4);
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(d) if d.is_ascii_digit() => {
                out.push_str("${");
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    out.push(d);
                    chars.next();
                }
                out.push('}');
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            _ => out.push('\\'),
        }
    }
    out
}

/// Ordered `(pattern, replacement)` rules, compiled once per run.
#[derive(Debug, Default)]
pub struct Normalizer {
    rules: Vec<(Regex, String)>,
    warnings: Vec<ClassificationWarning>,
}

impl Normalizer {
    /// Compile `rules` in order. A rule whose pattern is invalid is skipped
    /// with a warning; the others still apply.
    pub fn new(rules: &[NormalizationRule]) -> Self {
        let mut compiled = Vec::with_capacity(rules.len());
        let mut warnings = Vec::new();
        for rule in rules {
            match Regex::new(&rule.pattern) {
                Ok(re) => compiled.push((re, to_regex_replacement(&rule.replacement))),
                Err(e) => {
                    warn!(pattern = %rule.pattern, reason = %e, "skipping invalid normalization rule");
                    warnings.push(ClassificationWarning {
                        origin: PatternOrigin::Normalization,
                        pattern: rule.pattern.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Self {
            rules: compiled,
            warnings,
        }
    }

    pub fn warnings(&self) -> &[ClassificationWarning] {
        &self.warnings
    }

    /// Apply every rule in order, each one to the output of the previous.
    pub fn normalize(&self, value: &str) -> String {
        self.rules
            .iter()
            .fold(value.to_string(), |acc, (re, replacement)| {
                re.replace_all(&acc, replacement.as_str()).into_owned()
            })
    }
}

// ─── Pattern detection ───

/// First template matched by at least 80% of `values`, `Custom` otherwise.
pub fn detect_pattern(values: &[String]) -> IdPattern {
    if values.is_empty() {
        return IdPattern::Custom;
    }
    for (pattern, template) in TEMPLATES {
        let Ok(re) = Regex::new(template) else {
            continue;
        };
        let hits = values.iter().filter(|v| re.is_match(v)).count();
        if hits as f64 / values.len() as f64 >= TEMPLATE_RATIO {
            return *pattern;
        }
    }
    IdPattern::Custom
}

// ─── Tracker ───

fn column_values(rows: &[Row], column: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter_map(|v| v.as_text())
        .collect()
}

/// `|A ∩ B| / max(|A|, |B|)` in percent. Two empty sides count as a full match.
fn match_percentage(common: usize, len_a: usize, len_b: usize) -> f64 {
    match len_a.max(len_b) {
        0 => 100.0,
        denominator => common as f64 / denominator as f64 * 100.0,
    }
}

/// Collect identifier statistics for the UUID-classified columns of one table.
///
/// Counts are over non-null values. Shape detection samples side A (side B
/// when A has no value). Cross-side matching normalises every distinct value
/// of both sides and compares the resulting sets.
pub fn track(
    rows_a: &[Row],
    rows_b: &[Row],
    uuid_columns: &BTreeSet<String>,
    normalizer: &Normalizer,
) -> UuidStatistics {
    let mut stats = UuidStatistics {
        uuid_columns: uuid_columns.iter().cloned().collect(),
        total_values_a: 0,
        total_values_b: 0,
        unique_values_a: 0,
        unique_values_b: 0,
        value_differences: 0,
        detected_patterns: BTreeMap::new(),
        normalized_match_count: 0,
        normalized_match_percentage: 100.0,
        columns: BTreeMap::new(),
    };
    let mut normalized_denominator = 0;

    for column in uuid_columns {
        let values_a = column_values(rows_a, column);
        let values_b = column_values(rows_b, column);

        let unique_a: BTreeSet<&str> = values_a.iter().map(String::as_str).collect();
        let unique_b: BTreeSet<&str> = values_b.iter().map(String::as_str).collect();

        let pattern = if values_a.is_empty() {
            detect_pattern(&values_b)
        } else {
            detect_pattern(&values_a)
        };

        let norm_a: BTreeSet<String> = unique_a.iter().map(|v| normalizer.normalize(v)).collect();
        let norm_b: BTreeSet<String> = unique_b.iter().map(|v| normalizer.normalize(v)).collect();
        let common = norm_a.intersection(&norm_b).count();

        let column_stats = UuidColumnStatistics {
            non_null_a: values_a.len(),
            non_null_b: values_b.len(),
            unique_a: unique_a.len(),
            unique_b: unique_b.len(),
            pattern,
            normalized_matches: common,
            match_percentage: match_percentage(common, norm_a.len(), norm_b.len()),
        };
        debug!(
            column = %column,
            pattern = %pattern,
            match_percentage = column_stats.match_percentage,
            "identifier column tracked"
        );

        stats.total_values_a += column_stats.non_null_a;
        stats.total_values_b += column_stats.non_null_b;
        stats.unique_values_a += column_stats.unique_a;
        stats.unique_values_b += column_stats.unique_b;
        stats.value_differences += unique_a.symmetric_difference(&unique_b).count();
        stats.normalized_match_count += common;
        normalized_denominator += norm_a.len().max(norm_b.len());
        stats.detected_patterns.insert(column.clone(), pattern);
        stats.columns.insert(column.clone(), column_stats);
    }

    stats.normalized_match_percentage =
        match_percentage(stats.normalized_match_count, normalized_denominator, 0);
    stats
}
