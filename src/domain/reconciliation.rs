use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::column::TableClassification;
use crate::domain::value::{CellValue, Row};

/// Rows paired between both sides, plus the leftovers of each side.
///
/// Invariant: `matched.len() * 2 + only_in_a.len() + only_in_b.len()`
/// equals the total number of input rows.
#[derive(Debug, Default)]
pub struct MatchResult<'a> {
    pub matched: Vec<(&'a Row, &'a Row)>,
    pub only_in_a: Vec<&'a Row>,
    pub only_in_b: Vec<&'a Row>,
}

impl MatchResult<'_> {
    pub fn total_rows(&self) -> usize {
        self.matched.len() * 2 + self.only_in_a.len() + self.only_in_b.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDifference {
    pub field_name: String,
    pub value_a: CellValue,
    pub value_b: CellValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDifference {
    /// Display-only label built from the row's first non-excluded columns.
    pub row_identifier: String,
    pub differences: Vec<FieldDifference>,
}

/// Shape of identifier values, detected from a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdPattern {
    #[serde(rename = "prefix-number")]
    PrefixNumber,
    #[serde(rename = "number-suffix")]
    NumberSuffix,
    #[serde(rename = "prefix_number")]
    PrefixUnderscoreNumber,
    #[serde(rename = "number_suffix")]
    NumberUnderscoreSuffix,
    #[serde(rename = "code-number")]
    CodeNumber,
    #[serde(rename = "timestamp-serial")]
    TimestampSerial,
    #[serde(rename = "custom")]
    Custom,
}

impl IdPattern {
    pub fn label(&self) -> &'static str {
        match self {
            IdPattern::PrefixNumber => "prefix-number",
            IdPattern::NumberSuffix => "number-suffix",
            IdPattern::PrefixUnderscoreNumber => "prefix_number",
            IdPattern::NumberUnderscoreSuffix => "number_suffix",
            IdPattern::CodeNumber => "code-number",
            IdPattern::TimestampSerial => "timestamp-serial",
            IdPattern::Custom => "custom",
        }
    }
}

impl std::fmt::Display for IdPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-column identifier statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UuidColumnStatistics {
    pub non_null_a: usize,
    pub non_null_b: usize,
    pub unique_a: usize,
    pub unique_b: usize,
    pub pattern: IdPattern,
    /// `|normalized A ∩ normalized B|`
    pub normalized_matches: usize,
    /// `normalized_matches / max(|normalized A|, |normalized B|)`, in percent.
    pub match_percentage: f64,
}

/// Identifier statistics for one table, collected under `include_with_tracking`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UuidStatistics {
    pub uuid_columns: Vec<String>,
    pub total_values_a: usize,
    pub total_values_b: usize,
    pub unique_values_a: usize,
    pub unique_values_b: usize,
    /// Raw values present on one side only (expected when ID schemes differ).
    pub value_differences: usize,
    pub detected_patterns: BTreeMap<String, IdPattern>,
    pub normalized_match_count: usize,
    pub normalized_match_percentage: f64,
    pub columns: BTreeMap<String, UuidColumnStatistics>,
}

impl UuidStatistics {
    /// Coarse heuristic: equal non-null identifier counts on both sides.
    /// Does not prove per-row correspondence.
    pub fn counts_match(&self) -> bool {
        self.total_values_a == self.total_values_b
    }
}

/// Wall-clock time spent in each pipeline stage of one table, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub fetch_ms: u128,
    pub classify_ms: u128,
    pub match_ms: u128,
    pub diff_ms: u128,
    pub track_ms: u128,
}

impl StageTimings {
    pub fn total_ms(&self) -> u128 {
        self.fetch_ms + self.classify_ms + self.match_ms + self.diff_ms + self.track_ms
    }
}

/// Outcome of reconciling one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReconciliation {
    pub table_name: String,
    pub row_count_a: usize,
    pub row_count_b: usize,
    /// Matched pairs with no field differences.
    pub matching_rows: usize,
    pub only_in_a: Vec<Row>,
    pub only_in_b: Vec<Row>,
    pub row_differences: Vec<RowDifference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid_statistics: Option<UuidStatistics>,
    pub classification: TableClassification,
    #[serde(skip)]
    pub timings: StageTimings,
}

impl TableReconciliation {
    pub fn difference_count(&self) -> usize {
        self.only_in_a.len() + self.only_in_b.len() + self.row_differences.len()
    }

    pub fn is_identical(&self) -> bool {
        self.difference_count() == 0
    }
}
