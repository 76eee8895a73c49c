use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::error::ClassificationWarning;
use crate::domain::reconciliation::TableReconciliation;

/// Result of one reconciliation run, keyed by table name.
#[derive(Debug, Clone, Serialize)]
pub struct DataComparisonResult {
    pub run_id: String,
    pub created_at: String,
    pub tables: BTreeMap<String, TableReconciliation>,
    pub summary: Summary,
    /// User patterns that failed to compile and were skipped.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ClassificationWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_tables: usize,
    pub identical_tables: usize,
    pub tables_with_differences: usize,
    pub total_rows_compared: usize,
    pub total_differences: usize,
    pub total_uuid_columns: usize,
    pub total_uuid_values_a: usize,
    pub total_uuid_values_b: usize,
    /// `false` as soon as one tracked table has differing non-null identifier
    /// counts between sides. A count heuristic, not a per-row proof.
    pub integrity_check: bool,
}

impl Summary {
    pub fn from_tables(tables: &BTreeMap<String, TableReconciliation>) -> Self {
        let total_tables = tables.len();
        let identical_tables = tables.values().filter(|t| t.is_identical()).count();
        let total_rows_compared = tables.values().map(|t| t.row_count_a + t.row_count_b).sum();
        let total_differences = tables.values().map(|t| t.difference_count()).sum();

        let tracked: Vec<_> = tables
            .values()
            .filter_map(|t| t.uuid_statistics.as_ref())
            .collect();

        Summary {
            total_tables,
            identical_tables,
            tables_with_differences: total_tables - identical_tables,
            total_rows_compared,
            total_differences,
            total_uuid_columns: tracked.iter().map(|s| s.uuid_columns.len()).sum(),
            total_uuid_values_a: tracked.iter().map(|s| s.total_values_a).sum(),
            total_uuid_values_b: tracked.iter().map(|s| s.total_values_b).sum(),
            integrity_check: tracked.iter().all(|s| s.counts_match()),
        }
    }
}

impl DataComparisonResult {
    pub fn new(
        tables: BTreeMap<String, TableReconciliation>,
        warnings: Vec<ClassificationWarning>,
    ) -> Self {
        let summary = Summary::from_tables(&tables);
        DataComparisonResult {
            run_id: format!(
                "rc_{}_{}",
                Utc::now().format("%Y%m%d_%H%M%S"),
                Uuid::new_v4().simple()
            ),
            created_at: Utc::now().to_rfc3339(),
            tables,
            summary,
            warnings,
        }
    }

    pub fn total_differences(&self) -> usize {
        self.summary.total_differences
    }

    pub fn integrity_check(&self) -> bool {
        self.summary.integrity_check
    }
}
