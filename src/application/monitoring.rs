use crate::domain::column::ColumnSpec;
use crate::domain::comparison::DataComparisonResult;
use crate::domain::ports::RowSource;
use crate::domain::value::Row;
use crate::domain::value_objects::TableName;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

// ─── StageTimer ──────────────────────────────────────────────────────────────

/// Measures consecutive pipeline stages of one table task.
#[derive(Debug)]
pub struct StageTimer(Instant);

impl StageTimer {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// Milliseconds since the previous lap (or start), then restart.
    pub fn lap(&mut self) -> u128 {
        let elapsed = self.0.elapsed().as_millis();
        self.0 = Instant::now();
        elapsed
    }
}

// ─── PerfReport ──────────────────────────────────────────────────────────────

/// A single timed operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpTiming {
    /// Stage name: "fetch", "classify", "match", "diff" or "track".
    pub operation: &'static str,
    /// Table this operation was performed on.
    pub table: String,
    /// Elapsed wall time in milliseconds.
    pub duration_ms: u128,
    /// Rows involved, both sides together.
    pub rows: usize,
}

/// Performance timings of one run, rebuilt from the per-table stage timings
/// once every worker has finished. Workers never share it.
///
/// Render with [`crate::presentation::cli_summary::print_perf_summary`].
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PerfReport {
    pub timings: Vec<OpTiming>,
    pub total_rows_fetched: usize,
    pub total_ms: u128,
}

impl PerfReport {
    pub fn from_result(result: &DataComparisonResult) -> Self {
        let mut report = Self::default();

        for (name, table) in &result.tables {
            let rows = table.row_count_a + table.row_count_b;
            let t = &table.timings;
            let mut stages = vec![
                ("fetch", t.fetch_ms),
                ("classify", t.classify_ms),
                ("match", t.match_ms),
                ("diff", t.diff_ms),
            ];
            if table.uuid_statistics.is_some() {
                stages.push(("track", t.track_ms));
            }

            for (operation, duration_ms) in stages {
                report.timings.push(OpTiming {
                    operation,
                    table: name.clone(),
                    duration_ms,
                    rows,
                });
            }
            report.total_rows_fetched += rows;
            report.total_ms += t.total_ms();
        }

        report
    }
}

// ─── MonitoringRowSource ─────────────────────────────────────────────────────

/// Decorator: wraps any `RowSource` and traces every read with its wall time.
pub struct MonitoringRowSource {
    side: &'static str,
    inner: Arc<dyn RowSource>,
}

impl MonitoringRowSource {
    pub fn new(side: &'static str, inner: Arc<dyn RowSource>) -> Self {
        Self { side, inner }
    }
}

#[async_trait]
impl RowSource for MonitoringRowSource {
    async fn table_names(&self) -> Result<Vec<TableName>> {
        self.inner.table_names().await
    }

    async fn columns(&self, table: &TableName) -> Result<Vec<ColumnSpec>> {
        self.inner.columns(table).await
    }

    #[instrument(
        name = "fetch_rows",
        skip(self, table, columns),
        fields(side = self.side, db.table = %table.0),
        level = "info"
    )]
    async fn fetch_rows(&self, table: &TableName, columns: &[ColumnSpec]) -> Result<Vec<Row>> {
        let start = Instant::now();
        let rows = self.inner.fetch_rows(table, columns).await?;
        let duration_ms = start.elapsed().as_millis();

        info!(side = self.side, table = %table.0, rows = rows.len(), duration_ms, "fetch_rows completed");
        Ok(rows)
    }

    async fn sample_rows(
        &self,
        table: &TableName,
        columns: &[ColumnSpec],
        limit: usize,
    ) -> Result<Vec<Row>> {
        self.inner.sample_rows(table, columns, limit).await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}
