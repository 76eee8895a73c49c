use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::application::classifier::ColumnClassifier;
use crate::application::differ::diff_pairs;
use crate::application::matcher::{match_rows, pair_by_key};
use crate::application::monitoring::StageTimer;
use crate::application::uuid_tracker::{track, Normalizer};
use crate::domain::column::ColumnSpec;
use crate::domain::comparison::DataComparisonResult;
use crate::domain::error::{ClassificationWarning, ReconcileError};
use crate::domain::ports::RowSource;
use crate::domain::reconciliation::{StageTimings, TableReconciliation};
use crate::domain::value_objects::TableName;
use crate::infrastructure::config::{ReconcileConfig, UuidMode};

// ─── Table state ───

/// Lifecycle of one table task. Any state can move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Pending,
    Classifying,
    Matching,
    Differing,
    TrackingUuids,
    Completed,
    Failed,
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TableState::Pending => "pending",
            TableState::Classifying => "classifying",
            TableState::Matching => "matching",
            TableState::Differing => "differing",
            TableState::TrackingUuids => "tracking_uuids",
            TableState::Completed => "completed",
            TableState::Failed => "failed",
        };
        f.write_str(label)
    }
}

// ─── Run context ───

/// Read-only state shared by every table task of one run: the settings and
/// the patterns compiled from them.
struct RunContext {
    config: ReconcileConfig,
    classifier: ColumnClassifier,
    normalizer: Normalizer,
}

impl RunContext {
    fn new(config: ReconcileConfig) -> Self {
        let classifier = ColumnClassifier::new(&config);
        let normalizer = Normalizer::new(&config.normalization_rules);
        Self {
            config,
            classifier,
            normalizer,
        }
    }

    fn warnings(&self) -> Vec<ClassificationWarning> {
        self.classifier
            .warnings()
            .iter()
            .chain(self.normalizer.warnings())
            .cloned()
            .collect()
    }
}

// ─── Reconcile Service ───

pub struct ReconcileService {
    side_a: Arc<dyn RowSource>,
    side_b: Arc<dyn RowSource>,
    config: ReconcileConfig,
}

impl ReconcileService {
    pub fn new(side_a: Arc<dyn RowSource>, side_b: Arc<dyn RowSource>, config: ReconcileConfig) -> Self {
        Self {
            side_a,
            side_b,
            config,
        }
    }

    /// Tables to reconcile: the configured list when there is one, otherwise
    /// every table present on both sides, sorted.
    pub async fn resolve_tables(&self) -> std::result::Result<Vec<TableName>, ReconcileError> {
        if !self.config.tables.is_empty() {
            let unique: BTreeSet<&str> = self.config.tables.iter().map(String::as_str).collect();
            return Ok(unique.into_iter().map(TableName::from).collect());
        }

        let (names_a, names_b) = tokio::join!(self.side_a.table_names(), self.side_b.table_names());
        let names_a: BTreeSet<TableName> = names_a
            .context("Failed to list tables of side A")
            .map_err(ReconcileError::Source)?
            .into_iter()
            .collect();
        let names_b: BTreeSet<TableName> = names_b
            .context("Failed to list tables of side B")
            .map_err(ReconcileError::Source)?
            .into_iter()
            .collect();

        let only_one_side = names_a.symmetric_difference(&names_b).count();
        if only_one_side > 0 {
            debug!(count = only_one_side, "tables present on one side only are skipped");
        }
        Ok(names_a.intersection(&names_b).cloned().collect())
    }

    /// Reconcile the resolved tables. See [`ReconcileService::run_tables`].
    pub async fn run(&self) -> std::result::Result<DataComparisonResult, ReconcileError> {
        self.config.validate()?;
        let tables = self.resolve_tables().await?;
        self.run_tables(&tables).await
    }

    /// Reconcile `tables` with at most `max_workers` tables in flight.
    ///
    /// Each table runs end-to-end in its own task and returns its own result;
    /// results are merged into a name-keyed map once every task is done, so
    /// the output does not depend on completion order.
    ///
    /// Fail-fast: the first failing table aborts the tasks still running and
    /// is returned as [`ReconcileError::Table`]. No partial result is produced.
    #[instrument(skip(self, tables), fields(table_count = tables.len(), workers = self.config.max_workers))]
    pub async fn run_tables(
        &self,
        tables: &[TableName],
    ) -> std::result::Result<DataComparisonResult, ReconcileError> {
        self.config.validate()?;

        let ctx = Arc::new(RunContext::new(self.config.clone()));
        let warnings = ctx.warnings();
        for w in &warnings {
            warn!(warning = %w, "pattern skipped");
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut join_set = JoinSet::new();
        let mut task_tables: HashMap<task::Id, TableName> = HashMap::with_capacity(tables.len());

        for table in tables {
            let ctx = Arc::clone(&ctx);
            let side_a = Arc::clone(&self.side_a);
            let side_b = Arc::clone(&self.side_b);
            let semaphore = Arc::clone(&semaphore);
            let table = table.clone();
            let task_table = table.clone();

            let handle = join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => reconcile_table(&ctx, side_a.as_ref(), side_b.as_ref(), &table).await,
                    Err(e) => Err(anyhow!("worker pool closed: {e}")),
                };
                (table, result)
            });
            task_tables.insert(handle.id(), task_table);
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((_, (table, Ok(reconciliation)))) => {
                    results.insert(table.0, reconciliation);
                }
                Ok((_, (table, Err(e)))) => {
                    warn!(table = %table, state = %TableState::Failed, error = %format!("{e:#}"), "table failed, aborting run");
                    join_set.abort_all();
                    return Err(ReconcileError::table(table.0, e));
                }
                Err(e) => {
                    join_set.abort_all();
                    let cause = anyhow!("table task panicked: {e}");
                    return Err(match task_tables.remove(&e.id()) {
                        Some(table) => ReconcileError::table(table.0, cause),
                        None => ReconcileError::Source(cause),
                    });
                }
            }
        }

        let result = DataComparisonResult::new(results, warnings);
        info!(
            tables = result.summary.total_tables,
            differences = result.summary.total_differences,
            integrity_check = result.summary.integrity_check,
            "reconciliation finished"
        );
        Ok(result)
    }
}

// ─── Table pipeline ───

/// Columns of side A, followed by columns only side B has.
fn merge_columns(columns_a: Vec<ColumnSpec>, columns_b: Vec<ColumnSpec>) -> Vec<ColumnSpec> {
    let known: BTreeSet<String> = columns_a.iter().map(|c| c.name.clone()).collect();
    let mut merged = columns_a;
    merged.extend(columns_b.into_iter().filter(|c| !known.contains(&c.name)));
    merged
}

/// Pending → Classifying → Matching → Differing → (TrackingUuids) → Completed.
#[instrument(name = "reconcile_table", skip_all, fields(db.table = %table.0))]
async fn reconcile_table(
    ctx: &RunContext,
    side_a: &dyn RowSource,
    side_b: &dyn RowSource,
    table: &TableName,
) -> Result<TableReconciliation> {
    let cfg = &ctx.config;
    let mut timer = StageTimer::start();
    let mut timings = StageTimings::default();
    debug!(state = %TableState::Pending, "table queued");

    let (columns_a, columns_b) = tokio::join!(side_a.columns(table), side_b.columns(table));
    let columns_a = columns_a.with_context(|| format!("Failed to read columns of {} on side A", table))?;
    let columns_b = columns_b.with_context(|| format!("Failed to read columns of {} on side B", table))?;

    let (rows_a, rows_b) = tokio::join!(
        side_a.fetch_rows(table, &columns_a),
        side_b.fetch_rows(table, &columns_b)
    );
    let rows_a = rows_a.with_context(|| format!("Failed to fetch rows of {} on side A", table))?;
    let rows_b = rows_b.with_context(|| format!("Failed to fetch rows of {} on side B", table))?;

    let mut sample = side_a
        .sample_rows(table, &columns_a, cfg.sample_size)
        .await
        .with_context(|| format!("Failed to sample {} on side A", table))?;
    if sample.is_empty() {
        sample = side_b
            .sample_rows(table, &columns_b, cfg.sample_size)
            .await
            .with_context(|| format!("Failed to sample {} on side B", table))?;
    }
    timings.fetch_ms = timer.lap();

    debug!(state = %TableState::Classifying, "table stage");
    let columns = merge_columns(columns_a, columns_b);
    let classification = ctx.classifier.classify(&columns, &sample);
    let excluded = classification.excluded_columns();
    debug!(summary = %classification.summary(), "classification");
    timings.classify_ms = timer.lap();

    debug!(state = %TableState::Matching, "table stage");
    let mut matched = match_rows(&rows_a, &rows_b, &excluded, cfg.case_sensitive);
    if cfg.pair_by_primary_key {
        let key_columns: Vec<String> = columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect();
        let paired = pair_by_key(&mut matched, &key_columns, cfg.case_sensitive);
        if paired > 0 {
            debug!(paired, "leftover rows paired by primary key");
        }
    }
    timings.match_ms = timer.lap();

    debug!(state = %TableState::Differing, "table stage");
    let (row_differences, matching_rows) = diff_pairs(&matched.matched, &excluded, cfg.case_sensitive);
    timings.diff_ms = timer.lap();

    let uuid_statistics = if cfg.uuid_mode == UuidMode::IncludeWithTracking
        && !classification.uuid_columns.is_empty()
    {
        debug!(state = %TableState::TrackingUuids, "table stage");
        let stats = track(&rows_a, &rows_b, &classification.uuid_columns, &ctx.normalizer);
        timings.track_ms = timer.lap();
        Some(stats)
    } else {
        None
    };

    let only_in_a: Vec<_> = matched.only_in_a.iter().map(|r| (*r).clone()).collect();
    let only_in_b: Vec<_> = matched.only_in_b.iter().map(|r| (*r).clone()).collect();

    info!(
        state = %TableState::Completed,
        rows_a = rows_a.len(),
        rows_b = rows_b.len(),
        matched = matched.matched.len(),
        only_in_a = only_in_a.len(),
        only_in_b = only_in_b.len(),
        differences = row_differences.len(),
        duration_ms = timings.total_ms(),
        "table reconciled"
    );

    Ok(TableReconciliation {
        table_name: table.0.clone(),
        row_count_a: rows_a.len(),
        row_count_b: rows_b.len(),
        matching_rows,
        only_in_a,
        only_in_b,
        row_differences,
        uuid_statistics,
        classification,
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::MapRowSource;
    use crate::domain::value::{CellValue, Row};

    fn users(rows: &[(i64, &str)]) -> MapRowSource {
        let rows: Vec<Row> = rows
            .iter()
            .map(|(id, name)| {
                [("id".to_string(), CellValue::Int(*id)), ("name".to_string(), CellValue::from(*name))]
                    .into_iter()
                    .collect()
            })
            .collect();
        MapRowSource::default().with_table(
            "users",
            vec![ColumnSpec::new("id", "INTEGER").primary_key(), ColumnSpec::new("name", "TEXT")],
            rows,
        )
    }

    fn service(a: MapRowSource, b: MapRowSource, config: ReconcileConfig) -> ReconcileService {
        ReconcileService::new(Arc::new(a), Arc::new(b), config)
    }

    #[test]
    fn merge_keeps_side_a_order_and_appends_new_columns() {
        let merged = merge_columns(
            vec![ColumnSpec::new("id", "INTEGER"), ColumnSpec::new("name", "TEXT")],
            vec![ColumnSpec::new("name", "TEXT"), ColumnSpec::new("email", "TEXT")],
        );
        let names: Vec<&str> = merged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "email"]);
    }

    #[tokio::test]
    async fn resolve_tables_intersects_both_sides() {
        let a = users(&[]).with_table("orders", vec![], vec![]).with_table("audit", vec![], vec![]);
        let b = users(&[]).with_table("orders", vec![], vec![]);
        let tables = service(a, b, ReconcileConfig::default()).resolve_tables().await.unwrap();
        assert_eq!(tables, [TableName::from("orders"), TableName::from("users")]);
    }

    #[tokio::test]
    async fn resolve_tables_prefers_configured_list() {
        let cfg = ReconcileConfig {
            tables: vec!["users".into(), "users".into()],
            ..Default::default()
        };
        let tables = service(users(&[]), MapRowSource::default(), cfg)
            .resolve_tables()
            .await
            .unwrap();
        assert_eq!(tables, [TableName::from("users")]);
    }

    #[tokio::test]
    async fn edited_row_is_reported_as_a_difference() {
        let a = users(&[(1, "John"), (2, "Jane")]);
        let b = users(&[(1, "John Updated"), (2, "Jane"), (3, "Bob")]);
        let result = service(a, b, ReconcileConfig::default()).run().await.unwrap();

        let t = &result.tables["users"];
        assert_eq!(t.matching_rows, 1);
        assert_eq!(t.row_differences.len(), 1);
        assert_eq!(t.row_differences[0].differences[0].field_name, "name");
        assert!(t.only_in_a.is_empty());
        assert_eq!(t.only_in_b.len(), 1);
        assert_eq!(result.total_differences(), 2);
    }

    #[tokio::test]
    async fn without_key_pairing_edits_are_leftovers() {
        let a = users(&[(1, "John")]);
        let b = users(&[(1, "John Updated")]);
        let cfg = ReconcileConfig {
            pair_by_primary_key: false,
            ..Default::default()
        };
        let result = service(a, b, cfg).run().await.unwrap();
        let t = &result.tables["users"];
        assert_eq!((t.only_in_a.len(), t.only_in_b.len()), (1, 1));
        assert!(t.row_differences.is_empty());
    }

    #[tokio::test]
    async fn regenerated_keys_pair_unrelated_rows_unless_pairing_is_off() {
        // side B renumbered its rows: key 2 now holds a different person
        let a = || users(&[(1, "John"), (2, "Jane")]);
        let b = || users(&[(1, "John"), (2, "Bob")]);

        let paired = service(a(), b(), ReconcileConfig::default()).run().await.unwrap();
        assert_eq!(paired.tables["users"].row_differences.len(), 1);

        let cfg = ReconcileConfig {
            pair_by_primary_key: false,
            ..Default::default()
        };
        let unpaired = service(a(), b(), cfg).run().await.unwrap();
        let t = &unpaired.tables["users"];
        assert!(t.row_differences.is_empty());
        assert_eq!((t.only_in_a.len(), t.only_in_b.len()), (1, 1));
    }

    #[tokio::test]
    async fn missing_table_fails_with_its_name() {
        let cfg = ReconcileConfig {
            tables: vec!["ghost".into()],
            ..Default::default()
        };
        let err = service(users(&[]), users(&[]), cfg).run().await.unwrap_err();
        assert_eq!(err.table_name(), Some("ghost"));
    }

    /// Panics while reading one table.
    struct PanickingSource(MapRowSource);

    #[async_trait::async_trait]
    impl RowSource for PanickingSource {
        async fn table_names(&self) -> Result<Vec<TableName>> {
            self.0.table_names().await
        }

        async fn columns(&self, table: &TableName) -> Result<Vec<ColumnSpec>> {
            self.0.columns(table).await
        }

        async fn fetch_rows(&self, table: &TableName, _columns: &[ColumnSpec]) -> Result<Vec<Row>> {
            panic!("row decoder blew up on {table}");
        }

        async fn sample_rows(&self, table: &TableName, columns: &[ColumnSpec], limit: usize) -> Result<Vec<Row>> {
            self.0.sample_rows(table, columns, limit).await
        }
    }

    #[tokio::test]
    async fn panicking_table_task_fails_with_its_name() {
        let a: Arc<dyn RowSource> = Arc::new(PanickingSource(users(&[(1, "John")])));
        let b: Arc<dyn RowSource> = Arc::new(users(&[(1, "John")]));
        let err = ReconcileService::new(a, b, ReconcileConfig::default())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Table { .. }));
        assert_eq!(err.table_name(), Some("users"));
    }

    #[tokio::test]
    async fn zero_workers_is_rejected_before_any_work() {
        let cfg = ReconcileConfig {
            max_workers: 0,
            ..Default::default()
        };
        let err = service(users(&[]), users(&[]), cfg).run().await.unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(_)));
    }

    #[test]
    fn table_state_labels() {
        assert_eq!(TableState::TrackingUuids.to_string(), "tracking_uuids");
        assert_eq!(TableState::Completed.to_string(), "completed");
    }
}
