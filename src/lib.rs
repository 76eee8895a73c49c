use std::sync::Arc;
use tracing::{debug, instrument};

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// ─── Log level ────────────────────────────────────────────────────────────────

/// Controls the verbosity of reconcily's internal tracing output.
///
/// Pass to [`init_tracing`] before calling any async entry point.
///
/// | Variant | `tracing` level | When to use                              |
/// |---------|-----------------|------------------------------------------|
/// | `Error` | `error`         | `--quiet` / CI scripting                 |
/// | `Info`  | `info`          | Default, shows per-table results         |
/// | `Debug` | `debug`         | `--verbose`, shows SQL and table stages  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

/// Initialise the global `tracing` subscriber for reconcily.
///
/// Respects `RUST_LOG` when set, falling back to `level` otherwise.
/// Call this once at startup; library consumers who manage their own
/// subscriber should skip it.
///
/// Only available with the `cli` feature (pulls in `tracing-subscriber`).
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let default_filter = match level {
        LogLevel::Error => "reconcily=error",
        LogLevel::Info => "reconcily=info",
        LogLevel::Debug => "reconcily=debug",
    };

    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

// ─── Public API Facade ───

pub use application::monitoring::PerfReport;
pub use application::reconcile::{ReconcileService, TableState};
pub use domain::column::{ColumnClassification, ColumnSpec, TableClassification};
pub use domain::comparison::{DataComparisonResult, Summary};
pub use domain::error::{ClassificationWarning, ReconcileError};
pub use domain::fingerprint::{fingerprint_row, RowFingerprint};
pub use domain::ports::{OutputWriter, RowSource};
pub use domain::reconciliation::{
    FieldDifference, IdPattern, RowDifference, TableReconciliation, UuidStatistics,
};
pub use domain::source::{MapRowSource, TableData};
pub use domain::value::{CellValue, Row};
pub use domain::value_objects::{ExcludedColumns, TableName};
pub use infrastructure::config::{
    AppConfig, DbConfig, NormalizationRule, OutputConfig, ReconcileConfig, UuidMode,
};

use crate::application::monitoring::MonitoringRowSource;
use crate::infrastructure::db::client::connect;

// ─── Public entry points ───

/// Reconcile the two databases described by `cfg`.
///
/// Use [`run_with_timing`] if you also want a performance report, or
/// [`reconcile_sources`] to bring your own [`RowSource`]s.
pub async fn run(cfg: &AppConfig) -> Result<DataComparisonResult, ReconcileError> {
    let (result, _) = run_with_timing(cfg).await?;
    Ok(result)
}

/// [`run`], with per-table stage timings.
pub async fn run_with_timing(
    cfg: &AppConfig,
) -> Result<(DataComparisonResult, PerfReport), ReconcileError> {
    cfg.reconcile.validate()?;

    let side_a = build_source("side_a", &cfg.side_a, &cfg.reconcile).await?;
    let side_b = match build_source("side_b", &cfg.side_b, &cfg.reconcile).await {
        Ok(source) => source,
        Err(e) => {
            side_a.close().await;
            return Err(e);
        }
    };

    let result = reconcile_sources(side_a, side_b, cfg.reconcile.clone()).await?;
    let perf = PerfReport::from_result(&result);
    Ok((result, perf))
}

/// Reconcile two already-open sources. Both are closed before returning,
/// whatever the outcome.
#[instrument(skip_all)]
pub async fn reconcile_sources(
    side_a: Arc<dyn RowSource>,
    side_b: Arc<dyn RowSource>,
    config: ReconcileConfig,
) -> Result<DataComparisonResult, ReconcileError> {
    let service = ReconcileService::new(Arc::clone(&side_a), Arc::clone(&side_b), config);
    let result = service.run().await;

    tokio::join!(side_a.close(), side_b.close());
    debug!("sources closed");
    result
}

// ─── Private helpers ───────────────────────────────────────────────────────────

/// Open one side: a JSON row snapshot for the `json` driver, otherwise a
/// pooled database connection. Wrapped in the monitoring decorator.
async fn build_source(
    side: &'static str,
    cfg: &DbConfig,
    reconcile: &ReconcileConfig,
) -> Result<Arc<dyn RowSource>, ReconcileError> {
    let inner: Arc<dyn RowSource> = if cfg.driver == "json" {
        let raw = tokio::fs::read_to_string(&cfg.dbname)
            .await
            .map_err(|e| ReconcileError::connection(side, anyhow::anyhow!("{}: {e}", cfg.dbname)))?;
        Arc::new(MapRowSource::from_json(&raw).map_err(|e| ReconcileError::connection(side, e))?)
    } else {
        let pool_size = u32::try_from(reconcile.max_workers).unwrap_or(u32::MAX);
        Arc::new(
            connect(cfg, pool_size, reconcile.batch_size)
                .await
                .map_err(|e| ReconcileError::connection(side, e))?,
        )
    };
    Ok(Arc::new(MonitoringRowSource::new(side, inner)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn snapshot_file(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    fn json_side(path: &std::path::Path) -> DbConfig {
        DbConfig {
            driver: "json".into(),
            host: String::new(),
            port: 0,
            dbname: path.to_string_lossy().into_owned(),
            user: String::new(),
            password: String::new(),
            schema: "public".into(),
        }
    }

    #[tokio::test]
    async fn run_reads_json_snapshots() {
        let a = snapshot_file(r#"{"users": {"rows": [{"name": "John"}, {"name": "Jane"}]}}"#);
        let b = snapshot_file(r#"{"users": {"rows": [{"name": "Jane"}, {"name": "Bob"}]}}"#);
        let cfg = AppConfig {
            side_a: json_side(a.path()),
            side_b: json_side(b.path()),
            reconcile: ReconcileConfig::default(),
            output: OutputConfig::default(),
        };

        let (result, perf) = run_with_timing(&cfg).await.unwrap();
        let users = &result.tables["users"];
        assert_eq!(users.matching_rows, 1);
        assert_eq!(users.only_in_a.len(), 1);
        assert_eq!(users.only_in_b.len(), 1);
        assert_eq!(perf.total_rows_fetched, 4);
    }

    #[tokio::test]
    async fn missing_snapshot_is_a_connection_error() {
        let a = snapshot_file("{}");
        let cfg = AppConfig {
            side_a: json_side(a.path()),
            side_b: json_side(std::path::Path::new("/nonexistent/reconcily.json")),
            reconcile: ReconcileConfig::default(),
            output: OutputConfig::default(),
        };

        let err = run(&cfg).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Connection { ref side, .. } if side == "side_b"));
    }
}
