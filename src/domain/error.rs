use serde::Serialize;
use thiserror::Error;

/// Errors that abort a reconciliation run.
///
/// Anything above warning severity ends the run: no partial report is
/// returned once one of these is raised.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Invalid configuration (non-positive worker count or batch size, …).
    /// Raised before any table work starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A data source could not be opened or kept alive.
    #[error("Connection error for {side}: {source}")]
    Connection {
        side: String,
        #[source]
        source: anyhow::Error,
    },

    /// Processing a single table failed; carries the table name.
    #[error("Failed to reconcile table {table}: {source}")]
    Table {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    /// Listing or introspecting a source outside any single table task.
    #[error("Source error: {0}")]
    Source(#[source] anyhow::Error),
}

impl ReconcileError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ReconcileError::Configuration(message.into())
    }

    pub fn table(table: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ReconcileError::Table {
            table: table.into(),
            source: source.into(),
        }
    }

    pub fn connection(side: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ReconcileError::Connection {
            side: side.into(),
            source: source.into(),
        }
    }

    /// Name of the failing table, when the error is table-scoped.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            ReconcileError::Table { table, .. } => Some(table),
            _ => None,
        }
    }
}

/// Where a rejected pattern came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternOrigin {
    UuidValue,
    Timestamp,
    Metadata,
    Sequence,
    Exclusion,
    UniqueId,
    Normalization,
}

/// A user-supplied pattern that could not be compiled and was skipped.
///
/// Recovered locally: classification and normalisation go on with the
/// remaining patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationWarning {
    pub origin: PatternOrigin,
    pub pattern: String,
    pub reason: String,
}

impl std::fmt::Display for ClassificationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "skipped invalid {:?} pattern '{}': {}",
            self.origin, self.pattern, self.reason
        )
    }
}
