use crate::domain::{
    column::ColumnSpec,
    comparison::DataComparisonResult,
    value::Row,
    value_objects::TableName,
};
use anyhow::Result;
use async_trait::async_trait;

/// Port: read access to one side of the comparison
/// (implemented by `SqlxRowSource` and `MapRowSource`).
///
/// Implementations must be safe to call from several table tasks at once;
/// SQL sources hand each call its own pooled connection.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Names of the user tables on this side.
    async fn table_names(&self) -> Result<Vec<TableName>>;

    /// Ordered column metadata for `table`.
    async fn columns(&self, table: &TableName) -> Result<Vec<ColumnSpec>>;

    /// Every row of `table`.
    async fn fetch_rows(&self, table: &TableName, columns: &[ColumnSpec]) -> Result<Vec<Row>>;

    /// At most `limit` rows of `table`, for classification heuristics.
    async fn sample_rows(
        &self,
        table: &TableName,
        columns: &[ColumnSpec],
        limit: usize,
    ) -> Result<Vec<Row>>;

    /// Release any handle held by this source. Called on every exit path.
    async fn close(&self) {}
}

/// Port: output formatting (implemented by JsonWriter)
pub trait OutputWriter: Send + Sync {
    /// Serializes the result to a string
    fn format(&self, result: &DataComparisonResult) -> Result<String>;
    /// Extension of the produced file (e.g. "json")
    fn extension(&self) -> &'static str;
}
