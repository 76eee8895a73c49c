use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::domain::column::ColumnSpec;
use crate::domain::ports::RowSource;
use crate::domain::value::Row;
use crate::domain::value_objects::TableName;

/// Column metadata and rows of one in-memory table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl TableData {
    pub fn new(columns: Vec<ColumnSpec>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }
}

/// In-memory implementation of [`RowSource`].
///
/// Wraps a `BTreeMap<table_name, TableData>`, either built in code or
/// deserialised from a JSON dump of the form
/// `{"users": {"columns": [...], "rows": [...]}}`. Lets a side be reconciled
/// without a live database.
#[derive(Debug, Clone, Default)]
pub struct MapRowSource(BTreeMap<String, TableData>);

impl MapRowSource {
    pub fn new(data: BTreeMap<String, TableData>) -> Self {
        Self(data)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let data: BTreeMap<String, TableData> =
            serde_json::from_str(json).context("Failed to parse row snapshot JSON")?;
        Ok(Self(data))
    }

    pub fn with_table(mut self, name: &str, columns: Vec<ColumnSpec>, rows: Vec<Row>) -> Self {
        self.0.insert(name.to_string(), TableData::new(columns, rows));
        self
    }

    fn table(&self, table: &TableName) -> Result<&TableData> {
        self.0
            .get(&table.0)
            .ok_or_else(|| anyhow!("Table {} not found", table.0))
    }
}

#[async_trait]
impl RowSource for MapRowSource {
    async fn table_names(&self) -> Result<Vec<TableName>> {
        Ok(self.0.keys().map(|k| TableName(k.clone())).collect())
    }

    async fn columns(&self, table: &TableName) -> Result<Vec<ColumnSpec>> {
        let data = self.table(table)?;
        if !data.columns.is_empty() {
            return Ok(data.columns.clone());
        }
        // No declared columns: derive untyped ones from the first row.
        Ok(data
            .rows
            .first()
            .map(|row| row.keys().map(|k| ColumnSpec::new(k, "")).collect())
            .unwrap_or_default())
    }

    async fn fetch_rows(&self, table: &TableName, _columns: &[ColumnSpec]) -> Result<Vec<Row>> {
        Ok(self.table(table)?.rows.clone())
    }

    async fn sample_rows(
        &self,
        table: &TableName,
        _columns: &[ColumnSpec],
        limit: usize,
    ) -> Result<Vec<Row>> {
        Ok(self.table(table)?.rows.iter().take(limit).cloned().collect())
    }
}
