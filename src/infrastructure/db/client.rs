use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::column::ColumnSpec;
use crate::domain::ports::RowSource;
use crate::domain::value::{CellValue, Row};
use crate::domain::value_objects::TableName;
use crate::infrastructure::config::DbConfig;
use crate::infrastructure::db::dialect::{from_driver, Dialect};
use crate::infrastructure::db::row_mapper::any_row_to_row;
use crate::infrastructure::db::sql_utils::{build_typed_select_query, primary_key_columns, with_page};

/// [`RowSource`] over a live database, through a sqlx connection pool.
///
/// Every call checks a connection out of the pool, so concurrent table
/// tasks never share a handle.
pub struct SqlxRowSource {
    pool: AnyPool,
    dialect: Arc<dyn Dialect>,
    schema: String,
    batch_size: usize,
}

/// Connect to the database described in `cfg` and return a `SqlxRowSource`.
///
/// `max_connections` is normally the run's worker count; `batch_size` bounds
/// the rows read per query.
pub async fn connect(cfg: &DbConfig, max_connections: u32, batch_size: usize) -> Result<SqlxRowSource> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(&cfg.url())
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {} (driver: {})",
                cfg.dbname, cfg.driver
            )
        })?;

    debug!(
        "Connected to {}/{} via {} driver",
        cfg.host, cfg.dbname, cfg.driver
    );

    Ok(SqlxRowSource {
        pool,
        dialect: Arc::from(from_driver(&cfg.driver)),
        schema: cfg.schema.clone(),
        batch_size: batch_size.max(1),
    })
}

/// Read a column from an AnyRow as String, handling MySQL's habit of returning
/// information_schema string columns as BLOB to sqlx AnyRow.
fn blob_or_string(row: &AnyRow, idx: usize) -> Result<Option<String>> {
    use sqlx::{Column, Row as _, TypeInfo};
    let type_name = row.column(idx).type_info().name();
    if type_name == "BLOB" {
        let bytes: Option<Vec<u8>> = row.try_get(idx)?;
        Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
    } else {
        Ok(row.try_get(idx)?)
    }
}

fn column_spec(row: &AnyRow) -> Result<ColumnSpec> {
    use sqlx::Row as _;
    let name = blob_or_string(row, 0)?.unwrap_or_default();
    let data_type = blob_or_string(row, 1)?.unwrap_or_default();
    let nullable = blob_or_string(row, 2)?.map_or(true, |s| s.eq_ignore_ascii_case("YES"));
    let default = blob_or_string(row, 3)?.map(CellValue::Text);
    let pk: Option<i64> = row.try_get(4)?;

    Ok(ColumnSpec {
        name,
        declared_type: data_type,
        nullable,
        default,
        is_primary_key: pk.unwrap_or(0) > 0,
    })
}

impl SqlxRowSource {
    fn select(&self, table: &TableName, columns: &[ColumnSpec]) -> String {
        build_typed_select_query(
            &self.schema,
            &table.0,
            columns,
            &primary_key_columns(columns),
            self.dialect.as_ref(),
        )
    }

    async fn query_rows(&self, sql: &str, table: &TableName, columns: &[ColumnSpec]) -> Result<Vec<Row>> {
        debug!("Executing: {}", sql);
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to query {}.{}", self.schema, table.0))?;

        let col_types: BTreeMap<String, String> = columns
            .iter()
            .map(|c| (c.name.clone(), c.declared_type.clone()))
            .collect();

        rows.iter()
            .map(|row| any_row_to_row(row, &col_types, self.dialect.as_ref()))
            .collect()
    }
}

#[async_trait]
impl RowSource for SqlxRowSource {
    async fn table_names(&self) -> Result<Vec<TableName>> {
        let mut query = sqlx::query(self.dialect.tables_sql());
        if self.dialect.binds_schema() {
            query = query.bind(self.schema.as_str());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list tables of {}", self.schema))?;

        let mut names = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(name) = blob_or_string(row, 0)? {
                names.push(TableName(name));
            }
        }
        Ok(names)
    }

    async fn columns(&self, table: &TableName) -> Result<Vec<ColumnSpec>> {
        let mut query = sqlx::query(self.dialect.columns_sql());
        if self.dialect.binds_schema() {
            query = query.bind(self.schema.as_str());
        }
        let rows = query
            .bind(table.0.as_str())
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch columns for {}.{}", self.schema, table.0))?;

        if rows.is_empty() {
            anyhow::bail!("Table {}.{} not found", self.schema, table.0);
        }
        rows.iter().map(column_spec).collect()
    }

    /// Reads in pages of `batch_size` rows when the table has a primary key
    /// to order by; a stable order is needed for `OFFSET` paging.
    async fn fetch_rows(&self, table: &TableName, columns: &[ColumnSpec]) -> Result<Vec<Row>> {
        let select = self.select(table, columns);
        if primary_key_columns(columns).is_empty() {
            return self.query_rows(&select, table, columns).await;
        }

        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .query_rows(&with_page(&select, self.batch_size, offset), table, columns)
                .await?;
            let page_len = page.len();
            rows.extend(page);
            if page_len < self.batch_size {
                break;
            }
            offset += page_len;
        }
        debug!(table = %table.0, rows = rows.len(), batch_size = self.batch_size, "table read in pages");
        Ok(rows)
    }

    async fn sample_rows(
        &self,
        table: &TableName,
        columns: &[ColumnSpec],
        limit: usize,
    ) -> Result<Vec<Row>> {
        let sql = with_page(&self.select(table, columns), limit, 0);
        self.query_rows(&sql, table, columns).await
    }

    async fn close(&self) {
        debug!(driver = self.dialect.name(), "closing connection pool");
        self.pool.close().await;
    }
}
