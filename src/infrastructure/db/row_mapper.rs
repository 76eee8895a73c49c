use anyhow::Result;
use sqlx::any::AnyRow;
use sqlx::{Column, Row as _, TypeInfo};
use std::collections::BTreeMap;

use crate::domain::value::Row;
use crate::infrastructure::db::dialect::RowDecoder;

/// Convert a sqlx `AnyRow` into a [`Row`], keeping the SELECT column order.
///
/// `col_types` maps column names to their declared types. `decoder` is the
/// dialect-specific `RowDecoder` that knows how to turn an AnyRow column
/// index + type hint into the correct `CellValue`.
pub fn any_row_to_row(
    row: &AnyRow,
    col_types: &BTreeMap<String, String>,
    decoder: &dyn RowDecoder,
) -> Result<Row> {
    let mut out = Row::with_capacity(row.columns().len());
    for col in row.columns() {
        let name = col.name().to_string();
        // Prefer the declared type (more precise than AnyRow's runtime type
        // name); fall back to the runtime name for columns we know nothing of.
        let anyrow_type = col.type_info().name();
        let type_hint = col_types
            .get(&name)
            .map(|s| s.as_str())
            .unwrap_or(anyrow_type);

        let value = decoder.decode_column(row, col.ordinal(), type_hint)?;
        out.insert(name, value);
    }
    Ok(out)
}
