use anyhow::Result;
use sqlx::any::AnyRow;
use sqlx::{Column, Row, TypeInfo};

use crate::domain::column::is_integer_type_name;
use crate::domain::value::CellValue;

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// SQL dialect: catalogue queries and identifier handling.
///
/// Implemented per driver. Pure string manipulation, no sqlx dependency.
pub trait QueryDialect: Send + Sync {
    /// Return the driver name as a lowercase string ("postgres", "mysql", …).
    /// Used for log output only, never for branching logic.
    fn name(&self) -> &'static str;

    /// Whether catalogue queries take the schema as their first bind parameter.
    /// SQLite has a single namespace per file and overrides this to `false`.
    fn binds_schema(&self) -> bool {
        true
    }

    /// Quote an identifier (table, column, schema) per dialect.
    /// - MySQL / MariaDB → backtick: `` `col` ``
    /// - PostgreSQL / SQLite → double-quote: `"col"`
    fn quote_ident(&self, s: &str) -> String;

    /// Return the `schema.` prefix for a qualified table reference.
    /// SQLite has no schema namespace, so it returns `""`.
    fn schema_prefix(&self, schema: &str) -> String {
        format!("{}.", self.quote_ident(schema))
    }

    /// Produce the cast expression that coerces an unsupported column type to
    /// a string readable by `sqlx::AnyRow`.
    /// - PostgreSQL  : `"col"::TEXT AS "col"`
    /// - MySQL/MariaDB : `CONVERT(\`col\` USING utf8mb4) AS \`col\``
    /// - SQLite : `CAST("col" AS TEXT) AS "col"`
    fn cast_to_text(&self, col_quoted: &str) -> String;

    /// Return `true` if `data_type` (as reported by [`QueryDialect::columns_sql`])
    /// is natively decodable by `sqlx::AnyRow` without any explicit cast.
    fn is_native_type(&self, data_type: &str) -> bool;

    /// SQL listing the user tables, one name per row.
    fn tables_sql(&self) -> &'static str;

    /// SQL describing the columns of one table, in ordinal order, as
    /// `(name TEXT, data_type TEXT, is_nullable 'YES'|'NO', default TEXT NULL,
    /// primary_key INTEGER)`.
    fn columns_sql(&self) -> &'static str;
}

/// Row decoder: read a single `AnyRow` column into a [`CellValue`].
///
/// Implemented per driver. Lives in infrastructure only: callers outside
/// this module receive `CellValue`s, never raw `AnyRow`s.
pub trait RowDecoder: Send + Sync {
    /// Decode the column at `idx` using `type_hint` (the declared column type)
    /// to reconstruct the correct `CellValue` variant.
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<CellValue>;
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ─────────────────────────────────────────────────────────────────────────────

pub struct PostgresDialect;

impl QueryDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("\"{}\"", s.replace('"', "\"\""))
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        format!("{}::TEXT AS {}", col_quoted, col_quoted)
    }

    fn is_native_type(&self, data_type: &str) -> bool {
        matches!(
            data_type.to_lowercase().as_str(),
            "boolean" | "smallint" | "integer" | "bigint" | "real" | "double precision"
        )
    }

    fn tables_sql(&self) -> &'static str {
        "SELECT table_name::TEXT \
         FROM information_schema.tables \
         WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
         ORDER BY table_name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT c.column_name::TEXT, c.data_type::TEXT, c.is_nullable::TEXT, \
                c.column_default::TEXT, \
                CASE WHEN k.column_name IS NULL THEN 0 ELSE 1 END::INT8 \
         FROM information_schema.columns c \
         LEFT JOIN ( \
             SELECT kcu.table_schema, kcu.table_name, kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
              AND tc.table_name = kcu.table_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
         ) k ON k.table_schema = c.table_schema \
            AND k.table_name = c.table_name \
            AND k.column_name = c.column_name \
         WHERE c.table_schema = $1 AND c.table_name = $2 \
         ORDER BY c.ordinal_position"
    }
}

impl RowDecoder for PostgresDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<CellValue> {
        // bytea is not native: it arrives cast to TEXT in its `\x…` hex form.
        if type_hint.eq_ignore_ascii_case("bytea") {
            return Ok(row
                .try_get::<Option<String>, _>(idx)?
                .map_or(CellValue::Null, parse_bytea));
        }
        col_to_cell(row, idx, type_hint)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MySQL / MariaDB
// ─────────────────────────────────────────────────────────────────────────────

pub struct MysqlDialect;

impl QueryDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("`{}`", s.replace('`', "``"))
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        // CAST(col AS CHAR) and CONVERT(col USING utf8mb4) both return BLOB
        // to sqlx AnyRow; the decoder detects BLOB and reads Vec<u8>.
        format!("CONVERT({} USING utf8mb4) AS {}", col_quoted, col_quoted)
    }

    fn is_native_type(&self, data_type: &str) -> bool {
        matches!(
            data_type.to_lowercase().as_str(),
            "int" | "mediumint" | "bigint" | "float" | "double"
        )
    }

    fn tables_sql(&self) -> &'static str {
        "SELECT table_name \
         FROM information_schema.tables \
         WHERE table_schema = ? AND table_type = 'BASE TABLE' \
         ORDER BY table_name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT column_name, data_type, is_nullable, column_default, \
                CASE WHEN column_key = 'PRI' THEN 1 ELSE 0 END \
         FROM information_schema.columns \
         WHERE table_schema = ? AND table_name = ? \
         ORDER BY ordinal_position"
    }
}

impl RowDecoder for MysqlDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<CellValue> {
        // MySQL returns non-native columns as BLOB regardless of any SQL cast.
        // Detect at runtime and read raw bytes, then reinterpret using the type hint.
        let anyrow_type = row.column(idx).type_info().name();
        if anyrow_type == "BLOB" {
            blob_to_cell(row, idx, type_hint)
        } else {
            col_to_cell(row, idx, type_hint)
        }
    }
}

// MariaDB shares MySQL's wire protocol and AnyRow behaviour.
pub struct MariadbDialect;

impl QueryDialect for MariadbDialect {
    fn name(&self) -> &'static str {
        "mariadb"
    }

    fn quote_ident(&self, s: &str) -> String {
        MysqlDialect.quote_ident(s)
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        MysqlDialect.cast_to_text(col_quoted)
    }

    fn is_native_type(&self, data_type: &str) -> bool {
        MysqlDialect.is_native_type(data_type)
    }

    fn tables_sql(&self) -> &'static str {
        MysqlDialect.tables_sql()
    }

    fn columns_sql(&self) -> &'static str {
        MysqlDialect.columns_sql()
    }
}

impl RowDecoder for MariadbDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<CellValue> {
        MysqlDialect.decode_column(row, idx, type_hint)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

/// Storage class implied by a declared SQLite column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Integer,
    Real,
    Text,
    /// Untyped or `BLOB`: anything goes, decoded by runtime type.
    Blob,
    Numeric,
}

/// SQLite's type affinity rules, in their documented order.
fn affinity(declared: &str) -> Affinity {
    let t = declared.to_uppercase();
    if t.contains("INT") {
        Affinity::Integer
    } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
        Affinity::Text
    } else if t.is_empty() || t.contains("BLOB") {
        Affinity::Blob
    } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
        Affinity::Real
    } else {
        Affinity::Numeric
    }
}

pub struct SqliteDialect;

impl QueryDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn binds_schema(&self) -> bool {
        false
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("\"{}\"", s.replace('"', "\"\""))
    }

    fn schema_prefix(&self, _schema: &str) -> String {
        // SQLite has no schema namespace
        String::new()
    }

    fn cast_to_text(&self, col_quoted: &str) -> String {
        format!("CAST({} AS TEXT) AS {}", col_quoted, col_quoted)
    }

    /// DATETIME, BOOLEAN, DECIMAL… have NUMERIC affinity and may hold text,
    /// integers or reals in the same column: read them as text.
    fn is_native_type(&self, data_type: &str) -> bool {
        affinity(data_type) != Affinity::Numeric
    }

    fn tables_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT name, type, \
                CASE WHEN \"notnull\" = 0 THEN 'YES' ELSE 'NO' END, \
                dflt_value, pk \
         FROM pragma_table_info(?) \
         ORDER BY cid"
    }
}

impl RowDecoder for SqliteDialect {
    fn decode_column(&self, row: &AnyRow, idx: usize, type_hint: &str) -> Result<CellValue> {
        // Loose typing: a value's storage class wins over the declared type.
        let runtime = row.column(idx).type_info().name().to_uppercase();
        match (affinity(type_hint), runtime.as_str()) {
            (_, "NULL") => Ok(CellValue::Null),
            (Affinity::Numeric, _) => text_to_cell(row, idx, type_hint),
            (Affinity::Integer, "BIGINT" | "INTEGER" | "INT8") => col_to_cell(row, idx, "INT8"),
            (Affinity::Real, "DOUBLE" | "REAL" | "FLOAT8") => col_to_cell(row, idx, "FLOAT8"),
            (Affinity::Text, "TEXT" | "VARCHAR") => col_to_cell(row, idx, "TEXT"),
            _ => col_to_cell(row, idx, &runtime),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve the dialect pair (QueryDialect + RowDecoder) from a driver name string.
/// Returns `Box<dyn Dialect>` where `Dialect` is the combined supertrait alias.
pub fn from_driver(driver: &str) -> Box<dyn Dialect> {
    match driver {
        "mysql" => Box::new(MysqlDialect),
        "mariadb" => Box::new(MariadbDialect),
        "sqlite" => Box::new(SqliteDialect),
        _ => Box::new(PostgresDialect),
    }
}

/// Combined supertrait, so callers only store one object.
pub trait Dialect: QueryDialect + RowDecoder {}
impl Dialect for PostgresDialect {}
impl Dialect for MysqlDialect {}
impl Dialect for MariadbDialect {}
impl Dialect for SqliteDialect {}

// ─────────────────────────────────────────────────────────────────────────────
// Shared decoding helpers (private to this module)
// ─────────────────────────────────────────────────────────────────────────────

/// Reinterpret the textual form of a value using its declared type.
fn parse_text(s: String, type_hint: &str) -> CellValue {
    let upper = type_hint.to_uppercase();
    if upper.starts_with("DECIMAL") || upper.starts_with("NUMERIC") {
        return match s.trim().parse::<f64>() {
            Ok(f) => CellValue::Float(f),
            Err(_) => CellValue::Text(s),
        };
    }
    // MySQL hands TINYINT, SMALLINT and YEAR back as BLOB text.
    if is_integer_type_name(type_hint) || upper.starts_with("YEAR") {
        return match s.trim().parse::<i64>() {
            Ok(i) => CellValue::Int(i),
            Err(_) => CellValue::Text(s),
        };
    }
    CellValue::Text(s)
}

/// PostgreSQL's text output for bytea: `\x` followed by hex digits.
fn parse_bytea(s: String) -> CellValue {
    match s.strip_prefix("\\x").map(hex::decode) {
        Some(Ok(bytes)) => CellValue::Blob(bytes),
        _ => CellValue::Text(s),
    }
}

/// Decode a BLOB column (MySQL/MariaDB non-native types) as raw UTF-8 bytes,
/// then reinterpret the string using the type hint.
fn blob_to_cell(row: &AnyRow, idx: usize, type_hint: &str) -> Result<CellValue> {
    let bytes: Option<Vec<u8>> = row.try_get(idx)?;
    let Some(b) = bytes else {
        return Ok(CellValue::Null);
    };
    match String::from_utf8(b) {
        Ok(s) => Ok(parse_text(s, type_hint)),
        Err(e) => Ok(CellValue::Blob(e.into_bytes())),
    }
}

/// Decode a column that was cast to TEXT in the SELECT query.
fn text_to_cell(row: &AnyRow, idx: usize, type_hint: &str) -> Result<CellValue> {
    Ok(row
        .try_get::<Option<String>, _>(idx)?
        .map_or(CellValue::Null, |s| parse_text(s, type_hint)))
}

/// Decode a column whose AnyRow type is supported natively or has been
/// cast to TEXT in the SELECT query.
fn col_to_cell(row: &AnyRow, idx: usize, type_name: &str) -> Result<CellValue> {
    let v = match type_name.to_uppercase().as_str() {
        // ── Booleans ──────────────────────────────────────────────────────────
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(idx)?
            .map_or(CellValue::Null, CellValue::Bool),

        // ── Integers ──────────────────────────────────────────────────────────
        "INT2" | "SMALLINT" | "INT4" | "INT" | "INTEGER" | "MEDIUMINT" => row
            .try_get::<Option<i32>, _>(idx)?
            .map_or(CellValue::Null, |v| CellValue::Int(i64::from(v))),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(idx)?
            .map_or(CellValue::Null, CellValue::Int),

        // ── Floats ────────────────────────────────────────────────────────────
        "FLOAT4" | "REAL" | "FLOAT" => row
            .try_get::<Option<f32>, _>(idx)?
            .map_or(CellValue::Null, |v| CellValue::Float(f64::from(v))),

        "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(idx)?
            .map_or(CellValue::Null, CellValue::Float),

        // ── Raw bytes ─────────────────────────────────────────────────────────
        "BLOB" | "VARBINARY" => row
            .try_get::<Option<Vec<u8>>, _>(idx)?
            .map_or(CellValue::Null, CellValue::Blob),

        // ── Everything else was cast to TEXT: VARCHAR, UUID, TIMESTAMP, NUMERIC …
        _ => row
            .try_get::<Option<String>, _>(idx)?
            .map_or(CellValue::Null, |s| parse_text(s, type_name)),
    };
    Ok(v)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
