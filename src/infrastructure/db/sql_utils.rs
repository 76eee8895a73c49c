use crate::domain::column::ColumnSpec;
use crate::infrastructure::db::dialect::QueryDialect;

// ─────────────────────────────────────────────────────────────────────────────
// Query builders
// ─────────────────────────────────────────────────────────────────────────────

fn order_by(order_cols: &[String], dialect: &dyn QueryDialect) -> String {
    if order_cols.is_empty() {
        return String::new();
    }
    let cols: Vec<String> = order_cols.iter().map(|c| dialect.quote_ident(c)).collect();
    format!(" ORDER BY {}", cols.join(", "))
}

/// Build a `SELECT * FROM <schema>.<table> ORDER BY <order_cols>` query.
/// Fallback for tables whose columns could not be introspected.
/// `ORDER BY` is omitted when `order_cols` is empty to avoid a SQL syntax error.
pub fn build_select_query(
    schema: &str,
    table: &str,
    order_cols: &[String],
    dialect: &dyn QueryDialect,
) -> String {
    format!(
        "SELECT * FROM {}{}{}",
        dialect.schema_prefix(schema),
        dialect.quote_ident(table),
        order_by(order_cols, dialect)
    )
}

/// Build a typed SELECT where every column whose declared type is not natively
/// supported by `sqlx::AnyRow` is wrapped in the dialect cast expression
/// (e.g. `::TEXT` for PostgreSQL, `CONVERT(… USING utf8mb4)` for MySQL).
pub fn build_typed_select_query(
    schema: &str,
    table: &str,
    columns: &[ColumnSpec],
    order_cols: &[String],
    dialect: &dyn QueryDialect,
) -> String {
    if columns.is_empty() {
        return build_select_query(schema, table, order_cols, dialect);
    }

    let col_exprs: Vec<String> = columns
        .iter()
        .map(|col| {
            let q = dialect.quote_ident(&col.name);
            if dialect.is_native_type(&col.declared_type) {
                q
            } else {
                dialect.cast_to_text(&q)
            }
        })
        .collect();

    format!(
        "SELECT {} FROM {}{}{}",
        col_exprs.join(", "),
        dialect.schema_prefix(schema),
        dialect.quote_ident(table),
        order_by(order_cols, dialect)
    )
}

/// Append a `LIMIT … OFFSET …` window (same syntax on every supported driver).
pub fn with_page(query: &str, limit: usize, offset: usize) -> String {
    if offset == 0 {
        format!("{} LIMIT {}", query, limit)
    } else {
        format!("{} LIMIT {} OFFSET {}", query, limit, offset)
    }
}

/// Primary-key column names in ordinal order.
pub fn primary_key_columns(columns: &[ColumnSpec]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| c.name.clone())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::dialect::{MysqlDialect, PostgresDialect, SqliteDialect};

    fn pk(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_build_select_query_postgres() {
        let q = build_select_query("legacy", "customers", &pk(&["id"]), &PostgresDialect);
        assert_eq!(q, r#"SELECT * FROM "legacy"."customers" ORDER BY "id""#);
    }

    #[test]
    fn test_build_select_query_mysql() {
        let q = build_select_query("mydb", "rules", &pk(&["id", "code"]), &MysqlDialect);
        assert_eq!(q, "SELECT * FROM `mydb`.`rules` ORDER BY `id`, `code`");
    }

    #[test]
    fn test_build_select_query_no_pk_omits_order_by() {
        let q = build_select_query("s", "t", &[], &PostgresDialect);
        assert_eq!(q, r#"SELECT * FROM "s"."t""#);
    }

    #[test]
    fn test_build_typed_select_query_postgres_casts_non_primitives() {
        let columns = vec![
            ColumnSpec::new("id", "integer").primary_key(),
            ColumnSpec::new("name", "character varying"),
            ColumnSpec::new("price", "numeric"),
            ColumnSpec::new("uid", "uuid"),
            ColumnSpec::new("active", "boolean"),
        ];
        let q = build_typed_select_query(
            "legacy",
            "customers",
            &columns,
            &primary_key_columns(&columns),
            &PostgresDialect,
        );
        assert!(!q.contains(r#""id"::TEXT"#));
        assert!(!q.contains(r#""active"::TEXT"#));
        assert!(q.contains(r#""name"::TEXT"#));
        assert!(q.contains(r#""price"::TEXT"#));
        assert!(q.contains(r#""uid"::TEXT"#));
        assert!(q.ends_with(r#"ORDER BY "id""#));
    }

    #[test]
    fn test_build_typed_select_query_mysql_uses_convert() {
        let columns = vec![
            ColumnSpec::new("id", "int"),
            ColumnSpec::new("discount_rate", "decimal"),
            ColumnSpec::new("created_at", "datetime"),
        ];
        let q = build_typed_select_query("source_db", "customers", &columns, &[], &MysqlDialect);
        assert!(!q.contains("CONVERT(`id`"), "int should not be cast");
        assert!(q.contains("CONVERT(`discount_rate` USING utf8mb4)"), "{}", q);
        assert!(q.contains("CONVERT(`created_at` USING utf8mb4)"), "{}", q);
        assert!(!q.contains("ORDER BY"));
    }

    #[test]
    fn test_build_typed_select_query_sqlite_casts_datetime() {
        let columns = vec![
            ColumnSpec::new("id", "INTEGER").primary_key(),
            ColumnSpec::new("created_at", "DATETIME"),
        ];
        let q = build_typed_select_query("main", "users", &columns, &pk(&["id"]), &SqliteDialect);
        assert_eq!(
            q,
            r#"SELECT "id", CAST("created_at" AS TEXT) AS "created_at" FROM "users" ORDER BY "id""#
        );
    }

    #[test]
    fn test_typed_select_without_columns_falls_back_to_star() {
        let q = build_typed_select_query("s", "t", &[], &[], &PostgresDialect);
        assert_eq!(q, r#"SELECT * FROM "s"."t""#);
    }

    #[test]
    fn test_with_page() {
        assert_eq!(with_page("SELECT 1", 100, 0), "SELECT 1 LIMIT 100");
        assert_eq!(with_page("SELECT 1", 100, 200), "SELECT 1 LIMIT 100 OFFSET 200");
    }

    #[test]
    fn test_primary_key_columns_keeps_order() {
        let columns = vec![
            ColumnSpec::new("region", "TEXT").primary_key(),
            ColumnSpec::new("qty", "INTEGER"),
            ColumnSpec::new("sku", "TEXT").primary_key(),
        ];
        assert_eq!(primary_key_columns(&columns), ["region", "sku"]);
    }
}
