use std::collections::BTreeSet;

use crate::domain::fingerprint::fingerprint_row;
use crate::domain::reconciliation::{FieldDifference, RowDifference};
use crate::domain::value::{comparable_text, CellValue, Row};
use crate::domain::value_objects::ExcludedColumns;

const FLOAT_TOLERANCE: f64 = 1e-10;
const IDENTIFIER_COLUMNS: usize = 3;

// ─── Field comparison ───

/// Equality used by the differ, checked in order:
/// NULL/NULL equal, one NULL unequal, text trimmed (case per flag),
/// numbers within `1e-10` across Int/Float, then structural equality.
pub fn values_equal(a: &CellValue, b: &CellValue, case_sensitive: bool) -> bool {
    match (a, b) {
        (CellValue::Null, CellValue::Null) => true,
        (CellValue::Null, _) | (_, CellValue::Null) => false,
        (CellValue::Text(x), CellValue::Text(y)) => {
            comparable_text(x, case_sensitive) == comparable_text(y, case_sensitive)
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < FLOAT_TOLERANCE,
            _ => a == b,
        },
    }
}

/// Compare two matched rows field by field over the union of their columns.
///
/// A column present on one side only compares as NULL on the other.
/// Reported values are the raw, untrimmed cells.
pub fn diff_rows(
    row_a: &Row,
    row_b: &Row,
    excluded: &ExcludedColumns,
    case_sensitive: bool,
) -> Vec<FieldDifference> {
    let columns: BTreeSet<&String> = row_a.keys().chain(row_b.keys()).collect();

    columns
        .into_iter()
        .filter(|col| !excluded.contains(col))
        .filter_map(|col| {
            let a = row_a.get(col).unwrap_or(&CellValue::Null);
            let b = row_b.get(col).unwrap_or(&CellValue::Null);
            (!values_equal(a, b, case_sensitive)).then(|| FieldDifference {
                field_name: col.clone(),
                value_a: a.clone(),
                value_b: b.clone(),
            })
        })
        .collect()
}

/// Display label for a row: its first three non-excluded `col=value` pairs
/// in column-name order, e.g. `email=a@x.io|name=Ann`.
///
/// Falls back to `row_<fingerprint prefix>` when every column is excluded.
pub fn row_identifier(row: &Row, excluded: &ExcludedColumns) -> String {
    let mut pairs: Vec<(&String, &CellValue)> = row
        .iter()
        .filter(|(col, _)| !excluded.contains(col))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    if pairs.is_empty() {
        let fp = fingerprint_row(row, &ExcludedColumns::default(), true);
        return format!("row_{}", &fp.as_str()[..12]);
    }

    pairs
        .iter()
        .take(IDENTIFIER_COLUMNS)
        .map(|(col, value)| format!("{col}={value}"))
        .collect::<Vec<_>>()
        .join("|")
}

/// Diff every matched pair. Returns the differing rows and the number of
/// pairs without any difference.
pub fn diff_pairs(
    pairs: &[(&Row, &Row)],
    excluded: &ExcludedColumns,
    case_sensitive: bool,
) -> (Vec<RowDifference>, usize) {
    let mut differences = Vec::new();
    let mut identical = 0;

    for (a, b) in pairs {
        let fields = diff_rows(a, b, excluded, case_sensitive);
        if fields.is_empty() {
            identical += 1;
        } else {
            differences.push(RowDifference {
                row_identifier: row_identifier(a, excluded),
                differences: fields,
            });
        }
    }

    (differences, identical)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn none() -> ExcludedColumns {
        ExcludedColumns::default()
    }

    // ── values_equal ──

    #[test]
    fn nulls() {
        assert!(values_equal(&CellValue::Null, &CellValue::Null, true));
        assert!(!values_equal(&CellValue::Null, &"".into(), true));
        assert!(!values_equal(&0.into(), &CellValue::Null, true));
    }

    #[test]
    fn text_is_trimmed_and_case_flag_applies() {
        assert!(values_equal(&" Ann ".into(), &"Ann".into(), true));
        assert!(!values_equal(&"ann".into(), &"Ann".into(), true));
        assert!(values_equal(&"ann".into(), &"Ann".into(), false));
    }

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert!(values_equal(&CellValue::Int(3), &CellValue::Float(3.0), true));
        assert!(values_equal(&(0.1 + 0.2).into(), &0.3.into(), true));
        assert!(!values_equal(&CellValue::Float(1.0), &CellValue::Float(1.0001), true));
    }

    #[test]
    fn mixed_kinds_are_structural() {
        assert!(!values_equal(&CellValue::Int(1), &"1".into(), true));
        assert!(values_equal(&CellValue::Blob(vec![1, 2]), &CellValue::Blob(vec![1, 2]), true));
        assert!(!values_equal(&true.into(), &CellValue::Int(1), true));
    }

    // ── diff_rows ──

    #[test]
    fn reports_raw_values_of_differing_fields() {
        let a = row(&[("id", 1.into()), ("name", " John ".into())]);
        let b = row(&[("id", 1.into()), ("name", "John Updated".into())]);
        let diffs = diff_rows(&a, &b, &none(), true);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field_name, "name");
        assert_eq!(diffs[0].value_a, CellValue::from(" John "));
        assert_eq!(diffs[0].value_b, CellValue::from("John Updated"));
    }

    #[test]
    fn missing_column_compares_as_null() {
        let a = row(&[("name", "x".into()), ("note", CellValue::Null)]);
        let b = row(&[("name", "x".into()), ("extra", 5.into())]);
        let diffs = diff_rows(&a, &b, &none(), true);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field_name, "extra");
        assert!(diffs[0].value_a.is_null());
    }

    #[test]
    fn excluded_columns_are_skipped() {
        let a = row(&[("name", "x".into()), ("updated_at", "2024".into())]);
        let b = row(&[("name", "x".into()), ("updated_at", "2025".into())]);
        let excluded: ExcludedColumns = ["updated_at"].into_iter().collect();
        assert!(diff_rows(&a, &b, &excluded, true).is_empty());
    }

    // ── row_identifier ──

    #[test]
    fn identifier_uses_first_three_sorted_columns() {
        let r = row(&[
            ("zeta", 1.into()),
            ("name", "Ann".into()),
            ("email", "a@x.io".into()),
            ("age", 30.into()),
            ("id", 7.into()),
        ]);
        let excluded: ExcludedColumns = ["id"].into_iter().collect();
        assert_eq!(row_identifier(&r, &excluded), "age=30|email=a@x.io|name=Ann");
    }

    #[test]
    fn identifier_falls_back_to_content_hash() {
        let r = row(&[("id", 7.into())]);
        let excluded: ExcludedColumns = ["id"].into_iter().collect();
        let ident = row_identifier(&r, &excluded);
        assert!(ident.starts_with("row_"));
        assert_eq!(ident.len(), 16);
        assert_eq!(ident, row_identifier(&r, &excluded));
    }

    #[test]
    fn diff_pairs_counts_identical_pairs() {
        let a1 = row(&[("name", "x".into())]);
        let a2 = row(&[("name", "y".into())]);
        let b2 = row(&[("name", "z".into())]);
        let (diffs, identical) = diff_pairs(&[(&a1, &a1), (&a2, &b2)], &none(), true);
        assert_eq!(identical, 1);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].row_identifier, "name=y");
    }
}
