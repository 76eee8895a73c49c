use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::value::{comparable_text, CellValue, Row};
use crate::domain::value_objects::ExcludedColumns;

/// SHA-256 hex digest of a row's non-excluded content. Used as the matching key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RowFingerprint(pub String);

impl RowFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RowFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Tagged encoding so values of different kinds never serialise alike.
#[derive(Serialize)]
enum Canonical {
    Null,
    Bool(bool),
    Number(String),
    Text(String),
    Blob(String),
}

fn canonical(value: &CellValue, case_sensitive: bool) -> Canonical {
    match value {
        CellValue::Null => Canonical::Null,
        CellValue::Bool(b) => Canonical::Bool(*b),
        CellValue::Int(i) => Canonical::Number(i.to_string()),
        CellValue::Float(x) => Canonical::Number(canonical_float(*x)),
        CellValue::Text(s) => Canonical::Text(comparable_text(s, case_sensitive)),
        CellValue::Blob(b) => Canonical::Blob(hex::encode(b)),
    }
}

/// Integral floats print like integers and `-0.0` folds to `0`; other values
/// are rounded to the differ's tolerance, so rows that hash alike always
/// compare equal.
fn canonical_float(x: f64) -> String {
    if !x.is_finite() {
        return x.to_string();
    }
    if x.fract() == 0.0 {
        return if x == 0.0 { "0".to_string() } else { format!("{x:.0}") };
    }
    let rounded = format!("{x:.10}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" => "0".to_string(),
        t => t.to_string(),
    }
}

/// Compute the fingerprint of one row.
///
/// Algorithm:
/// 1. Drop every column in `excluded`.
/// 2. Sort the remaining `(column, value)` pairs by column name, so the
///    fingerprint does not depend on the order the source returned columns in.
/// 3. Serialise the pairs to canonical JSON (tagged values, one numeric form
///    for Int and Float, trimmed text lower-cased when `case_sensitive` is
///    off) and hash with SHA-256.
///
/// A row whose columns are all excluded fingerprints like an empty row.
pub fn fingerprint_row(row: &Row, excluded: &ExcludedColumns, case_sensitive: bool) -> RowFingerprint {
    let mut pairs: Vec<(&str, Canonical)> = row
        .iter()
        .filter(|(col, _)| !excluded.contains(col))
        .map(|(col, value)| (col.as_str(), canonical(value, case_sensitive)))
        .collect();
    pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let content = serde_json::to_string(&pairs).unwrap_or_default();
    let hash = Sha256::digest(content.as_bytes());
    RowFingerprint(format!("{:x}", hash))
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

    #[test]
    fn column_order_does_not_matter() {
        let a = row(&[("id", 1.into()), ("name", "x".into()), ("score", 2.5.into())]);
        let b = row(&[("score", 2.5.into()), ("id", 1.into()), ("name", "x".into())]);
        assert_eq!(fingerprint_row(&a, &none(), true), fingerprint_row(&b, &none(), true));
    }

    #[test]
    fn excluded_columns_do_not_contribute() {
        let excluded: ExcludedColumns = ["created_at"].into_iter().collect();
        let a = row(&[("name", "x".into()), ("created_at", "2024-01-01".into())]);
        let b = row(&[("name", "x".into()), ("created_at", "2025-06-30".into())]);
        assert_eq!(fingerprint_row(&a, &excluded, true), fingerprint_row(&b, &excluded, true));
    }

    #[test]
    fn missing_excluded_column_still_matches() {
        let excluded: ExcludedColumns = ["legacy"].into_iter().collect();
        let a = row(&[("name", "x".into()), ("legacy", 7.into())]);
        let b = row(&[("name", "x".into())]);
        assert_eq!(fingerprint_row(&a, &excluded, true), fingerprint_row(&b, &excluded, true));
    }

    #[test]
    fn value_kind_is_part_of_the_fingerprint() {
        let a = row(&[("v", CellValue::Int(1))]);
        let b = row(&[("v", CellValue::Text("1".into()))]);
        assert_ne!(fingerprint_row(&a, &none(), true), fingerprint_row(&b, &none(), true));
    }

    #[test]
    fn text_is_trimmed_and_optionally_case_folded() {
        let a = row(&[("name", "  Alice ".into())]);
        let b = row(&[("name", "alice".into())]);
        assert_ne!(fingerprint_row(&a, &none(), true), fingerprint_row(&b, &none(), true));
        assert_eq!(fingerprint_row(&a, &none(), false), fingerprint_row(&b, &none(), false));
    }

    #[test]
    fn integers_and_integral_floats_hash_alike() {
        let a = row(&[("price", CellValue::Int(4))]);
        let b = row(&[("price", CellValue::Float(4.0))]);
        assert_eq!(fingerprint_row(&a, &none(), true), fingerprint_row(&b, &none(), true));

        let zero = row(&[("delta", CellValue::Float(0.0))]);
        let neg_zero = row(&[("delta", CellValue::Float(-0.0))]);
        assert_eq!(fingerprint_row(&zero, &none(), true), fingerprint_row(&neg_zero, &none(), true));
    }

    #[test]
    fn floats_within_tolerance_hash_alike() {
        assert_eq!(canonical_float(0.1 + 0.2), canonical_float(0.3));
        assert_eq!(canonical_float(12.5), "12.5");
        assert_eq!(canonical_float(-3.0), "-3");
        assert_eq!(canonical_float(-1e-12), "0");
        assert_ne!(canonical_float(1.5), canonical_float(1.5001));
    }

    #[test]
    fn fingerprint_is_a_sha256_hex_digest() {
        let fp = fingerprint_row(&row(&[("id", 1.into())]), &none(), true);
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
