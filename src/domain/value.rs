use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell read from a table.
///
/// Serialises untagged so reports carry the raw value (`null`, `true`, `42`,
/// `"text"`). Fingerprinting uses its own tagged encoding, so `Int(1)` and
/// `Text("1")` never collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Type alias for a database row: column name → value, in source column order.
pub type Row = IndexMap<String, CellValue>;

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view used for cross Int/Float comparison.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            CellValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Textual form used by pattern matching (UUID shapes, identifier templates).
    /// `Null` has no textual form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Blob(b) => Some(hex::encode(b)),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Blob(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<i32> for CellValue {
    fn from(i: i32) -> Self {
        CellValue::Int(i64::from(i))
    }
}

impl From<f64> for CellValue {
    fn from(x: f64) -> Self {
        CellValue::Float(x)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(CellValue::Null, Into::into)
    }
}

/// Form of a text cell used for equality: trimmed, lower-cased when the
/// comparison is case-insensitive. Reports always keep the raw value.
pub fn comparable_text(s: &str, case_sensitive: bool) -> String {
    let trimmed = s.trim();
    if case_sensitive {
        trimmed.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_round_trips_scalars() {
        let row: Row = serde_json::from_str(r#"{"id":1,"name":"a","score":1.5,"ok":true,"gone":null}"#)
            .unwrap();
        assert_eq!(row["id"], CellValue::Int(1));
        assert_eq!(row["name"], CellValue::Text("a".into()));
        assert_eq!(row["score"], CellValue::Float(1.5));
        assert_eq!(row["ok"], CellValue::Bool(true));
        assert!(row["gone"].is_null());
    }

    #[test]
    fn row_keeps_source_column_order() {
        let row: Row = serde_json::from_str(r#"{"z":1,"a":2}"#).unwrap();
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a"]);
    }

    #[test]
    fn as_i64_accepts_integral_text_and_floats() {
        assert_eq!(CellValue::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(CellValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(CellValue::Float(3.5).as_i64(), None);
        assert_eq!(CellValue::Null.as_i64(), None);
    }

    #[test]
    fn display_renders_blob_as_hex() {
        assert_eq!(CellValue::Blob(vec![0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(CellValue::Null.to_string(), "NULL");
    }
}
