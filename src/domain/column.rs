use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::value::CellValue;
use crate::domain::value_objects::ExcludedColumns;

/// Column metadata as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Declared SQL type, verbatim (`INTEGER`, `varchar(50)`, `uuid`, …).
    #[serde(rename = "type", default)]
    pub declared_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<CellValue>,
    #[serde(default)]
    pub is_primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    pub fn new(name: &str, declared_type: &str) -> Self {
        Self {
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            nullable: true,
            default: None,
            is_primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    /// `true` when the declared type names an integer storage class.
    pub fn is_integer_type(&self) -> bool {
        is_integer_type_name(&self.declared_type)
    }
}

const INTEGER_TYPES: &[&str] = &[
    "INT", "INTEGER", "TINYINT", "SMALLINT", "MEDIUMINT", "BIGINT", "INT2", "INT4", "INT8",
    "SERIAL", "SMALLSERIAL", "BIGSERIAL",
];

/// Whether a declared SQL type is an integer type: `int(11) unsigned`,
/// `UNSIGNED BIG INT` and `bigserial` are, `interval` and `point` are not.
pub fn is_integer_type_name(declared: &str) -> bool {
    declared
        .split(|c: char| c == '(' || c == ')' || c == ',' || c.is_whitespace())
        .any(|token| INTEGER_TYPES.contains(&token.to_uppercase().as_str()))
}

/// Why a column takes part in (or is kept out of) matching and diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnClassification {
    Business,
    Uuid,
    Timestamp,
    AuditMetadata,
    Sequence,
    UserExcluded,
}

impl fmt::Display for ColumnClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColumnClassification::Business => "business",
            ColumnClassification::Uuid => "uuid",
            ColumnClassification::Timestamp => "timestamp",
            ColumnClassification::AuditMetadata => "audit_metadata",
            ColumnClassification::Sequence => "sequence",
            ColumnClassification::UserExcluded => "user_excluded",
        };
        f.write_str(label)
    }
}

/// Classifier output for one table.
///
/// A column can fall into several categories; `categories` keeps every match,
/// `classification` keeps the first one in precedence order
/// (UserExcluded, Uuid, Timestamp, AuditMetadata, Sequence), and `excluded`
/// is the deduplicated union the matcher works with.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableClassification {
    pub excluded: BTreeSet<String>,
    pub uuid_columns: BTreeSet<String>,
    pub classification: BTreeMap<String, ColumnClassification>,
    pub categories: BTreeMap<ColumnClassification, BTreeSet<String>>,
}

impl TableClassification {
    pub fn columns_in(&self, category: ColumnClassification) -> Vec<&str> {
        self.categories
            .get(&category)
            .map(|cols| cols.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_excluded(&self, column: &str) -> bool {
        self.excluded.contains(column)
    }

    pub fn excluded_columns(&self) -> ExcludedColumns {
        ExcludedColumns(self.excluded.clone())
    }

    /// One-line, human-readable description of what is left out of the comparison.
    pub fn summary(&self) -> String {
        let labels = [
            (ColumnClassification::Uuid, "UUID columns"),
            (ColumnClassification::Timestamp, "Timestamp columns"),
            (ColumnClassification::AuditMetadata, "Metadata columns"),
            (ColumnClassification::Sequence, "Sequence columns"),
            (ColumnClassification::UserExcluded, "User-excluded columns"),
        ];

        let parts: Vec<String> = labels
            .iter()
            .filter_map(|(category, label)| {
                let cols = self.columns_in(*category);
                (!cols.is_empty()).then(|| format!("{}: {}", label, cols.join(", ")))
            })
            .collect();

        if parts.is_empty() {
            "No columns excluded from comparison".to_string()
        } else {
            format!("Excluded from comparison - {}", parts.join("; "))
        }
    }
}
