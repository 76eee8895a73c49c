use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Newtype for table names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName(pub String);

impl TableName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        TableName(s.to_string())
    }
}

/// Columns left out of fingerprinting and diffing for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedColumns(pub BTreeSet<String>);

impl ExcludedColumns {
    pub fn contains(&self, col: &str) -> bool {
        self.0.contains(col)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExcludedColumns {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ExcludedColumns(iter.into_iter().map(Into::into).collect())
    }
}
