use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::column::{ColumnClassification, ColumnSpec, TableClassification};
use crate::domain::error::{ClassificationWarning, PatternOrigin};
use crate::domain::value::Row;
use crate::infrastructure::config::{CategoryRules, ReconcileConfig, UuidMode};

// ─── Built-in rules ───────────────────────────────────────────────────────────

const UUID_NAME_PATTERNS: &[&str] = &[r".*uuid.*", r".*guid.*"];
const UUID_TYPES: &[&str] = &["UUID", "GUID"];

const TIMESTAMP_PATTERNS: &[&str] = &[
    r".*timestamp.*",
    r".*_at$",
    r".*_time$",
    r".*_date$",
    r"^created$",
    r"^modified$",
    r"^updated$",
    r"^deleted$",
    r".*created_time.*",
    r".*updated_time.*",
    r".*modified_time.*",
    r".*deleted_time.*",
];
const TIMESTAMP_TYPES: &[&str] = &["DATETIME", "TIMESTAMP", "DATE", "TIME"];

const METADATA_PATTERNS: &[&str] = &[
    r".*_by$",
    r".*_user$",
    r".*created_by.*",
    r".*modified_by.*",
    r".*updated_by.*",
    r".*session_id.*",
    r".*transaction_id.*",
    r".*row_version.*",
    r".*record_version.*",
    r".*version_number.*",
    r".*etag.*",
    r".*checksum.*",
    r".*hash.*",
    r".*audit_log.*",
    r".*trace_id.*",
    r".*source_system.*",
    r".*external_id.*",
];

const SEQUENCE_PATTERNS: &[&str] = &[
    r"^id$",
    r".*_seq$",
    r".*_sequence$",
    r".*_number$",
    r".*rowid.*",
    r".*autoincrement.*",
];
const SEQUENCE_TYPES: &[&str] = &["SERIAL", "BIGSERIAL", "IDENTITY"];

/// Share of non-null sampled values that must look like identifiers.
const UUID_VALUE_RATIO: f64 = 0.8;
/// Share of adjacent sorted sample values that must differ by exactly one.
const SEQUENTIAL_RATIO: f64 = 0.7;

// ─── Pattern compilation ──────────────────────────────────────────────────────

/// Compile one user pattern, anchored at the start and case-insensitive.
fn compile_pattern(pattern: &str, origin: PatternOrigin) -> Result<Regex, ClassificationWarning> {
    Regex::new(&format!("(?i)^(?:{pattern})")).map_err(|e| ClassificationWarning {
        origin,
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Compile every pattern, keeping the valid ones and collecting a warning for
/// each one that does not compile.
pub(crate) fn compile_patterns(
    patterns: &[String],
    origin: PatternOrigin,
    warnings: &mut Vec<ClassificationWarning>,
) -> Vec<Regex> {
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        match compile_pattern(pattern, origin) {
            Ok(re) => compiled.push(re),
            Err(w) => {
                warn!(pattern = %w.pattern, reason = %w.reason, "skipping invalid pattern");
                warnings.push(w);
            }
        }
    }
    compiled
}

fn builtin(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i)^(?:{p})")).ok())
        .collect()
}

/// `varchar(50)` → `VARCHAR`, `timestamp with time zone` → `TIMESTAMP`.
fn base_type(declared: &str) -> String {
    declared
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

fn names_lowercase(names: &[String]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_lowercase()).collect()
}

// ─── Compiled category ────────────────────────────────────────────────────────

struct Category {
    auto_detect: bool,
    explicit: BTreeSet<String>,
    defaults: Vec<Regex>,
    custom: Vec<Regex>,
}

impl Category {
    fn new(
        rules: &CategoryRules,
        defaults: &[&str],
        origin: PatternOrigin,
        warnings: &mut Vec<ClassificationWarning>,
    ) -> Self {
        Self {
            auto_detect: rules.auto_detect,
            explicit: names_lowercase(&rules.explicit_columns),
            defaults: builtin(defaults),
            custom: compile_patterns(&rules.patterns, origin, warnings),
        }
    }

    fn is_explicit(&self, column: &str) -> bool {
        self.explicit.contains(&column.to_lowercase())
    }

    /// Explicit list and custom patterns always apply; built-in name
    /// patterns only with auto-detection on.
    fn matches_name(&self, column: &str) -> bool {
        self.is_explicit(column)
            || self.custom.iter().any(|re| re.is_match(column))
            || (self.auto_detect && self.defaults.iter().any(|re| re.is_match(column)))
    }
}

// ─── ColumnClassifier ─────────────────────────────────────────────────────────

/// Assigns every column of a table to a [`ColumnClassification`] and derives
/// the set of columns left out of matching and diffing.
///
/// Built once per run from the read-only [`ReconcileConfig`]: user patterns
/// are compiled up front, invalid ones are skipped and reported through
/// [`ColumnClassifier::warnings`]. `classify` itself never fails.
pub struct ColumnClassifier {
    uuid_mode: UuidMode,
    uuid_auto: bool,
    uuid_explicit: BTreeSet<String>,
    uuid_names: Vec<Regex>,
    uuid_values: Vec<Regex>,
    timestamp: Category,
    metadata: Category,
    sequence: Category,
    user_excluded: BTreeSet<String>,
    user_patterns: Vec<Regex>,
    warnings: Vec<ClassificationWarning>,
}

impl ColumnClassifier {
    pub fn new(cfg: &ReconcileConfig) -> Self {
        let mut warnings = Vec::new();

        let mut uuid_values =
            compile_patterns(&cfg.uuid.value_patterns, PatternOrigin::UuidValue, &mut warnings);
        uuid_values.extend(compile_patterns(
            &cfg.unique_id_patterns,
            PatternOrigin::UniqueId,
            &mut warnings,
        ));

        let timestamp = Category::new(
            &cfg.timestamp,
            TIMESTAMP_PATTERNS,
            PatternOrigin::Timestamp,
            &mut warnings,
        );
        let metadata = Category::new(
            &cfg.metadata,
            METADATA_PATTERNS,
            PatternOrigin::Metadata,
            &mut warnings,
        );
        let sequence = Category::new(
            &cfg.sequence,
            SEQUENCE_PATTERNS,
            PatternOrigin::Sequence,
            &mut warnings,
        );
        let user_patterns = compile_patterns(
            &cfg.excluded_column_patterns,
            PatternOrigin::Exclusion,
            &mut warnings,
        );

        Self {
            uuid_mode: cfg.uuid_mode,
            uuid_auto: cfg.uuid.auto_detect,
            uuid_explicit: names_lowercase(&cfg.uuid.explicit_columns),
            uuid_names: builtin(UUID_NAME_PATTERNS),
            uuid_values,
            timestamp,
            metadata,
            sequence,
            user_excluded: names_lowercase(&cfg.excluded_columns),
            user_patterns,
            warnings,
        }
    }

    /// Patterns rejected while building the classifier.
    pub fn warnings(&self) -> &[ClassificationWarning] {
        &self.warnings
    }

    /// Classify the columns of one table.
    ///
    /// `sample` (typically the first rows of side A) feeds the value-based
    /// heuristics: UUID shapes and sequential integers. Pass an empty slice to
    /// classify on metadata alone.
    pub fn classify(&self, columns: &[ColumnSpec], sample: &[Row]) -> TableClassification {
        let pk_count = columns.iter().filter(|c| c.is_primary_key).count();
        let mut categories: BTreeMap<ColumnClassification, BTreeSet<String>> = BTreeMap::new();

        for column in columns {
            let name = column.name.as_str();
            let mut hit = |category| {
                categories.entry(category).or_default().insert(name.to_string());
            };

            if self.is_uuid(column, sample) {
                hit(ColumnClassification::Uuid);
            }
            if self.is_timestamp(column) {
                hit(ColumnClassification::Timestamp);
            }
            if self.metadata.matches_name(name) {
                hit(ColumnClassification::AuditMetadata);
            }
            if self.is_sequence(column, pk_count, sample) {
                hit(ColumnClassification::Sequence);
            }
            if self.is_user_excluded(name) {
                hit(ColumnClassification::UserExcluded);
            }
        }

        let precedence = [
            ColumnClassification::UserExcluded,
            ColumnClassification::Uuid,
            ColumnClassification::Timestamp,
            ColumnClassification::AuditMetadata,
            ColumnClassification::Sequence,
        ];

        let mut classification = BTreeMap::new();
        let mut excluded = BTreeSet::new();
        for column in columns {
            let name = &column.name;
            let found: Vec<ColumnClassification> = precedence
                .iter()
                .copied()
                .filter(|c| categories.get(c).is_some_and(|set| set.contains(name)))
                .collect();

            let primary = found.first().copied().unwrap_or(ColumnClassification::Business);
            classification.insert(name.clone(), primary);

            // Under include_normal, a column that is only a UUID takes part in matching.
            let excluded_here = match self.uuid_mode {
                UuidMode::IncludeNormal => found.iter().any(|c| *c != ColumnClassification::Uuid),
                _ => !found.is_empty(),
            };
            if excluded_here {
                excluded.insert(name.clone());
            }
        }

        let uuid_columns = categories
            .get(&ColumnClassification::Uuid)
            .cloned()
            .unwrap_or_default();

        debug!(
            columns = columns.len(),
            excluded = excluded.len(),
            uuid = uuid_columns.len(),
            "columns classified"
        );

        TableClassification {
            excluded,
            uuid_columns,
            classification,
            categories,
        }
    }

    fn is_uuid(&self, column: &ColumnSpec, sample: &[Row]) -> bool {
        if self.uuid_explicit.contains(&column.name.to_lowercase()) {
            return true;
        }
        if self.uuid_auto {
            if self.uuid_names.iter().any(|re| re.is_match(&column.name)) {
                return true;
            }
            if UUID_TYPES.contains(&base_type(&column.declared_type).as_str()) {
                return true;
            }
        }
        if !self.uuid_auto && self.uuid_values.is_empty() {
            return false;
        }
        self.sample_looks_like_ids(&column.name, sample)
    }

    /// `true` when at least 80% of the non-null sampled values are identifiers:
    /// a canonical UUID (auto-detection only) or a match for a user value pattern.
    fn sample_looks_like_ids(&self, column: &str, sample: &[Row]) -> bool {
        let values: Vec<String> = sample
            .iter()
            .filter_map(|row| row.get(column))
            .filter_map(|v| v.as_text())
            .collect();
        if values.is_empty() {
            return false;
        }

        let hits = values
            .iter()
            .filter(|v| {
                (self.uuid_auto && Uuid::try_parse(v.trim()).is_ok())
                    || self.uuid_values.iter().any(|re| re.is_match(v))
            })
            .count();

        hits as f64 / values.len() as f64 >= UUID_VALUE_RATIO
    }

    fn is_timestamp(&self, column: &ColumnSpec) -> bool {
        (self.timestamp.auto_detect
            && TIMESTAMP_TYPES.contains(&base_type(&column.declared_type).as_str()))
            || self.timestamp.matches_name(&column.name)
    }

    fn is_sequence(&self, column: &ColumnSpec, pk_count: usize, sample: &[Row]) -> bool {
        if self.sequence.matches_name(&column.name) {
            return true;
        }
        if !self.sequence.auto_detect {
            return false;
        }
        if SEQUENCE_TYPES.contains(&base_type(&column.declared_type).as_str()) {
            return true;
        }
        if column.is_primary_key && pk_count == 1 && column.is_integer_type() {
            return true;
        }
        sample.len() > 1 && appears_sequential(column, sample)
    }

    fn is_user_excluded(&self, column: &str) -> bool {
        self.user_excluded.contains(&column.to_lowercase())
            || self.user_patterns.iter().any(|re| re.is_match(column))
    }
}

/// More than 70% of adjacent sorted values differ by exactly one.
///
/// Only integer columns qualify: declared as such, or untyped with integer
/// values throughout the sample.
fn appears_sequential(column: &ColumnSpec, sample: &[Row]) -> bool {
    let cells: Vec<_> = sample
        .iter()
        .filter_map(|row| row.get(&column.name))
        .filter(|v| !v.is_null())
        .collect();

    let integer_column = column.is_integer_type()
        || (column.declared_type.trim().is_empty()
            && cells.iter().all(|v| matches!(v, crate::domain::value::CellValue::Int(_))));
    if !integer_column || cells.len() < 2 {
        return false;
    }

    let mut values = Vec::with_capacity(cells.len());
    for cell in cells {
        match cell.as_i64() {
            Some(v) => values.push(v),
            None => return false,
        }
    }
    values.sort_unstable();

    let steps = values.len() - 1;
    let unit_steps = values
        .windows(2)
        .filter(|w| w[1].checked_sub(w[0]) == Some(1))
        .count();
    unit_steps as f64 / steps as f64 > SEQUENTIAL_RATIO
}
