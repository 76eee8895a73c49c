use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::error::ReconcileError;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub side_a: DbConfig,
    pub side_b: DbConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Database driver: "postgres" (default), "mysql", "mariadb", "sqlite",
    /// or "json" for an offline row snapshot (`dbname` is then the file path).
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    pub dbname: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_driver() -> String {
    "postgres".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

/// Rules for one column category: auto-detection toggle, explicit column
/// list and custom name patterns.
///
/// Explicit columns and custom patterns are honoured even when
/// `auto_detect` is off. Custom patterns extend the built-in ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRules {
    #[serde(default = "default_true")]
    pub auto_detect: bool,
    #[serde(default)]
    pub explicit_columns: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self {
            auto_detect: true,
            explicit_columns: Vec::new(),
            patterns: Vec::new(),
        }
    }
}

/// UUID detection rules. `value_patterns` are regexes tested against sampled
/// cell values, on top of the canonical UUID shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UuidRules {
    #[serde(default = "default_true")]
    pub auto_detect: bool,
    #[serde(default)]
    pub explicit_columns: Vec<String>,
    #[serde(default)]
    pub value_patterns: Vec<String>,
}

impl Default for UuidRules {
    fn default() -> Self {
        Self {
            auto_detect: true,
            explicit_columns: Vec::new(),
            value_patterns: Vec::new(),
        }
    }
}

/// How identifier-like columns take part in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UuidMode {
    /// Excluded from matching and diffing; no statistics.
    #[default]
    Exclude,
    /// Excluded from matching and diffing; statistics are collected.
    IncludeWithTracking,
    /// Treated as ordinary business columns.
    IncludeNormal,
}

/// One `(pattern, replacement)` step applied to identifier values.
/// `replacement` accepts `$1`, `${1}` and `\1` group references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRule {
    pub pattern: String,
    pub replacement: String,
}

impl NormalizationRule {
    pub fn new(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

/// Read-only settings shared by every table task of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Tables to reconcile. Empty means every table present on both sides.
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub uuid: UuidRules,
    #[serde(default)]
    pub timestamp: CategoryRules,
    #[serde(default)]
    pub metadata: CategoryRules,
    #[serde(default)]
    pub sequence: CategoryRules,
    #[serde(default)]
    pub excluded_columns: Vec<String>,
    #[serde(default)]
    pub excluded_column_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    #[serde(default)]
    pub uuid_mode: UuidMode,
    /// Value regexes that mark a column as an identifier (e.g. `^(report|record)-\d+$`).
    #[serde(default)]
    pub unique_id_patterns: Vec<String>,
    #[serde(default)]
    pub normalization_rules: Vec<NormalizationRule>,
    /// Pair rows left over after fingerprint matching by primary-key value.
    ///
    /// Pairing uses the declared primary key even when it is excluded from
    /// matching as a sequence column. Turn this off when side B regenerated
    /// its keys: otherwise unrelated leftovers sharing a key value are
    /// reported as one changed row.
    #[serde(default = "default_true")]
    pub pair_by_primary_key: bool,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    1000
}

fn default_sample_size() -> usize {
    100
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            uuid: UuidRules::default(),
            timestamp: CategoryRules::default(),
            metadata: CategoryRules::default(),
            sequence: CategoryRules::default(),
            excluded_columns: Vec::new(),
            excluded_column_patterns: Vec::new(),
            case_sensitive: true,
            uuid_mode: UuidMode::default(),
            unique_id_patterns: Vec::new(),
            normalization_rules: Vec::new(),
            pair_by_primary_key: true,
            max_workers: default_max_workers(),
            batch_size: default_batch_size(),
            sample_size: default_sample_size(),
        }
    }
}

impl ReconcileConfig {
    /// Reject structurally invalid settings before any table work starts.
    pub fn validate(&self) -> std::result::Result<(), ReconcileError> {
        if self.max_workers == 0 {
            return Err(ReconcileError::configuration("max_workers must be positive"));
        }
        if self.batch_size == 0 {
            return Err(ReconcileError::configuration("batch_size must be positive"));
        }
        if self.sample_size == 0 {
            return Err(ReconcileError::configuration("sample_size must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

fn default_output_dir() -> String {
    "reports".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl DbConfig {
    /// Build a sqlx-compatible connection URL from this config.
    pub fn url(&self) -> String {
        match self.driver.as_str() {
            "mysql" | "mariadb" => format!(
                "mysql://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.dbname
            ),
            "sqlite" => format!("sqlite://{}?mode=ro", self.dbname),
            _ => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.dbname
            ),
        }
    }
}

impl AppConfig {
    /// Load a TOML file, overlaid with `RECONCILY__SECTION__KEY` environment
    /// variables, and validate the reconcile section.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("RECONCILY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let cfg: AppConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to parse config TOML")?;
        cfg.reconcile.validate()?;
        Ok(cfg)
    }

    /// `./reconcily.toml` when present, otherwise `<config dir>/reconcily/config.toml`.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from("reconcily.toml");
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|d| d.join("reconcily").join("config.toml"))
            .unwrap_or(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ReconcileConfig::default();
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.batch_size, 1000);
        assert_eq!(cfg.sample_size, 100);
        assert!(cfg.case_sensitive);
        assert_eq!(cfg.uuid_mode, UuidMode::Exclude);
        assert!(cfg.timestamp.auto_detect);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_workers_is_a_configuration_error() {
        let cfg = ReconcileConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ReconcileError::Configuration(_))));
    }

    #[test]
    fn zero_batch_size_is_a_configuration_error() {
        let cfg = ReconcileConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ReconcileError::Configuration(_))));
    }

    #[test]
    fn sqlite_url_is_read_only() {
        let db = DbConfig {
            driver: "sqlite".into(),
            host: String::new(),
            port: 0,
            dbname: "prod.db".into(),
            user: String::new(),
            password: String::new(),
            schema: default_schema(),
        };
        assert_eq!(db.url(), "sqlite://prod.db?mode=ro");
    }

    #[test]
    fn load_reads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[side_a]
driver = "sqlite"
dbname = "a.db"

[side_b]
driver = "sqlite"
dbname = "b.db"

[reconcile]
uuid_mode = "include_with_tracking"
max_workers = 2
excluded_columns = ["notes"]

[reconcile.timestamp]
auto_detect = false

[[reconcile.normalization_rules]]
pattern = '^(report|record)-(\d+)$'
replacement = 'id-\2'
"#
        )
        .unwrap();

        let cfg = AppConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.side_a.dbname, "a.db");
        assert_eq!(cfg.reconcile.uuid_mode, UuidMode::IncludeWithTracking);
        assert_eq!(cfg.reconcile.max_workers, 2);
        assert!(!cfg.reconcile.timestamp.auto_detect);
        assert_eq!(cfg.reconcile.excluded_columns, ["notes"]);
        assert_eq!(cfg.reconcile.normalization_rules[0].replacement, r"id-\2");
        assert_eq!(cfg.output.dir, "reports");
    }

    #[test]
    fn load_rejects_zero_workers() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            "[side_a]\ndbname = \"a\"\n[side_b]\ndbname = \"b\"\n[reconcile]\nmax_workers = 0\n"
        )
        .unwrap();
        let err = AppConfig::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.downcast_ref::<ReconcileError>().is_some(), "{err:#}");
    }
}
