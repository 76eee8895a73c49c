use crate::domain::{comparison::DataComparisonResult, ports::OutputWriter};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use self::json::JsonWriter;

pub mod json;

/// Register available writers - add new ones without touching main.rs
pub fn all_writers() -> Vec<Box<dyn OutputWriter>> {
    vec![Box::new(JsonWriter::default())]
}

pub fn writer_for(format: &str) -> Option<Box<dyn OutputWriter>> {
    match format {
        "json" => Some(Box::new(JsonWriter::default())),
        "json-compact" => Some(Box::new(JsonWriter {
            pretty: false,
            ..JsonWriter::default()
        })),
        _ => None,
    }
}

/// Writes the report to `<dir>/<run_id>.<ext>` via the chosen writer and
/// returns the file path.
pub fn write_to_file(
    writer: &dyn OutputWriter,
    result: &DataComparisonResult,
    dir: &Path,
) -> Result<PathBuf> {
    // Ensure the output directory exists
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let content = writer.format(result)?;
    let path = dir.join(format!("{}.{}", result.run_id, writer.extension()));
    fs::write(&path, &content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
