use anyhow::Result;
use serde::Serialize;

use crate::application::monitoring::PerfReport;
use crate::domain::{comparison::DataComparisonResult, ports::OutputWriter};

// ─── Serialisation view ──────────────────────────────────────────────────────
//
// Presentation-only wrapper: the domain result is serialised as is, with the
// performance report alongside when requested.

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    result: &'a DataComparisonResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    perf: Option<PerfReport>,
}

// ─── Writer ───────────────────────────────────────────────────────────────────

pub struct JsonWriter {
    pub pretty: bool,
    pub include_perf: bool,
}

impl Default for JsonWriter {
    fn default() -> Self {
        Self {
            pretty: true,
            include_perf: true,
        }
    }
}

impl OutputWriter for JsonWriter {
    fn format(&self, result: &DataComparisonResult) -> Result<String> {
        let view = JsonReport {
            result,
            perf: self.include_perf.then(|| PerfReport::from_result(result)),
        };

        if self.pretty {
            Ok(serde_json::to_string_pretty(&view)?)
        } else {
            Ok(serde_json::to_string(&view)?)
        }
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}
