use crate::application::monitoring::PerfReport;
use crate::domain::comparison::DataComparisonResult;
use crate::domain::reconciliation::TableReconciliation;
use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct TableRow {
    table: String,
    #[tabled(rename = "rows A")]
    rows_a: String,
    #[tabled(rename = "rows B")]
    rows_b: String,
    matching: String,
    #[tabled(rename = "only A")]
    only_a: String,
    #[tabled(rename = "only B")]
    only_b: String,
    changed: String,
}

#[derive(Tabled)]
struct SummaryRow {
    metric: String,
    value: String,
}

fn count(n: usize, color: fn(String) -> ColoredString) -> String {
    if n == 0 {
        n.to_string().dimmed().to_string()
    } else {
        color(n.to_string()).to_string()
    }
}

fn table_row(t: &TableReconciliation) -> TableRow {
    let name = if t.is_identical() {
        t.table_name.green().to_string()
    } else {
        t.table_name.bold().to_string()
    };
    TableRow {
        table: name,
        rows_a: t.row_count_a.to_string(),
        rows_b: t.row_count_b.to_string(),
        matching: t.matching_rows.to_string(),
        only_a: count(t.only_in_a.len(), |s| s.red()),
        only_b: count(t.only_in_b.len(), |s| s.green()),
        changed: count(t.row_differences.len(), |s| s.yellow()),
    }
}

pub fn print_summary(result: &DataComparisonResult) {
    println!();

    println!("{}", "RECONCILY SUMMARY".bold().cyan());
    println!("Run: {}", result.run_id.bright_yellow());
    println!();

    if result.tables.is_empty() {
        println!("{}", "No common tables to reconcile.".italic());
        return;
    }

    let rows: Vec<TableRow> = result.tables.values().map(table_row).collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=6)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    for t in result.tables.values() {
        println!("  {} {}", t.table_name.bold(), t.classification.summary().dimmed());
    }

    let s = &result.summary;
    let mut summary_rows = vec![
        SummaryRow {
            metric: "Tables compared".into(),
            value: s.total_tables.to_string(),
        },
        SummaryRow {
            metric: "Identical tables".into(),
            value: s.identical_tables.to_string().green().to_string(),
        },
        SummaryRow {
            metric: "Tables with differences".into(),
            value: count(s.tables_with_differences, |v| v.yellow()),
        },
        SummaryRow {
            metric: "Rows compared".into(),
            value: s.total_rows_compared.to_string(),
        },
        SummaryRow {
            metric: "Total differences".into(),
            value: s.total_differences.to_string().bold().to_string(),
        },
    ];
    if s.total_uuid_columns > 0 {
        summary_rows.push(SummaryRow {
            metric: "Identifier values (A / B)".into(),
            value: format!("{} / {}", s.total_uuid_values_a, s.total_uuid_values_b),
        });
        summary_rows.push(SummaryRow {
            metric: "Integrity check".into(),
            value: if s.integrity_check {
                "passed".green().to_string()
            } else {
                "FAILED".red().bold().to_string()
            },
        });
    }

    let summary_table = Table::new(summary_rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=1)).with(Alignment::right()))
        .to_string();

    println!();
    println!("{summary_table}");

    if !result.warnings.is_empty() {
        println!();
        println!("{}", "WARNINGS".bold().yellow());
        for w in &result.warnings {
            println!("  {} {}", "!".yellow(), w);
        }
    }
    println!();
}

// ─── Identifier tracking ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct UuidRow {
    table: String,
    column: String,
    pattern: String,
    #[tabled(rename = "values A")]
    values_a: String,
    #[tabled(rename = "values B")]
    values_b: String,
    #[tabled(rename = "normalized match")]
    matched: String,
}

/// Print per-column identifier statistics for tables tracked under
/// `include_with_tracking`. Prints nothing when no table was tracked.
pub fn print_uuid_summary(result: &DataComparisonResult) {
    let rows: Vec<UuidRow> = result
        .tables
        .values()
        .filter_map(|t| t.uuid_statistics.as_ref().map(|s| (t, s)))
        .flat_map(|(t, stats)| {
            stats.columns.iter().map(move |(column, c)| UuidRow {
                table: t.table_name.bold().to_string(),
                column: column.clone(),
                pattern: c.pattern.to_string().dimmed().to_string(),
                values_a: c.non_null_a.to_string(),
                values_b: c.non_null_b.to_string(),
                matched: format_percentage(c.match_percentage),
            })
        })
        .collect();

    if rows.is_empty() {
        return;
    }

    println!("{}", "IDENTIFIER TRACKING".bold().cyan());
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..=5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    println!();
}

fn format_percentage(p: f64) -> String {
    let s = format!("{p:.1}%");
    if p >= 100.0 {
        s.green().to_string()
    } else if p >= 80.0 {
        s.yellow().to_string()
    } else {
        s.red().to_string()
    }
}

// ─── Performance summary ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PerfRow {
    operation: String,
    table: String,
    #[tabled(rename = "rows")]
    rows: String,
    #[tabled(rename = "time (ms)")]
    duration_ms: String,
}

/// Print a performance timing table to stdout.
pub fn print_perf_summary(report: &PerfReport) {
    if report.timings.is_empty() {
        return;
    }

    println!("{}", "PERFORMANCE".bold().cyan());

    let rows: Vec<PerfRow> = report
        .timings
        .iter()
        .map(|t| PerfRow {
            operation: t.operation.dimmed().to_string(),
            table: t.table.bold().to_string(),
            rows: t.rows.to_string(),
            duration_ms: format_duration(t.duration_ms),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=3)).with(Alignment::right()))
        .to_string();

    println!("{table}");

    println!(
        "  Total: {} row(s) fetched  ·  {} ms in table stages",
        report.total_rows_fetched.to_string().bold(),
        format_duration(report.total_ms),
    );
    println!();
}

fn format_duration(ms: u128) -> String {
    if ms >= 1_000 {
        format!("{:.1}s", ms as f64 / 1_000.0).yellow().to_string()
    } else if ms >= 100 {
        ms.to_string().yellow().to_string()
    } else {
        ms.to_string().green().to_string()
    }
}
