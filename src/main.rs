use clap::Parser;
use reconcily::presentation::cli_summary::{print_perf_summary, print_summary, print_uuid_summary};
use reconcily::presentation::writers::{write_to_file, writer_for};
use reconcily::{init_tracing, AppConfig, LogLevel};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "reconcily",
    about = "Reconcily: compare the business data of two SQL databases, ignoring IDs, timestamps and audit noise."
)]
struct Cli {
    /// Config file (defaults to ./reconcily.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<String>,

    /// Report format: json, json-compact or none
    #[arg(short, long, default_value = "json")]
    format: String,

    /// Report directory, overrides `output.dir`
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print per-table stage timings
    #[arg(long)]
    perf: bool,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

/// 0: no differences and integrity check passed, 1: differences found or
/// integrity check failed, 2: the run could not complete.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(match (cli.verbose, cli.quiet) {
        (true, _) => LogLevel::Debug,
        (_, true) => LogLevel::Error,
        _ => LogLevel::Info,
    });

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether both sides reconciled cleanly.
async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let writer = match cli.format.as_str() {
        "none" => None,
        fmt => Some(writer_for(fmt).ok_or_else(|| anyhow::anyhow!("Unknown format: {}", fmt))?),
    };

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| AppConfig::default_path().to_string_lossy().into_owned());
    let cfg = AppConfig::load(&config_path)?;

    let (result, perf) = reconcily::run_with_timing(&cfg).await?;

    if !cli.quiet {
        print_summary(&result);
        print_uuid_summary(&result);
        if cli.perf {
            print_perf_summary(&perf);
        }
    }

    if let Some(writer) = writer {
        let dir = cli.output.clone().unwrap_or_else(|| PathBuf::from(&cfg.output.dir));
        let path = write_to_file(writer.as_ref(), &result, &dir)?;
        println!("Report written to {}", path.display());
    }

    Ok(result.total_differences() == 0 && result.integrity_check())
}
