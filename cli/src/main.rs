//! bosbench: run a benchmark session
//!
//! Non-interactive: `bosbench <scenarios> --ram N --profile P`. Without
//! arguments the scenario, profile, RAM cap and export directory are
//! prompted for.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use comfy_table::{ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use bosbench::model::{Profile, Scenario};
use bosbench::orchestrator::{Interrupt, Orchestrator, SessionOptions, SessionReport};
use bosbench::results::{RunStatus, RunSummary};
use bosbench::BenchConfig;

#[derive(Parser)]
#[command(name = "bosbench", version, about = "BOS / digital-twin database benchmark")]
struct Cli {
    /// Scenario id, comma list or `all` (prompted for when omitted)
    scenarios: Option<String>,

    /// RAM cap in GB, comma list for several
    #[arg(long, value_delimiter = ',')]
    ram: Vec<u32>,

    /// Profile such as `small-2d`, comma list for several
    #[arg(long, value_delimiter = ',')]
    profile: Vec<String>,

    /// Export directory, mounted read-only into the engines
    #[arg(long, default_value = "exports")]
    export: PathBuf,

    /// Results root
    #[arg(long, default_value = "results")]
    output: PathBuf,

    /// Dataset seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Resume the given session id
    #[arg(long)]
    resume: Option<String>,

    /// Re-queue failed runs when resuming
    #[arg(long)]
    rerun_failed: bool,

    /// Keep scenario export files after their runs
    #[arg(long)]
    keep_exports: bool,

    /// Root of the query library
    #[arg(long, default_value = "queries", env = "BOSBENCH_QUERIES")]
    queries: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let code = match run(Cli::parse()).await {
        Ok(report) => {
            if report.all_completed() {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<SessionReport> {
    let options = match &cli.scenarios {
        Some(scenarios) => options_from_args(&cli, scenarios)?,
        None => prompt_options(&cli)?,
    };
    let orchestrator = Orchestrator::new(options, Interrupt::listen());
    let report = orchestrator.run_session().await.context("session failed")?;
    print_summary(&report);
    Ok(report)
}

fn base_options(cli: &Cli, scenarios: Vec<Scenario>, profiles: Vec<Profile>, ram: Vec<u32>) -> Result<SessionOptions> {
    let mut options = SessionOptions::new(scenarios, profiles, ram);
    options.seed = cli.seed;
    options.export_dir = cli.export.clone();
    options.output_dir = cli.output.clone();
    options.resume = cli.resume.clone();
    options.rerun_failed = cli.rerun_failed;
    options.keep_exports = cli.keep_exports;
    options.config = BenchConfig::from_env()?;
    options.config.query_root = cli.queries.clone();
    options.validate()?;
    Ok(options)
}

fn parse_profiles(values: &[String]) -> Result<Vec<Profile>> {
    values
        .iter()
        .map(|p| p.parse::<Profile>().map_err(anyhow::Error::from))
        .collect()
}

fn options_from_args(cli: &Cli, scenarios: &str) -> Result<SessionOptions> {
    let scenarios = Scenario::parse_list(scenarios)?;
    if cli.ram.is_empty() {
        bail!("--ram is required");
    }
    if cli.profile.is_empty() {
        bail!("--profile is required");
    }
    base_options(cli, scenarios, parse_profiles(&cli.profile)?, cli.ram.clone())
}

fn prompt(label: &str, default: &str) -> Result<String> {
    eprint!("{} [{}]: ", label, default);
    std::io::stderr().flush()?;
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line)? == 0 {
        bail!("no input");
    }
    let value = line.trim();
    Ok(if value.is_empty() { default.to_string() } else { value.to_string() })
}

fn prompt_options(cli: &Cli) -> Result<SessionOptions> {
    println!("BOS Bench {}", bosbench::VERSION);
    let scenarios = Scenario::parse_list(&prompt("Scenario (P1, P2, M1, M2, O1, O2 or all)", "all")?)?;
    let profile = prompt("Profile", "small-2d")?;
    let ram = prompt("RAM cap in GB", "8")?;
    let export = prompt("Export directory", &cli.export.display().to_string())?;

    let profiles = parse_profiles(&profile.split(',').map(|s| s.trim().to_string()).collect::<Vec<_>>())?;
    let ram = ram
        .split(',')
        .map(|r| r.trim().parse::<u32>().with_context(|| format!("not a RAM size: {}", r)))
        .collect::<Result<Vec<_>>>()?;
    let mut options = base_options(cli, scenarios, profiles, ram)?;
    options.export_dir = PathBuf::from(export);
    Ok(options)
}

fn load_summary(session_dir: &Path, result_file: &str) -> Option<RunSummary> {
    let summary = result_file.replace("_full.json", "_summary.json");
    let bytes = std::fs::read(session_dir.join(summary)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn print_queries(summary: &RunSummary) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Query", "Name", "p50 (ms)", "p95 (ms)", "Mean (ms)", "Rows", "Errors"]);
    for q in &summary.queries {
        table.add_row(vec![
            q.query_id.clone(),
            q.name.clone(),
            format!("{:.2}", q.p50_ms),
            format!("{:.2}", q.p95_ms),
            format!("{:.2}", q.mean_ms),
            q.rows.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
            q.errors.to_string(),
        ]);
    }
    println!();
    println!("{}", summary.key.file_stem());
    println!("{}", table);
}

fn print_summary(report: &SessionReport) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Scenario", "Profile", "RAM", "Status", "Load (s)", "Peak MiB", "Global p95 (ms)", "Error"]);

    let mut completed = Vec::new();
    for run in &report.runs {
        let summary = run
            .result_file
            .as_deref()
            .and_then(|f| load_summary(&report.session_dir, f));
        let load = summary
            .as_ref()
            .and_then(|s| s.load_duration_ms)
            .map(|ms| format!("{:.1}", ms / 1000.0))
            .unwrap_or_default();
        let peak = summary
            .as_ref()
            .and_then(|s| s.peak_memory_bytes)
            .map(|b| format!("{:.0}", b as f64 / (1024.0 * 1024.0)))
            .unwrap_or_default();
        let p95 = match (&summary, run.status) {
            (Some(s), RunStatus::Completed) => format!("{:.2}", s.global_p95_ms),
            _ => String::new(),
        };
        let error = run
            .error
            .as_ref()
            .map(|e| format!("{}: {}", e.kind, e.message))
            .unwrap_or_default();
        table.add_row(vec![
            run.key.scenario.to_string(),
            run.key.profile.to_string(),
            format!("{} GB", run.key.ram_gb),
            run.status.as_str().to_string(),
            load,
            peak,
            p95,
            error,
        ]);
        if let Some(summary) = summary.filter(|s| !s.queries.is_empty()) {
            completed.push(summary);
        }
    }

    for summary in &completed {
        print_queries(summary);
    }
    println!();
    println!("Session {} ({})", report.session_id, report.session_dir.display());
    println!("{}", table);
}
