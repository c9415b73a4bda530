//! # fsracer
//!
//! Offline file-system data-race analyzer: reads a textual trace, infers a
//! happens-before ordering between tasks, replays each process's file-system
//! effects, and reports conflicting task pairs with no ordering between
//! them.
//!
//! ```text
//! fsracer TRACE.txt --dep-graph-format dot --fs-format json
//! ```

mod output;
mod parser;

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use fsracer_core::driver::Driver;
use fsracer_core::graph::GraphFormat;
use tracing::info;

use output::{dep_graph::DependencyGraphPrinter, fs_access, race_report};
use parser::TraceParser;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DepGraphFormat {
    Dot,
    Csv,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FsFormat {
    Json,
    Csv,
}

/// Command-line surface: where the trace lives, and where/how to render
/// the two report artifacts. Matches `builder`'s and `xtask`'s
/// "configuration via subcommand flags" style — there is no persisted
/// config file for a tool this size.
#[derive(Debug, Parser)]
#[command(name = "fsracer", version, about = "Offline file-system data-race analyzer")]
struct Cli {
    /// Path to the textual trace file to analyze.
    trace: PathBuf,

    /// Output format for the dependency graph.
    #[arg(long, value_enum, default_value_t = DepGraphFormat::Dot)]
    dep_graph_format: DepGraphFormat,

    /// Where to write the dependency graph (stdout if omitted).
    #[arg(long)]
    dep_graph_out: Option<PathBuf>,

    /// Output format for the per-(path, task) FS access table.
    #[arg(long, value_enum, default_value_t = FsFormat::Json)]
    fs_format: FsFormat,

    /// Where to write the FS access table (stdout if omitted).
    #[arg(long)]
    fs_out: Option<PathBuf>,

    /// Where to write the race report (stdout if omitted).
    #[arg(long)]
    race_report_out: Option<PathBuf>,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn write_output(path: Option<&PathBuf>, content: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{content}");
            Ok(())
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let contents = fs::read_to_string(&cli.trace)
        .with_context(|| format!("failed to read trace file {}", cli.trace.display()))?;

    let mut parser = TraceParser::new();
    let mut driver = Driver::new();

    let analyze_start = Instant::now();
    for (idx, line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(record) = parser.parse_line(line, line_no)? {
            driver.observe(&record)?;
        }
    }
    let analyze_elapsed = analyze_start.elapsed();

    let detect_start = Instant::now();
    let faults = driver.detect();
    let detect_elapsed = detect_start.elapsed();

    let dep_format = match cli.dep_graph_format {
        DepGraphFormat::Dot => GraphFormat::Dot,
        DepGraphFormat::Csv => GraphFormat::Csv,
    };
    let dep_text = driver
        .dependency()
        .graph()
        .print(dep_format, &DependencyGraphPrinter);
    write_output(cli.dep_graph_out.as_ref(), &dep_text)?;

    let fs_text = match cli.fs_format {
        FsFormat::Json => fs_access::to_json(driver.fs())?,
        FsFormat::Csv => fs_access::to_csv(driver.fs()),
    };
    write_output(cli.fs_out.as_ref(), &fs_text)?;

    let report = race_report::render(&faults);
    match cli.race_report_out.as_ref() {
        Some(path) => fs::write(path, &report)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{report}"),
    }

    let mut summary = String::new();
    let _ = write!(
        summary,
        "analysis: {:.3}ms, detection: {:.3}ms",
        analyze_elapsed.as_secs_f64() * 1000.0,
        detect_elapsed.as_secs_f64() * 1000.0
    );
    info!("{summary}");

    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
