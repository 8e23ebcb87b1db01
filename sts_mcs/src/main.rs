//! Delta debugging progress CLI
//!
//! Prints one row per subsequence that reproduced the violation: its
//! input count, the running MCS size, and which full-trace inputs it kept.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use sts_mcs::{depict, JsonTraceParser, ResultsLayout, ViolationMap};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Depict delta debugging progress towards the MCS
#[derive(Parser, Debug)]
#[command(name = "depict-mcs")]
#[command(about = "Show which inputs each reproducing subsequence kept", long_about = None)]
struct Args {
    /// JSON file mapping subsequence index to whether it triggered a violation
    #[arg(short = 's', long = "subsequence-violations")]
    subsequence_violations: PathBuf,

    /// Top-level MCS experiment results directory
    #[arg(short, long)]
    directory: PathBuf,

    /// JSON output instead of a table
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Warnings go to stderr; stdout carries only the report
    let builder = FmtSubscriber::builder().with_writer(std::io::stderr);
    if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(
            builder.with_env_filter(EnvFilter::from_default_env()).finish(),
        )
        .context("Failed to set tracing subscriber")?;
    } else {
        let level = if args.verbose { Level::DEBUG } else { Level::WARN };
        tracing::subscriber::set_global_default(builder.with_max_level(level).finish())
            .context("Failed to set tracing subscriber")?;
    }

    let violations = ViolationMap::load(&args.subsequence_violations).with_context(|| {
        format!(
            "Failed to load violation map {}",
            args.subsequence_violations.display()
        )
    })?;
    let layout = ResultsLayout::discover(&args.directory)
        .with_context(|| format!("Failed to scan {}", args.directory.display()))?;

    let report = depict(&layout, &violations, &JsonTraceParser)?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_table());
    }
    Ok(())
}
