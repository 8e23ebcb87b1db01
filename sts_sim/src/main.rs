//! STS harness CLI
//!
//! Boots the configured controllers against a simulated topology, pumps
//! the IO loop for a stretch of logical time, and tears everything down.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use sts_sim::{SimClock, Simulation, SimulationConfig};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// STS deterministic controller test harness
#[derive(Parser, Debug)]
#[command(name = "sts-sim")]
#[command(about = "Bootstrap controllers against a simulated network", long_about = None)]
struct Args {
    /// JSON simulation config (defaults to a 2-switch mesh, no controllers)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logical seconds to pump the IO loop after each bootstrap
    #[arg(short, long, default_value = "1.0")]
    run_for: f64,

    /// Number of bootstrap/clean_up cycles
    #[arg(short, long, default_value = "1")]
    bootstraps: u32,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON summary on stdout
    #[arg(long)]
    json: bool,
}

/// What one bootstrap cycle produced.
#[derive(Debug, serde::Serialize)]
struct RunSummary {
    run: u64,
    controllers: usize,
    switches: usize,
    connections: usize,
    dataplane_events: usize,
    logical_time_ms: u128,
}

fn init_logging(verbose: bool) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to set tracing subscriber")?;
    } else {
        let level = if verbose { Level::DEBUG } else { Level::INFO };
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to set tracing subscriber")?;
    }
    Ok(())
}

fn run_once(sim: &mut Simulation, duration: Duration) -> Result<RunSummary> {
    sim.bootstrap().context("Bootstrap failed")?;

    let mut dataplane_events = 0;
    while sim.inject_next_dataplane_event()? {
        dataplane_events += 1;
    }
    sim.run_for(duration)?;

    let topology = sim.topology().context("Topology missing after bootstrap")?;
    let now = sim.clock().map(|clock| clock.now()).unwrap_or_default();
    Ok(RunSummary {
        run: sim.bootstrap_count(),
        controllers: sim.controller_manager().map_or(0, |m| m.len()),
        switches: topology.switches.len(),
        connections: topology.connection_count(),
        dataplane_events,
        logical_time_ms: now.as_millis(),
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    let duration = Duration::try_from_secs_f64(args.run_for)
        .context("--run-for must be a non-negative number of seconds")?;

    if !args.json {
        info!("STS harness v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let mut sim = Simulation::new(config);
    let mut summaries = Vec::new();
    for _ in 0..args.bootstraps {
        match run_once(&mut sim, duration) {
            Ok(summary) => {
                if !args.json {
                    info!(
                        "✓ run #{}: {} controllers, {} switches, {} connections, {} dataplane events, t={}ms",
                        summary.run,
                        summary.controllers,
                        summary.switches,
                        summary.connections,
                        summary.dataplane_events,
                        summary.logical_time_ms
                    );
                }
                summaries.push(summary);
            }
            Err(e) => {
                error!("✗ run #{} failed: {:#}", sim.bootstrap_count(), e);
                sim.clean_up();
                return Err(e);
            }
        }
    }
    sim.clean_up();

    if args.json {
        let summary = serde_json::json!({
            "bootstraps": summaries.len(),
            "runs": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("✅ {} bootstrap cycles completed", summaries.len());
    }
    Ok(())
}
