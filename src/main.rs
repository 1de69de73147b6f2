//! Pourwatch - Concrete Pour Quality Monitor
//!
//! Runs the monitoring engine over a plant's block/lift grid, either as a
//! self-driving demo or as a JSON-lines command processor.
//!
//! # Usage
//!
//! ```bash
//! # Demo run: auto-advance through the grid with simulated readings
//! cargo run --release
//!
//! # Reproducible demo with a custom catalog
//! ./pourwatch --seed 42 --rules data/rules.json
//!
//! # Drive the engine from JSON commands, one per line
//! echo '{"command":"selectUnit","cellId":"B01-L01"}' | ./pourwatch --stdin
//! ```
//!
//! # Environment Variables
//!
//! - `POURWATCH_CONFIG`: Plant TOML config tried before ./pourwatch.toml when
//!   `--config` is not given. A missing or broken file falls back with a warning.
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pourwatch::catalog::{FileCatalogSource, RuleCatalog};
use pourwatch::config::{self, PlantConfig};
use pourwatch::engine::{Engine, EngineActor, EngineHandle, EngineSettings, OperatorCommand, SystemClock};
use pourwatch::lineage::readings::RandomReadings;
use pourwatch::lineage::ReferenceTables;
use pourwatch::types::{CellStatus, EngineSnapshot, FlowState};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "pourwatch")]
#[command(about = "Rule-driven quality monitoring for concrete pours")]
#[command(version)]
struct CliArgs {
    /// Path to the plant TOML config (must load; without it the
    /// POURWATCH_CONFIG / ./pourwatch.toml search falls back to defaults)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to a JSON rule catalog (overrides [catalog].path)
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Seed for simulated readings (overrides [simulation].seed)
    #[arg(long)]
    seed: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Read JSON operator commands from stdin and print snapshots as JSON lines
    #[arg(long)]
    stdin: bool,
}

// ============================================================================
// Startup
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PlantConfig> {
    match path {
        Some(path) => PlantConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(PlantConfig::load()),
    }
}

fn build_engine(config: &PlantConfig, args: &CliArgs) -> Result<Engine> {
    let now = chrono::Utc::now();

    let catalog = match args.rules.as_ref().or(config.catalog.path.as_ref()) {
        Some(path) => {
            info!(path = %path.display(), "Using rule catalog file");
            RuleCatalog::new(FileCatalogSource::new(path))
        }
        None => {
            info!("Using built-in rule catalog");
            RuleCatalog::builtin()
        }
    };

    let tables = match config.lineage.reference_path.as_ref() {
        Some(path) => ReferenceTables::load_from_file(path)
            .with_context(|| format!("Failed to load reference tables from {}", path.display()))?,
        None => ReferenceTables::builtin(now),
    };

    let seed = args.seed.or(config.simulation.seed);
    if let Some(seed) = seed {
        info!(seed, "Simulated readings are reproducible");
    }

    Ok(Engine::new(
        EngineSettings::from_config(config),
        Arc::new(catalog),
        tables,
        Box::new(RandomReadings::new(seed)),
        Arc::new(SystemClock),
    ))
}

// ============================================================================
// Stdin Mode
// ============================================================================

/// Apply one JSON command per input line; write one JSON line per result.
async fn run_stdin(handle: EngineHandle, cancel_token: CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = cancel_token.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<OperatorCommand>(&line) {
            Ok(command) => match handle.execute(command).await {
                Ok(snapshot) => serde_json::to_string(&snapshot)?,
                Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
            },
            Err(e) => {
                warn!(error = %e, "Unparseable command line");
                serde_json::json!({ "error": format!("invalid command: {e}") }).to_string()
            }
        };

        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

// ============================================================================
// Demo Mode
// ============================================================================

fn next_pending(snapshot: &EngineSnapshot) -> Option<String> {
    snapshot
        .cells
        .iter()
        .find(|c| c.status == CellStatus::Pending)
        .map(|c| c.id.clone())
}

fn grid_exhausted(snapshot: &EngineSnapshot) -> bool {
    snapshot.cells.iter().all(|c| c.status.is_terminal())
}

/// Auto-advance through the grid; reject alarmed units and move on.
async fn run_demo(handle: EngineHandle, cancel_token: CancellationToken) -> Result<()> {
    let mut snapshots = handle.subscribe();
    handle.toggle_auto_advance(true).await?;

    let first = next_pending(&snapshots.borrow()).context("Grid has no pending cells")?;
    handle.select_unit(&first).await?;

    loop {
        let snapshot = snapshots.borrow_and_update().clone();

        if snapshot.banner.state == FlowState::Alert {
            info!(
                cell = snapshot.active_cell_id.as_deref().unwrap_or("-"),
                rule = snapshot.banner.headline_rule_id.as_deref().unwrap_or("-"),
                "{}",
                snapshot.banner.message
            );
            let rejected = handle.reject().await?;
            if let Some(next) = next_pending(&rejected) {
                handle.select_unit(&next).await?;
            }
            continue;
        }

        if grid_exhausted(&snapshot) {
            let approved = snapshot.cells.iter().filter(|c| c.status == CellStatus::Approved).count();
            info!(
                approved,
                rejected = snapshot.cells.len() - approved,
                impacts = snapshot.impact_count(),
                "Grid complete"
            );
            break;
        }

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.json_logs);

    let plant_config = load_config(args.config.as_ref())?;
    info!(
        "Plant: {} | Grid: {} blocks × {} lifts | Dwell: {:.1}s",
        plant_config.plant.name,
        plant_config.plant.blocks,
        plant_config.plant.lifts,
        plant_config.lifecycle.dwell_secs
    );
    config::init(plant_config);

    let engine = build_engine(config::get(), &args)?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let (handle, actor) = EngineActor::spawn(engine, cancel_token.clone())
        .await
        .context("Failed to start engine")?;

    if args.stdin {
        info!("Input: stdin (JSON operator commands)");
        run_stdin(handle, cancel_token.clone()).await?;
    } else {
        info!("Input: demo operator with simulated readings");
        run_demo(handle, cancel_token.clone()).await?;
    }

    cancel_token.cancel();
    actor.await.context("Engine actor panicked")?;
    info!("Pourwatch shutdown complete");
    Ok(())
}
