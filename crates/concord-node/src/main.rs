//! concord-node — the protocol hardening CLI and a small demo cell.
//!
//! There is no peer-to-peer layer or RPC server here: a mutual-credit cell
//! is a governance object shared by its members, not a gossiping chain
//! node, so those concerns (along with a DAG tip set, a wallet, and a PoW
//! difficulty schedule) simply have no counterpart in this protocol. What
//! remains from the node-binary shape is the startup sequence — open or
//! seed a data directory, wire the engines, run — applied here to the
//! harness and to the demo cell.

mod bootstrap;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use concord_hardening::adversarial::Scenario;
use concord_hardening::{adversarial, health, run_invariant, run_simulation, Invariant, SimulationConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "concord-node", version, about = "Concord cell node and protocol hardening harness")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the randomized/adversarial hardening harness.
    Harden {
        #[command(subcommand)]
        action: HardenAction,
    },
    /// Open (or reopen) a demo cell under a data directory and report its state.
    Demo {
        /// Directory for the demo cell's persistent state.
        #[arg(long, default_value = "~/.concord/demo")]
        data_dir: PathBuf,
        /// Members to seed on a fresh cell.
        #[arg(long, default_value_t = 6)]
        members: usize,
    },
}

#[derive(Subcommand, Debug)]
enum HardenAction {
    /// Check the six ledger invariants over randomly generated intent streams.
    Invariants {
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value_t = 500)]
        iterations: u32,
        #[arg(long, default_value_t = 50)]
        max_operations: u32,
    },
    /// Run one tick-based population simulation.
    Simulate {
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value_t = 120)]
        ticks: u32,
        #[arg(long, default_value_t = 20)]
        members: usize,
    },
    /// Run the seven fixed adversarial scenarios.
    Adversarial {
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value_t = 20)]
        members: usize,
    },
    /// Run the full weighted health check (invariants + simulation + adversarial).
    Health {
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value_t = 500)]
        iterations: u32,
        #[arg(long, default_value_t = 20)]
        members: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,concord=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Harden { action } => run_harden(action),
        Command::Demo { data_dir, members } => run_demo(&data_dir, members),
    }
}

fn run_harden(action: HardenAction) -> anyhow::Result<()> {
    match action {
        HardenAction::Invariants { seed, iterations, max_operations } => {
            info!(seed, iterations, max_operations, "running invariant checks");
            let mut reports = Vec::new();
            for invariant in Invariant::all() {
                let report = run_invariant(invariant, seed, iterations, max_operations)?;
                if !report.passed() {
                    tracing::error!(invariant = invariant.name(), violations = report.violations.len(), "invariant violated");
                }
                reports.push(report);
            }
            println!("{}", serde_json::to_string_pretty(&reports)?);
            if reports.iter().any(|r| !r.passed()) {
                anyhow::bail!("one or more invariants were violated");
            }
            Ok(())
        }
        HardenAction::Simulate { seed, ticks, members } => {
            info!(seed, ticks, members, "running population simulation");
            let report = run_simulation("cli-simulation", seed, SimulationConfig::balanced(members, ticks))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.invariant_violations.is_empty() {
                anyhow::bail!("simulation observed invariant violations");
            }
            Ok(())
        }
        HardenAction::Adversarial { seed, members } => {
            info!(seed, members, "running adversarial scenarios");
            let results = adversarial::run_all(seed, members)?;
            for result in &results {
                let scenario: Scenario = result.scenario;
                if !result.passed() {
                    tracing::error!(scenario = scenario.id(), failure = ?result.failure, "scenario failed");
                }
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
            if results.iter().any(|r| !r.passed()) {
                anyhow::bail!("one or more adversarial scenarios failed");
            }
            Ok(())
        }
        HardenAction::Health { seed, iterations, members } => {
            info!(seed, iterations, members, "running full health check");
            let report = health::run_health_check(seed, iterations, members)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.passed() {
                anyhow::bail!("health score {} below pass threshold", report.composite);
            }
            Ok(())
        }
    }
}

fn run_demo(data_dir: &PathBuf, members: usize) -> anyhow::Result<()> {
    let data_dir = expand_tilde(data_dir);
    let demo = bootstrap::open(&data_dir, members)?;
    info!(cell = %demo.cell_id, remote = %demo.remote_cell, members = demo.members.len(), "demo cell ready");

    let stats = demo.ledger.statistics()?;
    info!(
        balance_sum = stats.balance_sum,
        aggregate_capacity = stats.aggregate_capacity,
        floor_mass = stats.floor_mass,
        "ledger statistics"
    );

    let now = chrono::Utc::now().timestamp_millis();
    demo.tick_emergency(0.0, 0.0, now)?;
    info!(risk_state = ?demo.emergency.risk_state(), "emergency baseline");

    if !demo.ledger.verify_conservation()? {
        anyhow::bail!("demo cell balance_sum != 0 on open");
    }
    Ok(())
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.clone()
}
