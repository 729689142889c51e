/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};

use cadenza::command::Command;
use cadenza::config::RuntimeConfig;
use cadenza::executor::PeriodicExecutor;
use cadenza::scheduler::CommandScheduler;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Cadenza diagnostic runner.
///
/// Spins up the periodic executor and the command scheduler, runs one
/// heartbeat command to completion, and shuts down.  Useful for verifying
/// timing behaviour of a wait strategy on target hardware.
///
/// Example:
///   cadenza --config examples/runtime.yaml --ticks 100
#[derive(Debug, Parser)]
#[command(
    name = "cadenza",
    about = "Cadenza periodic command scheduler – diagnostic runner",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML runtime configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Override the tick period from the configuration file, in milliseconds.
    #[arg(short = 'p', long = "period-ms")]
    period_ms: Option<u64>,

    /// Number of heartbeat ticks to run before shutting down.
    #[arg(short = 't', long = "ticks", default_value_t = 50)]
    ticks: u32,
}

// ── Demo command ──────────────────────────────────────────────────────────────

/// Counts its own executions and finishes after a fixed number of ticks.
struct Heartbeat {
    remaining: u32,
}

impl Command for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }
    fn execute(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining % 10 == 0 {
            info!(remaining = self.remaining, "heartbeat");
        }
        self.remaining == 0
    }
    fn end(&mut self) {
        info!("heartbeat finished");
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // ── Load runtime configuration ────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => match RuntimeConfig::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("failed to load runtime configuration: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            warn!("no configuration file provided, using defaults");
            RuntimeConfig::default()
        }
    };
    if let Some(ms) = cli.period_ms {
        config = config.with_period(Duration::from_millis(ms));
    }

    info!(
        period_ms = config.period().as_millis() as u64,
        strategy = ?config.strategy(),
        ticks = cli.ticks,
        "Configuration"
    );

    // ── Wire up the engine ────────────────────────────────────────────────────
    let executor = match PeriodicExecutor::start(config.period(), config.strategy()) {
        Ok(exec) => exec,
        Err(e) => {
            error!("failed to start executor thread: {e}");
            process::exit(1);
        }
    };
    let scheduler = CommandScheduler::new();
    executor.register(Box::new(scheduler.clone()));

    if let Err(e) = scheduler.submit(Heartbeat {
        remaining: cli.ticks,
    }) {
        error!("failed to submit heartbeat: {e}");
        process::exit(1);
    }

    // ── Run until the heartbeat completes ─────────────────────────────────────
    let budget = config.period() * (cli.ticks + 50);
    let deadline = Instant::now() + budget;
    while !scheduler.is_empty() {
        if Instant::now() > deadline {
            warn!("heartbeat did not finish within its budget; shutting down anyway");
            scheduler.kill_all();
            break;
        }
        std::thread::sleep(config.period());
    }

    executor.unregister_all();
    executor.shutdown();
    info!("cadenza stopped");
}
