//! Lens Analytics - scheduled refresh and analytics for one instrument.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lens_analytics::data::RefreshOutcome;
use lens_analytics::LensState;
use lens_common::logging::init_from_config;
use lens_common::Config;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "lens-analytics")]
#[command(version)]
#[command(about = "Equity analytics for a single instrument.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the refresh scheduler until Ctrl-C
    Daemon,
    /// Run one refresh cycle now
    Refresh,
    /// Print every engine's output for the current snapshot as JSON
    Report {
        /// Compact JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },
    /// Show recent refresh history
    Status {
        /// Number of ledger entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Start timing immediately for cold-start measurement
    let startup_start = std::time::Instant::now();

    let cli = Cli::parse();

    let config = Config::load_and_validate()?;
    init_from_config(&config.observability);

    tracing::info!("Lens Analytics v{}", env!("CARGO_PKG_VERSION"));

    let state = LensState::new(config)?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    match cli.command {
        Commands::Daemon => run_daemon(&state).await,
        Commands::Refresh => {
            let outcome = state.daemon()?.trigger().await;
            print_json(&outcome, false)?;
            match outcome {
                RefreshOutcome::Completed(report) if report.failed().next().is_some() => {
                    anyhow::bail!("{} table(s) failed to refresh", report.failed().count())
                }
                _ => Ok(()),
            }
        }
        Commands::Report { compact } => {
            let report = state.report().await?;
            print_json(&report, compact)
        }
        Commands::Status { limit } => {
            let history = state.status(limit).await?;
            if history.is_empty() {
                println!("No refreshes recorded yet.");
                return Ok(());
            }
            for record in history {
                println!(
                    "{}  {:<18} {:<8} rows={:<6} {}",
                    record.finished_at.format("%Y-%m-%d %H:%M:%S"),
                    record.table_key,
                    record.status,
                    record.rows,
                    record.error.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
    }
}

async fn run_daemon(state: &LensState) -> Result<()> {
    let daemon = Arc::new(state.daemon()?);

    if let Some(next) = daemon.next_run() {
        tracing::info!(next_run = %next, "Next scheduled refresh");
    }

    let runner = Arc::clone(&daemon);
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown signal received");

    daemon.shutdown();
    handle.await.context("Refresh daemon task panicked")??;

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", text);
    Ok(())
}
