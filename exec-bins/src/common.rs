//! Common utilities shared by the demo binaries: CLI parsing, logging setup,
//! and performance-tuning knobs exposed by `exec_core::perf::cpu`.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// CLI arguments shared by every demo binary.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Portfolio starting cash balance.
    #[arg(long, default_value = "100000")]
    pub initial_capital: i64,

    /// Number of demo orders to submit before printing the summary.
    #[arg(short = 'n', long, default_value = "25")]
    pub order_count: usize,

    /// CPU core to pin the demo loop to (performance tuning, optional).
    #[arg(short = 'c', long)]
    pub cpu_core: Option<usize>,

    /// Enable real-time (SCHED_FIFO) scheduling priority (Linux, requires privileges).
    #[arg(long)]
    pub realtime: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Write a final engine snapshot to this path (for `exec-debug` to read).
    #[arg(long)]
    pub snapshot_out: Option<std::path::PathBuf>,
}

/// Initialize `tracing` with an env-filter layer, honoring `RUST_LOG` if set.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}

/// Pin the demo loop to a CPU core and/or raise its scheduling priority, if requested.
pub fn setup_performance(cpu_core: Option<usize>, realtime: bool) -> Result<()> {
    if let Some(core) = cpu_core {
        exec_core::perf::cpu::pin_to_core(core)?;
        tracing::info!(core, "pinned demo loop to CPU core");
    }

    #[cfg(target_os = "linux")]
    if realtime {
        exec_core::perf::cpu::set_realtime_priority(50)?;
        tracing::info!("enabled real-time scheduling priority");
    }

    #[cfg(not(target_os = "linux"))]
    if realtime {
        tracing::warn!("real-time priority only supported on Linux");
    }

    Ok(())
}

/// Pretty-print an execution/portfolio snapshot pair at the end of a run.
pub fn print_summary(
    execution: &exec_core::execution::ExecutionMetricsSnapshot,
    portfolio: &exec_core::portfolio::Portfolio,
) {
    tracing::info!("=== execution metrics ===");
    tracing::info!(
        submitted = execution.submitted,
        processed = execution.processed,
        rejected = execution.rejected,
        "orders"
    );
    tracing::info!(
        validation_failures = execution.validation_failures,
        engine_failures = execution.engine_failures,
        "failures"
    );
    tracing::info!(
        avg_processing_ns = execution.avg_processing_ns,
        p99_processing_ns = execution.p99_processing_ns,
        "latency"
    );

    tracing::info!("=== portfolio ===");
    let m = &portfolio.metrics;
    tracing::info!(cash = %portfolio.cash_balance, total_value = %m.total_value, "balances");
    tracing::info!(
        realized_pnl = %m.realized_pnl,
        unrealized_pnl = %m.unrealized_pnl,
        net_pnl = %m.net_pnl,
        "pnl"
    );
    tracing::info!(
        open_positions = m.total_positions,
        concentration_hhi = %m.concentration_risk,
        "positions"
    );
}
