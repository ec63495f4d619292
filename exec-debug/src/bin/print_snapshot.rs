//! Pretty-print an engine snapshot written by a demo binary's
//! `--snapshot-out`.
//!
//! ```bash
//! print-snapshot --path snapshot.json
//! ```

use anyhow::Result;
use clap::Parser;
use exec_core::diagnostics::EngineSnapshot;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the JSON snapshot file.
    #[arg(long)]
    path: std::path::PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let snapshot = EngineSnapshot::read_from(&args.path)?;

    println!("engine snapshot taken_at={}", snapshot.taken_at);
    println!();
    println!("== execution metrics ==");
    let e = &snapshot.execution;
    println!("  submitted={} processed={} rejected={}", e.submitted, e.processed, e.rejected);
    println!("  validation_failures={} engine_failures={}", e.validation_failures, e.engine_failures);
    println!("  avg_processing_ns={} p99_processing_ns={}", e.avg_processing_ns, e.p99_processing_ns);
    println!("  throughput_per_sec={} active_count={}", e.throughput_per_sec, e.active_count);

    println!();
    println!("== portfolio {} ({}) ==", snapshot.portfolio.id, snapshot.portfolio.name);
    let p = &snapshot.portfolio;
    let m = &p.metrics;
    println!("  cash_balance={} total_value={}", p.cash_balance, m.total_value);
    println!(
        "  realized_pnl={} unrealized_pnl={} net_pnl={}",
        m.realized_pnl, m.unrealized_pnl, m.net_pnl
    );
    println!(
        "  positions: total={} long={} short={} profitable={} losing={}",
        m.total_positions, m.long_positions, m.short_positions, m.profitable_positions, m.losing_positions
    );
    println!(
        "  drawdown: current={} max={} max_pct={}",
        m.current_drawdown, m.max_drawdown, m.max_drawdown_pct
    );

    println!();
    println!("== open positions ==");
    for position in p.positions().filter(|pos| pos.is_open()) {
        println!(
            "  {:<10} side={:?} qty={} avg_entry={} unrealized_pnl={}",
            position.asset.symbol, position.side, position.quantity, position.avg_entry_price, position.unrealized_pnl
        );
    }

    Ok(())
}
