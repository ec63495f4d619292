//! Paper-trading demo: wires every core component together against the
//! crate's in-memory fakes — no venue connection, no persistence backend —
//! and prints the resulting metrics.
//!
//! The pipeline mirrors the reference architecture's data flow: an order is
//! tracked by the Order Lifecycle Manager *and* admitted through the
//! Execution Service; fills the (fake) engine returns are routed by the
//! Execution Integration layer to both the OMS (status/avg-price) and the
//! Portfolio (position, cash, P&L).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Parser;

use exec_bins::common::{init_logging, print_summary, setup_performance, CommonArgs};
use exec_core::asset::{Asset, AssetType};
use exec_core::decimal::Decimal;
use exec_core::execution::{ExecutionConfig, ExecutionService};
use exec_core::integration::{ExecutionIntegration, IntegrationConfig};
use exec_core::oms::{OmsConfig, OrderManager};
use exec_core::order::{Order, OrderStatus, OrderType, Side};
use exec_core::portfolio::Portfolio;
use exec_core::resilience::{install_panic_handler, KillSwitch};
use exec_core::testing::{FakeExecutionEngine, InMemoryPortfolioRepository, RecordingEventHandler, RiskCapValidator, StaticAssetRegistry};

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as i64
}

fn main() -> Result<()> {
    let args = CommonArgs::parse();
    init_logging(&args.log_level)?;
    setup_performance(args.cpu_core, args.realtime)?;
    install_panic_handler();
    let kill_switch = KillSwitch::install();

    tracing::info!("=== exec-core paper trading demo ===");

    let aapl = Asset::builder("AAPL", AssetType::Stock)
        .tick_size(Decimal::new(1, 2))
        .build()?;

    let registry = StaticAssetRegistry::new();
    registry.register(aapl.clone());
    let asset_lookup = Arc::new(registry);

    let repository = Arc::new(InMemoryPortfolioRepository::new());
    let portfolio = Portfolio::new("demo", "Demo Portfolio", Decimal::from_i64(args.initial_capital), now())?;
    repository.save(&portfolio)?;

    let oms = Arc::new(OrderManager::new(OmsConfig::default()));
    let event_handler = Arc::new(RecordingEventHandler::new());
    let integration = Arc::new(ExecutionIntegration::new(
        Arc::clone(&oms),
        Arc::clone(&repository),
        asset_lookup,
        event_handler,
        IntegrationConfig::default(),
    ));

    let engine = Arc::new(FakeExecutionEngine::new());
    let validator = Arc::new(RiskCapValidator {
        max_position_weight_pct: Decimal::from_i64(25),
    });
    let service = ExecutionService::new(ExecutionConfig::default(), engine, Some(validator));
    service.start()?;

    let mut price = Decimal::from_i64(150);
    for i in 0..args.order_count {
        if kill_switch.should_stop() {
            tracing::warn!("kill switch engaged, stopping demo loop early");
            break;
        }
        let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
        let order = Order::builder(aapl.clone(), side, OrderType::Limit, Decimal::from_i64(10))
            .price(price)
            .build()?;
        let order_id = order.id;

        oms.submit(order.clone())?;
        oms.update_status(order_id, OrderStatus::Submitted, now())?;
        integration.register_order(order_id, "demo", "AAPL", side);

        match service.submit(order) {
            Ok(result) => {
                for fill in &result.fills {
                    let routed = integration.route_fill(fill)?;
                    integration.submit_fill(routed)?;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, order_id = %order_id, "order rejected");
                oms.process_reject(order_id, err.to_string())?;
            }
        }

        // Small deterministic walk so repeated fills aren't all at one price.
        price = price + Decimal::new(if i % 2 == 0 { 5 } else { -5 }, 2);
    }

    service.stop()?;

    let final_portfolio = repository.find_by_id("demo")?.expect("demo portfolio was saved above");
    let metrics = service.metrics_snapshot();
    print_summary(&metrics, &final_portfolio);
    tracing::info!(filled = oms.get_by_status(OrderStatus::Filled).len(), "orders reached Filled");

    if let Some(path) = &args.snapshot_out {
        let snapshot = exec_core::diagnostics::EngineSnapshot::new(now(), metrics, final_portfolio);
        snapshot.write_to(path)?;
        tracing::info!(path = %path.display(), "wrote engine snapshot");
    }

    Ok(())
}
