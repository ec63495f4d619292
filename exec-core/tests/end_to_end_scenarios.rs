//! End-to-end scenarios wiring multiple components together, one test per
//! scenario. Unit tests colocated with each module already cover individual
//! operations in isolation; these exercise the same numbers the way a
//! caller actually would — OMS + Execution Service + Integration + Portfolio
//! together, not each component's internals alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

use exec_core::asset::{Asset, AssetType};
use exec_core::decimal::Decimal;
use exec_core::execution::{ExecutionConfig, ExecutionService};
use exec_core::oms::{OmsConfig, OrderManager};
use exec_core::order::{Order, OrderFill, OrderStatus, OrderType, Side};
use exec_core::portfolio::{Portfolio, RebalanceAction};
use exec_core::position::{PositionSide, PositionStatus, Transaction, TransactionType};
use exec_core::ports::{ExecutionEngine, MarketData, OrderValidator};
use exec_core::resilience::circuit_breaker::CircuitBreakerConfig;
use exec_core::resilience::retry::RetryConfig;
use exec_core::slippage::{SlippageConfig, SlippageEstimator};
use exec_core::testing::{FakeExecutionEngine, RiskCapValidator};
use exec_core::CoreError;

fn d(v: i64) -> Decimal {
    Decimal::from_i64(v)
}

/// Scenario 1: average fill price across two partial fills.
/// Buy 100 @ limit 150.00; Fill1 50 @ 150.00, Fill2 50 @ 150.10.
/// Expect avg_fill_price == 150.05, filled_qty == 100, status Filled.
#[test]
fn average_fill_price_across_two_partial_fills() -> Result<()> {
    let asset = Asset::builder("AAPL", AssetType::Stock).build()?;
    let oms = OrderManager::new(OmsConfig::default());

    let order = Order::builder(asset, Side::Buy, OrderType::Limit, d(100)).price(d(150)).build()?;
    let order_id = order.id;
    oms.submit(order)?;
    oms.update_status(order_id, OrderStatus::Submitted, 1)?;

    oms.process_fill(OrderFill {
        id: 1,
        order_id,
        price: d(150),
        quantity: d(50),
        fee: Decimal::ZERO,
        timestamp: 2,
    })?;
    oms.process_fill(OrderFill {
        id: 2,
        order_id,
        price: Decimal::new(15010, 2),
        quantity: d(50),
        fee: Decimal::ZERO,
        timestamp: 3,
    })?;

    let order = oms.get(order_id).expect("order still tracked");
    assert_eq!(order.avg_fill_price, Decimal::new(15005, 2));
    assert_eq!(order.filled_qty, d(100));
    assert_eq!(order.status, OrderStatus::Filled);
    Ok(())
}

/// Scenario 2: short position profit. Open Short via SELL 100 @ 150.00;
/// mark to 140.00 -> unrealized_pnl == 1000.00. Cover with BUY 100 @ 140.00,
/// fee 1.00 -> realized_pnl == 999.00, status Closed.
#[test]
fn short_position_profit_and_cover() -> Result<()> {
    let asset = Asset::builder("AAPL", AssetType::Stock).build()?;
    let mut portfolio = Portfolio::new("p1", "Main", d(1_000_000), 0)?;

    let open_tx = Transaction {
        transaction_type: TransactionType::Sell,
        quantity: d(100),
        price: d(150),
        fee: Decimal::ZERO,
    };
    portfolio.open_position(asset, open_tx, 0)?;

    let position = portfolio.position_by_symbol("AAPL").expect("position opened");
    assert_eq!(position.side, PositionSide::Short);

    portfolio.update_position_price("AAPL", d(140), 1)?;
    let position = portfolio.position_by_symbol("AAPL").unwrap();
    assert_eq!(position.unrealized_pnl, d(1_000));

    let cover_tx = Transaction {
        transaction_type: TransactionType::Buy,
        quantity: d(100),
        price: d(140),
        fee: d(1),
    };
    portfolio.add_transaction("AAPL", cover_tx, 2)?;

    let position = portfolio.position_by_symbol("AAPL").unwrap();
    assert_eq!(position.realized_pnl, d(999));
    assert_eq!(position.status, PositionStatus::Closed);
    Ok(())
}

/// Scenario 3: rebalance planner. Portfolio value 165,000 (cash 100,000;
/// AAPL 100x150; GOOGL 20x2500). Target {AAPL:20, GOOGL:30, MSFT:50}.
/// AAPL/MSFT are BUY; GOOGL's 30.30 vs 30.00 target is within 0.5pp so it
/// produces no instruction.
#[test]
fn rebalance_planner_sorts_by_value_diff_and_skips_within_threshold() -> Result<()> {
    let aapl = Asset::builder("AAPL", AssetType::Stock).build()?;
    let googl = Asset::builder("GOOGL", AssetType::Stock).build()?;
    let mut portfolio = Portfolio::new("p1", "Main", d(100_000), 0)?;

    portfolio.open_position(
        aapl,
        Transaction { transaction_type: TransactionType::Buy, quantity: d(100), price: d(150), fee: Decimal::ZERO },
        0,
    )?;
    portfolio.open_position(
        googl,
        Transaction { transaction_type: TransactionType::Buy, quantity: d(20), price: d(2500), fee: Decimal::ZERO },
        0,
    )?;

    assert_eq!(portfolio.metrics.total_value, d(165_000));

    let mut targets = BTreeMap::new();
    targets.insert("AAPL".to_string(), d(20));
    targets.insert("GOOGL".to_string(), d(30));
    targets.insert("MSFT".to_string(), d(50));

    let instructions = portfolio.rebalance(&targets)?;
    assert_eq!(instructions.len(), 2, "GOOGL should fall within the no-action threshold");
    assert!(instructions[0].value_diff.abs() >= instructions[1].value_diff.abs());

    let symbols: Vec<&str> = instructions.iter().map(|i| i.symbol.as_str()).collect();
    assert!(!symbols.contains(&"GOOGL"));
    for instruction in &instructions {
        assert_eq!(instruction.action, RebalanceAction::Buy);
    }
    Ok(())
}

/// Scenario 4: risk-cap rejection. Portfolio cash 100,000; a BUY of
/// quantity=1000 @ price=500 (notional 500,000) breaches a 10% position
/// weight cap. The validator must reject it without the engine ever
/// being consulted.
#[test]
fn risk_cap_rejects_before_engine_is_called() -> Result<()> {
    let asset = Asset::builder("AAPL", AssetType::Stock).build()?;
    let portfolio = Portfolio::new("p1", "Main", d(100_000), 0)?;

    let validator = RiskCapValidator { max_position_weight_pct: d(10) };
    let order = Order::builder(asset, Side::Buy, OrderType::Limit, d(1_000)).price(d(500)).build()?;

    let result = validator.validate_risk(&order, &portfolio);
    assert!(matches!(result, Err(CoreError::Validation(_))));

    let engine = FakeExecutionEngine::new();
    assert!(engine.get_history(order.id)?.is_empty(), "engine must never see a rejected order");
    Ok(())
}

/// Scenario 5: slippage on a market buy against a two-sided snapshot with
/// moderate size relative to displayed liquidity. Expect a positive result
/// within the default config's bounds.
#[test]
fn slippage_estimate_on_market_buy_is_bounded() -> Result<()> {
    let asset = Asset::builder("AAPL", AssetType::Stock).build()?;
    let order = Order::builder(asset, Side::Buy, OrderType::Market, d(500)).build()?;

    let market = MarketData {
        bid_price: d(150),
        ask_price: Decimal::new(15005, 2),
        bid_size: d(1_000),
        ask_size: d(800),
        last_trade_price: Decimal::new(15002, 2),
        last_trade_size: d(100),
        volume: d(100_000),
        vwap: Decimal::new(15001, 2),
        volatility: Decimal::ZERO,
        timestamp: 1_000,
    };

    let estimator = SlippageEstimator::new(SlippageConfig::default());
    let bps = estimator.estimate(&order, &market, "AAPL", 1_000)?;

    assert!(bps.is_positive(), "expected a positive slippage estimate, got {bps}");
    assert!(bps <= d(100), "expected slippage within 100 bps under default config, got {bps}");
    Ok(())
}

/// Scenario 6: capacity and breaker. With max_concurrent=2, a third
/// submission is rejected with CapacityExceeded. Separately, with an
/// engine that fails every call and a breaker threshold of 3, the call
/// past the threshold is rejected with CircuitOpen rather than reaching
/// the engine again.
#[test]
fn capacity_cap_and_circuit_breaker_both_guard_submission() -> Result<()> {
    let asset = Asset::builder("AAPL", AssetType::Stock).build()?;
    let order = || Order::builder(asset.clone(), Side::Buy, OrderType::Market, d(10)).build().unwrap();

    let engine = Arc::new(FakeExecutionEngine::new());
    let capped = ExecutionService::new(
        ExecutionConfig { max_concurrent: 2, ..ExecutionConfig::default() },
        engine,
        None,
    );
    capped.start()?;
    capped.submit(order())?;
    capped.submit(order())?;
    let result = capped.submit(order());
    assert!(matches!(result, Err(CoreError::CapacityExceeded { active: 2, max: 2 })));
    capped.stop()?;

    let failing_engine = Arc::new(FakeExecutionEngine::new());
    failing_engine.set_should_fail(true);
    let breaker_guarded = ExecutionService::new(
        ExecutionConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                failure_window: std::time::Duration::from_secs(60),
                timeout: std::time::Duration::from_secs(60),
                success_threshold: 1,
            },
            retry: RetryConfig { max_attempts: 1, backoff: std::time::Duration::from_millis(0) },
            ..ExecutionConfig::default()
        },
        failing_engine,
        None,
    );
    breaker_guarded.start()?;
    for _ in 0..3 {
        let _ = breaker_guarded.submit(order());
    }
    let result = breaker_guarded.submit(order());
    assert!(matches!(result, Err(CoreError::CircuitOpen { .. })));
    breaker_guarded.stop()?;

    Ok(())
}
