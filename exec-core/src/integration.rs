//! Execution Integration: routes fills returned by the external matching
//! engine to both the Order Lifecycle Manager and the owning Portfolio
//! (spec §2's "Data flow", §3's "Ownership", §5's "Backpressure").
//!
//! This module owns the `order_id -> portfolio_id` routing map. Per spec §3
//! that ownership is lookup-only — the map never extends a portfolio's
//! lifetime, it just remembers which portfolio an in-flight order belongs
//! to until the order reaches a terminal status, at which point the route
//! is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::{CoreError, CoreResult};
use crate::oms::OrderManager;
use crate::order::{OrderFill, OrderId, Side};
use crate::ports::{AssetLookup, EventHandler, PortfolioRepository, RoutedFill};
use crate::position::{Transaction, TransactionType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Backpressure channel capacity between the execution service and this
    /// layer (spec §5, default 1,000).
    pub channel_capacity: usize,
    pub worker_poll_interval: Duration,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_000,
            worker_poll_interval: Duration::from_millis(100),
        }
    }
}

/// What the routing map remembers about an in-flight order, enough to turn a
/// bare `OrderFill` from the OMS into a fully addressed [`RoutedFill`].
#[derive(Debug, Clone)]
struct Route {
    portfolio_id: String,
    symbol: String,
    side: Side,
}

/// Wires the Order Lifecycle Manager, a [`PortfolioRepository`], and an
/// [`AssetLookup`] together behind the routing map and backpressure channel
/// spec §2/§5 describe.
pub struct ExecutionIntegration<R: PortfolioRepository + 'static> {
    oms: Arc<OrderManager>,
    repository: Arc<R>,
    asset_lookup: Arc<dyn AssetLookup>,
    event_handler: Arc<dyn EventHandler>,
    routes: RwLock<HashMap<OrderId, Route>>,
    sender: Sender<RoutedFill>,
    receiver: Receiver<RoutedFill>,
    config: IntegrationConfig,
    running: Arc<AtomicBool>,
}

impl<R: PortfolioRepository + 'static> ExecutionIntegration<R> {
    pub fn new(
        oms: Arc<OrderManager>,
        repository: Arc<R>,
        asset_lookup: Arc<dyn AssetLookup>,
        event_handler: Arc<dyn EventHandler>,
        config: IntegrationConfig,
    ) -> Self {
        let (sender, receiver) = bounded(config.channel_capacity);
        Self {
            oms,
            repository,
            asset_lookup,
            event_handler,
            routes: RwLock::new(HashMap::new()),
            sender,
            receiver,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register the portfolio an order was submitted on behalf of. Must be
    /// called before fills for that order are routed.
    pub fn register_order(&self, order_id: OrderId, portfolio_id: impl Into<String>, symbol: impl Into<String>, side: Side) {
        self.routes.write().insert(
            order_id,
            Route {
                portfolio_id: portfolio_id.into(),
                symbol: symbol.into(),
                side,
            },
        );
    }

    pub fn portfolio_id_for(&self, order_id: OrderId) -> Option<String> {
        self.routes.read().get(&order_id).map(|r| r.portfolio_id.clone())
    }

    fn unroute(&self, order_id: OrderId) {
        self.routes.write().remove(&order_id);
    }

    /// Turn a raw `OrderFill` (as reported by an `ExecutionEngine`) into a
    /// [`RoutedFill`] using the registered route for its order.
    pub fn route_fill(&self, fill: &OrderFill) -> CoreResult<RoutedFill> {
        let route = self
            .routes
            .read()
            .get(&fill.order_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("no portfolio route for order {}", fill.order_id)))?;

        Ok(RoutedFill {
            order_id: fill.order_id,
            portfolio_id: route.portfolio_id,
            symbol: route.symbol,
            side: route.side,
            quantity: fill.quantity,
            price: fill.price,
            commission: fill.fee,
            fill_time: fill.timestamp,
            execution_id: fill.id,
        })
    }

    /// Enqueue a routed fill for processing. Tries the bounded channel
    /// first; on a full channel, falls back to synchronous dispatch on the
    /// caller's thread (spec §5's "On full channel, the integration falls
    /// back to synchronous dispatch").
    pub fn submit_fill(&self, fill: RoutedFill) -> CoreResult<()> {
        match self.sender.try_send(fill) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(fill)) => {
                warn!(order_id = %fill.order_id, "integration channel full, processing fill synchronously");
                self.apply_fill(fill)
            }
            Err(TrySendError::Disconnected(fill)) => self.apply_fill(fill),
        }
    }

    /// Spawn the background worker that drains the channel (spec §5's
    /// thread-pool-with-bounded-channels guidance). Call [`Self::stop`] to
    /// signal it to exit.
    pub fn start(self: &Arc<Self>) -> thread::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        thread::spawn(move || {
            while this.running.load(Ordering::SeqCst) {
                match this.receiver.recv_timeout(this.config.worker_poll_interval) {
                    Ok(fill) => {
                        if let Err(e) = this.apply_fill(fill) {
                            error!(error = %e, "failed to apply routed fill");
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Apply one routed fill to the OMS (fill aggregation, status
    /// transition) and the owning portfolio (position quantity,
    /// weighted-average entry price, cash balance) — spec §2's "Data flow".
    fn apply_fill(&self, fill: RoutedFill) -> CoreResult<()> {
        let order_fill = OrderFill {
            id: fill.execution_id,
            order_id: fill.order_id,
            price: fill.price,
            quantity: fill.quantity,
            fee: fill.commission,
            timestamp: fill.fill_time,
        };
        self.oms.process_fill(order_fill)?;

        let mut portfolio = self
            .repository
            .find_by_id(&fill.portfolio_id)?
            .ok_or_else(|| CoreError::not_found(format!("no portfolio {}", fill.portfolio_id)))?;

        let transaction_type = match fill.side {
            Side::Buy => TransactionType::Buy,
            Side::Sell => TransactionType::Sell,
        };
        let tx = Transaction {
            transaction_type,
            quantity: fill.quantity,
            price: fill.price,
            fee: fill.commission,
        };

        let has_open_position = portfolio
            .position_by_symbol(&fill.symbol)
            .map(|p| p.is_open())
            .unwrap_or(false);
        if has_open_position {
            portfolio.add_transaction(&fill.symbol, tx, fill.fill_time)?;
        } else {
            let asset = self
                .asset_lookup
                .get(&fill.symbol)
                .ok_or_else(|| CoreError::not_found(format!("unknown asset {}", fill.symbol)))?;
            portfolio.open_position(asset, tx, fill.fill_time)?;
        }

        // Cash-balance update from fill : Δcash = (BUY ? -1 : +1)
        // × quantity × price - fee. `add_transaction`/`open_position` above
        // already updated the position; this applies the cash side only.
        portfolio.apply_fill_cash(transaction_type, fill.quantity, fill.price, fill.commission, fill.fill_time);

        self.repository.save(&portfolio)?;

        if let Some(order) = self.oms.get(fill.order_id) {
            if order.status.is_terminal() {
                self.unroute(fill.order_id);
            }
        }

        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_handler.on_routed_fill(&fill);
        }))
        .unwrap_or_else(|_| warn!("event handler panicked on_routed_fill"));

        Ok(())
    }

    pub fn pending_routes(&self) -> usize {
        self.routes.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Asset, AssetType};
    use crate::decimal::Decimal;
    use crate::oms::OmsConfig;
    use crate::order::{Order, OrderType};
    use crate::portfolio::Portfolio;
    use crate::testing::{InMemoryPortfolioRepository, RecordingEventHandler, StaticAssetRegistry};

    fn d(v: i64) -> Decimal {
        Decimal::from_i64(v)
    }

    fn harness() -> (Arc<ExecutionIntegration<InMemoryPortfolioRepository>>, Arc<OrderManager>, Arc<InMemoryPortfolioRepository>) {
        let oms = Arc::new(OrderManager::new(OmsConfig::default()));
        let repository = Arc::new(InMemoryPortfolioRepository::new());
        let registry = StaticAssetRegistry::new();
        registry.register(Asset::builder("AAPL", AssetType::Stock).build().unwrap());
        let asset_lookup: Arc<dyn AssetLookup> = Arc::new(registry);
        let handler: Arc<dyn EventHandler> = Arc::new(RecordingEventHandler::new());
        let integration = Arc::new(ExecutionIntegration::new(
            Arc::clone(&oms),
            Arc::clone(&repository),
            asset_lookup,
            handler,
            IntegrationConfig::default(),
        ));
        (integration, oms, repository)
    }

    #[test]
    fn routed_fill_opens_position_and_debits_cash() {
        let (integration, oms, repository) = harness();
        let portfolio = Portfolio::new("p1", "Main", d(100_000), 0).unwrap();
        repository.save(&portfolio).unwrap();

        let asset = Asset::builder("AAPL", AssetType::Stock).build().unwrap();
        let order = Order::builder(asset, Side::Buy, OrderType::Market, d(10))
            .build()
            .unwrap();
        let order_id = oms.submit(order).unwrap();
        oms.update_status(order_id, crate::order::OrderStatus::Submitted, 1).unwrap();
        integration.register_order(order_id, "p1", "AAPL", Side::Buy);

        let fill = OrderFill {
            id: 1,
            order_id,
            price: d(150),
            quantity: d(10),
            fee: Decimal::ZERO,
            timestamp: 1,
        };
        let routed = integration.route_fill(&fill).unwrap();
        integration.submit_fill(routed).unwrap();

        let saved = repository.find_by_id("p1").unwrap().unwrap();
        assert_eq!(saved.cash_balance, d(100_000) - d(1_500));
        assert!(saved.position_by_symbol("AAPL").is_some());
    }

    #[test]
    fn route_is_dropped_once_order_is_terminal() {
        let (integration, oms, repository) = harness();
        let portfolio = Portfolio::new("p1", "Main", d(100_000), 0).unwrap();
        repository.save(&portfolio).unwrap();

        let asset = Asset::builder("AAPL", AssetType::Stock).build().unwrap();
        let order = Order::builder(asset, Side::Buy, OrderType::Market, d(10))
            .build()
            .unwrap();
        let order_id = oms.submit(order).unwrap();
        oms.update_status(order_id, crate::order::OrderStatus::Submitted, 1).unwrap();
        integration.register_order(order_id, "p1", "AAPL", Side::Buy);

        let fill = OrderFill {
            id: 1,
            order_id,
            price: d(150),
            quantity: d(10),
            fee: Decimal::ZERO,
            timestamp: 1,
        };
        let routed = integration.route_fill(&fill).unwrap();
        integration.submit_fill(routed).unwrap();

        assert_eq!(integration.pending_routes(), 0);
    }

    /// A symbol whose prior position fully closed must reopen through
    /// `open_position` on the next fill rather than erroring out against
    /// the now-closed row (regression: `apply_fill` used to branch on
    /// `position_by_symbol(..).is_some()`, which stays true for closed
    /// positions too).
    #[test]
    fn fill_after_position_closes_reopens_rather_than_erroring() {
        let (integration, oms, repository) = harness();
        let portfolio = Portfolio::new("p1", "Main", d(100_000), 0).unwrap();
        repository.save(&portfolio).unwrap();
        let asset = Asset::builder("AAPL", AssetType::Stock).build().unwrap();

        let submit_and_fill = |side: Side, qty: Decimal, price: Decimal, ts: i64, exec_id: u64| {
            let order = Order::builder(asset.clone(), side, OrderType::Market, qty)
                .build()
                .unwrap();
            let order_id = oms.submit(order).unwrap();
            oms.update_status(order_id, crate::order::OrderStatus::Submitted, ts).unwrap();
            integration.register_order(order_id, "p1", "AAPL", side);
            let fill = OrderFill {
                id: exec_id,
                order_id,
                price,
                quantity: qty,
                fee: Decimal::ZERO,
                timestamp: ts,
            };
            let routed = integration.route_fill(&fill).unwrap();
            integration.submit_fill(routed).unwrap();
        };

        // Open, then fully close, the AAPL position.
        submit_and_fill(Side::Buy, d(10), d(150), 1, 1);
        submit_and_fill(Side::Sell, d(10), d(150), 2, 2);

        let after_close = repository.find_by_id("p1").unwrap().unwrap();
        assert!(!after_close.position_by_symbol("AAPL").unwrap().is_open());

        // A fresh fill for the same symbol must reopen it, not error.
        submit_and_fill(Side::Buy, d(5), d(160), 3, 3);

        let reopened = repository.find_by_id("p1").unwrap().unwrap();
        let position = reopened.position_by_symbol("AAPL").unwrap();
        assert!(position.is_open());
        assert_eq!(position.quantity, d(5));
    }
}
