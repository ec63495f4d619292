//! In-memory fakes for every port trait. Used by this
//! crate's own integration tests and exported for downstream binaries that
//! want to exercise the execution/integration pipeline without a real
//! venue connection or database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use parking_lot::RwLock;

use crate::asset::Asset;
use crate::decimal::Decimal;
use crate::error::{CoreError, CoreResult};
use crate::order::{Order, OrderFill, OrderId, OrderStatus};
use crate::portfolio::Portfolio;
use crate::ports::{
    AssetLookup, CacheService, EventHandler, ExecutionEngine, ExecutionResult, ExecutionStatus, MarketData,
    OrderValidator, PortfolioFilter, PortfolioRepository, PortfolioSnapshot, RoutedFill,
};

/// A scriptable [`ExecutionEngine`]: acknowledges every order as filled at
/// its limit/market reference price unless `set_should_fail` has been
/// toggled on, in which case every submit returns an `EngineFailure`.
pub struct FakeExecutionEngine {
    should_fail: AtomicBool,
    next_execution_id: AtomicU64,
    cancelled: Mutex<Vec<OrderId>>,
    history: RwLock<HashMap<OrderId, Vec<OrderFill>>>,
}

impl FakeExecutionEngine {
    pub fn new() -> Self {
        Self {
            should_fail: AtomicBool::new(false),
            next_execution_id: AtomicU64::new(1),
            cancelled: Mutex::new(Vec::new()),
            history: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn was_cancelled(&self, id: OrderId) -> bool {
        self.cancelled.lock().unwrap().contains(&id)
    }
}

impl Default for FakeExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine for FakeExecutionEngine {
    fn start(&self) -> CoreResult<()> {
        Ok(())
    }

    fn stop(&self) -> CoreResult<()> {
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.should_fail.load(Ordering::SeqCst)
    }

    fn submit(&self, order: &Order) -> CoreResult<ExecutionResult> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(CoreError::engine_failure("fake engine configured to fail"));
        }

        let price = order.price.unwrap_or(Decimal::from_i64(100));
        let fill = OrderFill {
            id: self.next_execution_id.fetch_add(1, Ordering::SeqCst),
            order_id: order.id,
            price,
            quantity: order.quantity,
            fee: Decimal::ZERO,
            timestamp: order.created_at,
        };
        self.history.write().entry(order.id).or_default().push(fill.clone());

        Ok(ExecutionResult {
            order_id: order.id,
            portfolio_id: None,
            executed_at: order.created_at,
            avg_price: price,
            total_quantity: order.quantity,
            fills: vec![fill],
            status: ExecutionStatus::Filled,
            error_message: None,
        })
    }

    fn cancel(&self, id: OrderId) -> CoreResult<()> {
        self.cancelled.lock().unwrap().push(id);
        Ok(())
    }

    fn get_status(&self, id: OrderId) -> CoreResult<Order> {
        Err(CoreError::not_found(format!("fake engine does not track order {} independently", id)))
    }

    fn get_history(&self, id: OrderId) -> CoreResult<Vec<OrderFill>> {
        Ok(self.history.read().get(&id).cloned().unwrap_or_default())
    }
}

/// A validator that always passes. Compose with [`RiskCapValidator`] or a
/// custom implementation to exercise rejection paths.
pub struct PermissiveValidator;

impl OrderValidator for PermissiveValidator {
    fn validate_order(&self, _order: &Order) -> CoreResult<()> {
        Ok(())
    }

    fn validate_risk(&self, _order: &Order, _portfolio: &Portfolio) -> CoreResult<()> {
        Ok(())
    }

    fn validate_market(&self, _order: &Order, _market: &MarketData) -> CoreResult<()> {
        Ok(())
    }
}

/// Rejects an order whose notional exceeds `max_position_weight_pct` of the
/// portfolio's total value.
pub struct RiskCapValidator {
    pub max_position_weight_pct: Decimal,
}

impl OrderValidator for RiskCapValidator {
    fn validate_order(&self, order: &Order) -> CoreResult<()> {
        if !order.quantity.is_positive() {
            return Err(CoreError::validation("order quantity must be > 0"));
        }
        Ok(())
    }

    fn validate_risk(&self, order: &Order, portfolio: &Portfolio) -> CoreResult<()> {
        let price = order.price.unwrap_or(Decimal::ZERO);
        if !price.is_positive() {
            return Ok(());
        }
        let notional = order.quantity * price;
        let total_value = portfolio.metrics.total_value;
        if !total_value.is_positive() {
            return Ok(());
        }
        let weight = notional.div(total_value).mul(Decimal::from_i64(100));
        if weight > self.max_position_weight_pct {
            return Err(CoreError::validation(format!(
                "order notional {} is {}% of portfolio value, exceeds {}% cap",
                notional, weight, self.max_position_weight_pct
            )));
        }
        Ok(())
    }

    fn validate_market(&self, _order: &Order, _market: &MarketData) -> CoreResult<()> {
        Ok(())
    }
}

/// Deep-copying in-memory [`PortfolioRepository`]: every read and write
/// clones the stored `Portfolio` so callers never alias internal state.
pub struct InMemoryPortfolioRepository {
    portfolios: RwLock<HashMap<String, Portfolio>>,
    snapshots: RwLock<HashMap<String, Vec<PortfolioSnapshot>>>,
}

impl InMemoryPortfolioRepository {
    pub fn new() -> Self {
        Self {
            portfolios: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPortfolioRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl PortfolioRepository for InMemoryPortfolioRepository {
    fn save(&self, portfolio: &Portfolio) -> CoreResult<()> {
        self.portfolios.write().insert(portfolio.id.clone(), portfolio.clone());
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> CoreResult<Option<Portfolio>> {
        Ok(self.portfolios.read().get(id).cloned())
    }

    fn find_all(&self, filter: &PortfolioFilter) -> CoreResult<Vec<Portfolio>> {
        let mut results: Vec<Portfolio> = self
            .portfolios
            .read()
            .values()
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .filter(|p| filter.min_capital.map_or(true, |m| p.initial_capital >= m))
            .filter(|p| filter.max_capital.map_or(true, |m| p.initial_capital <= m))
            .filter(|p| filter.created_after.map_or(true, |t| p.created_at >= t))
            .filter(|p| filter.created_before.map_or(true, |t| p.created_at <= t))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));

        let offset = filter.offset.unwrap_or(0);
        if offset >= results.len() {
            return Ok(Vec::new());
        }
        let end = filter.limit.map(|l| (offset + l).min(results.len())).unwrap_or(results.len());
        Ok(results[offset..end].to_vec())
    }

    fn delete(&self, id: &str) -> CoreResult<()> {
        self.portfolios.write().remove(id);
        Ok(())
    }

    fn save_position(&self, portfolio_id: &str, _position: &crate::position::Position) -> CoreResult<()> {
        // Positions live inside the saved Portfolio snapshot; this fake
        // treats `save` as the single source of truth and only validates
        // the portfolio is known.
        if !self.portfolios.read().contains_key(portfolio_id) {
            return Err(CoreError::not_found(format!("portfolio {} not found", portfolio_id)));
        }
        Ok(())
    }

    fn find_positions(&self, portfolio_id: &str) -> CoreResult<Vec<crate::position::Position>> {
        Ok(self
            .portfolios
            .read()
            .get(portfolio_id)
            .map(|p| p.positions().cloned().collect())
            .unwrap_or_default())
    }

    fn find_position_by_symbol(&self, portfolio_id: &str, symbol: &str) -> CoreResult<Option<crate::position::Position>> {
        Ok(self
            .portfolios
            .read()
            .get(portfolio_id)
            .and_then(|p| p.position_by_symbol(symbol).cloned()))
    }

    fn save_snapshot(&self, snapshot: &PortfolioSnapshot) -> CoreResult<()> {
        self.snapshots
            .write()
            .entry(snapshot.portfolio_id.clone())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    fn get_snapshots(&self, portfolio_id: &str, from: i64, to: i64) -> CoreResult<Vec<PortfolioSnapshot>> {
        Ok(self
            .snapshots
            .read()
            .get(portfolio_id)
            .map(|snaps| snaps.iter().filter(|s| s.taken_at >= from && s.taken_at <= to).cloned().collect())
            .unwrap_or_default())
    }
}

/// A trivial read-through cache with no eviction, useful for tests that
/// just need something implementing [`CacheService`].
pub struct InMemoryCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> InMemoryCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> Default for InMemoryCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheService<K, V> for InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    fn invalidate(&self, key: &K) {
        self.entries.write().remove(key);
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// An [`AssetLookup`] backed by an explicit registration list, for tests
/// and the paper-trading demo that don't want a real asset-master feed.
pub struct StaticAssetRegistry {
    assets: RwLock<HashMap<String, Asset>>,
}

impl StaticAssetRegistry {
    pub fn new() -> Self {
        Self {
            assets: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, asset: Asset) {
        self.assets.write().insert(asset.symbol.clone(), asset);
    }
}

impl Default for StaticAssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetLookup for StaticAssetRegistry {
    fn get(&self, symbol: &str) -> Option<Asset> {
        self.assets.read().get(symbol).cloned()
    }
}

/// Records every dispatched [`ExecutionResult`] and [`RoutedFill`] for test
/// assertions, instead of acting on them.
pub struct RecordingEventHandler {
    results: Mutex<Vec<ExecutionResult>>,
    fills: Mutex<Vec<RoutedFill>>,
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(Vec::new()),
            fills: Mutex::new(Vec::new()),
        }
    }

    pub fn execution_results(&self) -> Vec<ExecutionResult> {
        self.results.lock().unwrap().clone()
    }

    pub fn routed_fills(&self) -> Vec<RoutedFill> {
        self.fills.lock().unwrap().clone()
    }
}

impl Default for RecordingEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for RecordingEventHandler {
    fn on_execution_result(&self, result: &ExecutionResult) {
        self.results.lock().unwrap().push(result.clone());
    }

    fn on_routed_fill(&self, fill: &RoutedFill) {
        self.fills.lock().unwrap().push(fill.clone());
    }
}
