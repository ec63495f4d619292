//! Capability traits and DTOs for the collaborators this crate treats as
//! external: the matching engine / venue adapter, pre-trade validation, the
//! portfolio repository, and the event-handler/cache hooks.
//!
//! The core never hard-codes a concrete adapter — every component that
//! reaches outside its own module takes one of these traits via
//! constructor injection, matching the reference codebase's convention of
//! consuming capabilities through composition rather than inheritance.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::decimal::Decimal;
use crate::error::CoreResult;
use crate::order::{Order, OrderFill, OrderId};
use crate::portfolio::Portfolio;

/// Execution status reported back by the external matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Submitted,
    Filled,
    PartiallyFilled,
    Rejected,
    Cancelled,
    Error,
}

/// Result of submitting an order to the matching engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub order_id: OrderId,
    pub portfolio_id: Option<String>,
    pub executed_at: i64,
    pub avg_price: Decimal,
    pub total_quantity: Decimal,
    pub fills: Vec<OrderFill>,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
}

/// The integration layer's view of a fill — distinct from
/// [`crate::order::OrderFill`] in that it also carries routing and side
/// information the OMS's fill type doesn't need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedFill {
    pub order_id: OrderId,
    pub portfolio_id: String,
    pub symbol: String,
    pub side: crate::order::Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub fill_time: i64,
    pub execution_id: u64,
}

/// A market snapshot for one asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketData {
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub bid_size: Decimal,
    pub ask_size: Decimal,
    pub last_trade_price: Decimal,
    pub last_trade_size: Decimal,
    pub volume: Decimal,
    pub vwap: Decimal,
    pub volatility: Decimal,
    pub timestamp: i64,
}

/// The matching engine / venue adapter. Implemented by
/// integration code outside this crate; [`crate::testing`] provides an
/// in-memory fake for tests.
pub trait ExecutionEngine: Send + Sync {
    fn start(&self) -> CoreResult<()>;
    fn stop(&self) -> CoreResult<()>;
    fn is_healthy(&self) -> bool;
    fn submit(&self, order: &Order) -> CoreResult<ExecutionResult>;
    fn cancel(&self, id: OrderId) -> CoreResult<()>;
    fn get_status(&self, id: OrderId) -> CoreResult<Order>;
    fn get_history(&self, id: OrderId) -> CoreResult<Vec<OrderFill>>;
}

/// Pre-trade validation hooks. Each stage may be skipped by an
/// implementation that returns `Ok(())` unconditionally.
pub trait OrderValidator: Send + Sync {
    fn validate_order(&self, order: &Order) -> CoreResult<()>;
    fn validate_risk(&self, order: &Order, portfolio: &Portfolio) -> CoreResult<()>;
    fn validate_market(&self, order: &Order, market: &MarketData) -> CoreResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioFilter {
    pub status: Option<crate::portfolio::PortfolioStatus>,
    pub min_capital: Option<Decimal>,
    pub max_capital: Option<Decimal>,
    pub created_after: Option<i64>,
    pub created_before: Option<i64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A point-in-time portfolio valuation, persisted for historical reporting
/// via `save_snapshot`/`get_snapshots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub portfolio_id: String,
    pub taken_at: i64,
    pub metrics: crate::portfolio::PortfolioMetrics,
    pub cash_balance: Decimal,
}

/// Persistence for portfolios and positions. An in-memory
/// implementation must deep-copy on every read and write so callers never
/// alias internal state.
pub trait PortfolioRepository: Send + Sync {
    fn save(&self, portfolio: &Portfolio) -> CoreResult<()>;
    fn find_by_id(&self, id: &str) -> CoreResult<Option<Portfolio>>;
    fn find_all(&self, filter: &PortfolioFilter) -> CoreResult<Vec<Portfolio>>;
    fn delete(&self, id: &str) -> CoreResult<()>;
    fn save_position(&self, portfolio_id: &str, position: &crate::position::Position) -> CoreResult<()>;
    fn find_positions(&self, portfolio_id: &str) -> CoreResult<Vec<crate::position::Position>>;
    fn find_position_by_symbol(&self, portfolio_id: &str, symbol: &str) -> CoreResult<Option<crate::position::Position>>;
    fn save_snapshot(&self, snapshot: &PortfolioSnapshot) -> CoreResult<()>;
    fn get_snapshots(&self, portfolio_id: &str, from: i64, to: i64) -> CoreResult<Vec<PortfolioSnapshot>>;
}

/// Dispatched after an execution result or routed fill has been applied,
/// outside any lock.
pub trait EventHandler: Send + Sync {
    fn on_execution_result(&self, _result: &ExecutionResult) {}
    fn on_routed_fill(&self, _fill: &RoutedFill) {}
}

/// A small read-through cache abstraction the portfolio service's
/// repository-backed LRU cache sits behind.
pub trait CacheService<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);
    fn invalidate(&self, key: &K);
    fn len(&self) -> usize;
}

/// Asset metadata lookup, used by the slippage estimator and validators
/// that need tick size / precision without owning the asset registry
/// themselves.
pub trait AssetLookup: Send + Sync {
    fn get(&self, symbol: &str) -> Option<Asset>;
}

/// A no-op retry-timeout helper used only to document the unit contract of
/// `order_timeout` at the trait boundary.
pub const DEFAULT_ORDER_TIMEOUT: Duration = Duration::from_secs(5);
