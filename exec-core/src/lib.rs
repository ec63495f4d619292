//! exec-core — the in-memory, latency-sensitive core of a trading engine.
//!
//! Four tightly coupled components, each its own module:
//!
//! - [`oms`] — the Order Lifecycle Manager: the canonical, exhaustively
//!   state-checked record for every in-flight order.
//! - [`execution`] — the Optimized Execution Service: a sharded,
//!   lock-scoped submission path with pooled order slots and lock-free
//!   metrics.
//! - [`portfolio`] / [`position`] — Portfolio & Position Accounting: exact
//!   P&L, weighted-average entry price, drawdown tracking, rebalance
//!   planning. [`portfolio_service`] layers a recency-ordered cache over a
//!   repository in front of these.
//! - [`slippage`] — the Slippage Estimator: a read-side, multi-factor
//!   execution-cost advisor with an optional calibrated per-symbol impact
//!   model.
//!
//! [`integration`] wires fills from the execution service back into both the
//! OMS and the portfolio book. [`ports`] defines the trait boundary to every
//! external collaborator (matching engine, validator, repository, cache);
//! [`testing`] provides in-memory fakes for all of them. [`decimal`] and
//! [`asset`] are the shared value types everything above is built on;
//! [`error`] is the crate's single error type; [`resilience`] holds the
//! circuit breaker and retry helper the execution service's engine calls
//! use; [`perf`] holds the generic object-pool/CPU-affinity utilities
//! several components share; [`config`] holds the top-level
//! configuration aggregating every component's own `*Config` type;
//! [`diagnostics`] defines the JSON snapshot format the operator CLI reads.

pub mod asset;
pub mod config;
pub mod decimal;
pub mod diagnostics;
pub mod error;
pub mod execution;
pub mod integration;
pub mod oms;
pub mod order;
pub mod perf;
pub mod portfolio;
pub mod portfolio_service;
pub mod position;
pub mod ports;
pub mod resilience;
pub mod slippage;
pub mod testing;
pub mod utils;

pub use decimal::Decimal;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use order::{Order, OrderFill, OrderId, OrderStatus, OrderType, Side, TimeInForce};
pub use portfolio::Portfolio;
pub use position::Position;

/// Convenient imports for a binary wiring this crate's components together.
pub mod prelude {
    pub use crate::asset::{Asset, AssetType};
    pub use crate::decimal::Decimal;
    pub use crate::error::{CoreError, CoreResult, ErrorKind};
    pub use crate::execution::{ExecutionConfig, ExecutionService};
    pub use crate::integration::{ExecutionIntegration, IntegrationConfig};
    pub use crate::oms::{OmsConfig, OrderManager};
    pub use crate::order::{Order, OrderFill, OrderId, OrderStatus, OrderType, Side, TimeInForce};
    pub use crate::portfolio::{Portfolio, PortfolioMetrics};
    pub use crate::portfolio_service::{PortfolioConfig, PortfolioService};
    pub use crate::position::Position;
    pub use crate::ports::{
        AssetLookup, CacheService, EventHandler, ExecutionEngine, ExecutionResult, MarketData, OrderValidator,
        PortfolioRepository,
    };
    pub use crate::slippage::{SlippageConfig, SlippageEstimator};
}
