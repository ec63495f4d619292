//! Order and fill value types, plus the transition table that governs an
//! order's lifecycle.
//!
//! This module defines the *data* for the order lifecycle; the OMS
//! ([`crate::oms`]) owns the *behavior* (tracking, fill aggregation, status
//! transitions). Keeping the table here lets both the OMS and the execution
//! service's lightweight shard entries validate transitions against the same
//! source of truth.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::decimal::Decimal;
use crate::error::CoreError;

/// Unique order identifier.
///
/// `u128` rather than a `String`/`Uuid` for copy semantics on the execution
/// service's hot path: `[timestamp:64][random:32][counter:32]`, identical in
/// shape to the reference codebase's `OrderId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct OrderId(pub u128);

impl OrderId {
    pub const fn new(id: u128) -> Self {
        Self(id)
    }

    /// Generate a process-unique id from the current time, a random value,
    /// and a thread-local counter. ~60ns, dominated by `SystemTime::now()`.
    pub fn generate() -> Self {
        use rand::Rng;

        thread_local! {
            static COUNTER: std::cell::Cell<u32> = std::cell::Cell::new(0);
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let random_part: u32 = rand::thread_rng().gen();
        let counter = COUNTER.with(|c| {
            let val = c.get();
            c.set(val.wrapping_add(1));
            val
        });

        Self(((timestamp as u128) << 64) | ((random_part as u128) << 32) | (counter as u128))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    TrailingStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
    Day,
    Gtd,
}

/// Order status. `#[repr(u8)]` for a minimal-size shard entry, matching the
/// reference codebase's `OrderStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderStatus {
    Pending = 0,
    Submitted = 1,
    PartiallyFilled = 2,
    Filled = 3,
    Cancelled = 4,
    Rejected = 5,
    Expired = 6,
}

impl OrderStatus {
    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// The exhaustive order-status transition table. Absence of an edge means
/// the transition is forbidden.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Submitted)
            | (Pending, Cancelled)
            | (Pending, Rejected)
            | (Submitted, PartiallyFilled)
            | (Submitted, Filled)
            | (Submitted, Cancelled)
            | (Submitted, Rejected)
            | (Submitted, Expired)
            | (PartiallyFilled, Filled)
            | (PartiallyFilled, Cancelled)
            | (PartiallyFilled, Expired)
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub id: u64,
    pub order_id: OrderId,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub timestamp: i64,
}

impl OrderFill {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.price.is_positive() {
            return Err(CoreError::validation("fill price must be > 0"));
        }
        if !self.quantity.is_positive() {
            return Err(CoreError::validation("fill quantity must be > 0"));
        }
        if self.fee.is_negative() {
            return Err(CoreError::validation("fill fee must be >= 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: String,
    pub asset: Asset,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub trailing_amount: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub expires_at: Option<i64>,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_fill_price: Decimal,
    pub fills: Vec<OrderFill>,
    pub created_at: i64,
    pub updated_at: i64,
    pub submitted_at: Option<i64>,
    pub filled_at: Option<i64>,
    pub cancelled_at: Option<i64>,
}

impl Order {
    pub fn builder(asset: Asset, side: Side, order_type: OrderType, quantity: Decimal) -> OrderBuilder {
        OrderBuilder::new(asset, side, order_type, quantity)
    }

    pub fn remaining_qty(&self) -> Decimal {
        self.quantity - self.filled_qty
    }

    /// Append a fill, recomputing the weighted average fill price and filled
    /// quantity average-fill-price formula. Does not change
    /// `status` — the OMS applies the resulting status transition.
    ///
    /// Returns an error if the fill would push `filled_qty` past `quantity`.
    pub fn apply_fill(&mut self, fill: OrderFill) -> Result<(), CoreError> {
        if fill.order_id != self.id {
            return Err(CoreError::validation("fill order_id does not match order"));
        }
        if fill.quantity > self.remaining_qty() {
            return Err(CoreError::validation(format!(
                "fill quantity {} exceeds remaining order quantity {}",
                fill.quantity,
                self.remaining_qty()
            )));
        }

        let old_filled = self.filled_qty;
        let old_avg = self.avg_fill_price;
        let new_filled = old_filled + fill.quantity;

        self.avg_fill_price = (old_avg * old_filled + fill.price * fill.quantity).div(new_filled);
        self.filled_qty = new_filled;
        self.fills.push(fill);
        self.updated_at = self.created_at.max(self.updated_at);
        Ok(())
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_qty == self.quantity
    }

    /// Validate the fill-accounting invariants: `filled_qty <= quantity`,
    /// fill quantities sum to `filled_qty`, every fill belongs to this order.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.filled_qty > self.quantity {
            return Err(CoreError::validation("filled_qty exceeds quantity"));
        }
        let sum: Decimal = self.fills.iter().fold(Decimal::ZERO, |acc, f| acc + f.quantity);
        if sum != self.filled_qty {
            return Err(CoreError::validation("sum of fill quantities does not match filled_qty"));
        }
        if self.fills.iter().any(|f| f.order_id != self.id) {
            return Err(CoreError::validation("fill order_id mismatch"));
        }
        Ok(())
    }
}

pub struct OrderBuilder {
    asset: Asset,
    side: Side,
    order_type: OrderType,
    quantity: Decimal,
    client_id: String,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
    trailing_amount: Option<Decimal>,
    time_in_force: TimeInForce,
    expires_at: Option<i64>,
    now: i64,
}

impl OrderBuilder {
    pub fn new(asset: Asset, side: Side, order_type: OrderType, quantity: Decimal) -> Self {
        Self {
            asset,
            side,
            order_type,
            quantity,
            client_id: String::new(),
            price: None,
            stop_price: None,
            trailing_amount: None,
            time_in_force: TimeInForce::Gtc,
            expires_at: None,
            now: now_unix_nanos(),
        }
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn stop_price(mut self, stop_price: Decimal) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn trailing_amount(mut self, trailing_amount: Decimal) -> Self {
        self.trailing_amount = Some(trailing_amount);
        self
    }

    pub fn time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn expires_at(mut self, ts: i64) -> Self {
        self.expires_at = Some(ts);
        self
    }

    /// For deterministic tests: override the `created_at`/`updated_at`
    /// timestamp instead of sampling the wall clock.
    pub fn at_time(mut self, now: i64) -> Self {
        self.now = now;
        self
    }

    pub fn build(self) -> Result<Order, CoreError> {
        self.asset.validate_quantity(self.quantity)?;

        match self.order_type {
            OrderType::Limit if self.price.is_none() => {
                return Err(CoreError::validation("limit order requires price"))
            }
            OrderType::Stop if self.stop_price.is_none() => {
                return Err(CoreError::validation("stop order requires stop_price"))
            }
            OrderType::StopLimit if self.price.is_none() || self.stop_price.is_none() => {
                return Err(CoreError::validation("stop-limit order requires price and stop_price"))
            }
            OrderType::TrailingStop if self.trailing_amount.is_none() => {
                return Err(CoreError::validation("trailing-stop order requires trailing_amount"))
            }
            _ => {}
        }

        match self.time_in_force {
            TimeInForce::Gtd if self.expires_at.is_none() => {
                return Err(CoreError::validation("GTD orders require expires_at"))
            }
            TimeInForce::Gtd => {
                if self.expires_at.unwrap() <= self.now {
                    return Err(CoreError::validation("GTD expires_at must be in the future"));
                }
            }
            _ if self.expires_at.is_some() => {
                return Err(CoreError::validation("only GTD orders may set expires_at"))
            }
            _ => {}
        }

        let price = self.price.map(|p| self.asset.round_price(p));
        let stop_price = self.stop_price.map(|p| self.asset.round_price(p));

        Ok(Order {
            id: OrderId::generate(),
            client_id: self.client_id,
            asset: self.asset,
            order_type: self.order_type,
            side: self.side,
            quantity: self.quantity,
            price,
            stop_price,
            trailing_amount: self.trailing_amount,
            time_in_force: self.time_in_force,
            expires_at: self.expires_at,
            status: OrderStatus::Pending,
            filled_qty: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            fills: Vec::new(),
            created_at: self.now,
            updated_at: self.now,
            submitted_at: None,
            filled_at: None,
            cancelled_at: None,
        })
    }
}

fn now_unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetType;

    fn asset() -> Asset {
        Asset::builder("AAPL", AssetType::Stock)
            .tick_size(Decimal::new(1, 2))
            .build()
            .unwrap()
    }

    #[test]
    fn limit_order_requires_price() {
        let result = Order::builder(asset(), Side::Buy, OrderType::Limit, Decimal::from_i64(10)).build();
        assert!(result.is_err());
    }

    #[test]
    fn gtd_without_expiration_is_rejected() {
        let result = Order::builder(asset(), Side::Buy, OrderType::Market, Decimal::from_i64(10))
            .time_in_force(TimeInForce::Gtd)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn gtd_with_past_expiration_is_rejected() {
        let result = Order::builder(asset(), Side::Buy, OrderType::Market, Decimal::from_i64(10))
            .time_in_force(TimeInForce::Gtd)
            .expires_at(0)
            .at_time(1_000)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn price_is_rounded_to_tick_at_build_time() {
        let order = Order::builder(asset(), Side::Buy, OrderType::Limit, Decimal::from_i64(10))
            .price(Decimal::new(150073, 3))
            .build()
            .unwrap();
        assert_eq!(order.price.unwrap(), Decimal::new(15007, 2));
    }

    #[test]
    fn average_fill_price_across_two_partial_fills() {
        let mut order = Order::builder(asset(), Side::Buy, OrderType::Limit, Decimal::from_i64(100))
            .price(Decimal::new(15000, 2))
            .build()
            .unwrap();

        order
            .apply_fill(OrderFill {
                id: 1,
                order_id: order.id,
                price: Decimal::new(15000, 2),
                quantity: Decimal::from_i64(50),
                fee: Decimal::ZERO,
                timestamp: 1,
            })
            .unwrap();
        order
            .apply_fill(OrderFill {
                id: 2,
                order_id: order.id,
                price: Decimal::new(15010, 2),
                quantity: Decimal::from_i64(50),
                fee: Decimal::ZERO,
                timestamp: 2,
            })
            .unwrap();

        assert_eq!(order.filled_qty, Decimal::from_i64(100));
        assert_eq!(order.avg_fill_price, Decimal::new(15005, 2));
        assert!(order.is_fully_filled());
        order.check_invariants().unwrap();
    }

    #[test]
    fn fill_exceeding_remaining_quantity_is_rejected() {
        let mut order = Order::builder(asset(), Side::Buy, OrderType::Market, Decimal::from_i64(10))
            .build()
            .unwrap();
        let result = order.apply_fill(OrderFill {
            id: 1,
            order_id: order.id,
            price: Decimal::from_i64(10),
            quantity: Decimal::from_i64(11),
            fee: Decimal::ZERO,
            timestamp: 1,
        });
        assert!(result.is_err());
    }

    #[test]
    fn transition_table_matches_spec() {
        use OrderStatus::*;
        assert!(is_valid_transition(Pending, Submitted));
        assert!(is_valid_transition(Submitted, PartiallyFilled));
        assert!(is_valid_transition(PartiallyFilled, Filled));
        assert!(!is_valid_transition(Filled, Cancelled));
        assert!(!is_valid_transition(Pending, Filled));
        assert!(Filled.is_terminal());
        assert!(!Pending.is_terminal());
    }
}
