//! Position accounting: quantity, weighted-average entry price, realized and
//! unrealized P&L, and drawdown tracking for a single open or closed
//! position in one asset.
//!
//! A `Position` owns its transaction history exclusively ; nothing
//! outside this module mutates `quantity`, `avg_entry_price`, or `realized_pnl`
//! directly. `Portfolio` holds positions by value and only ever calls the
//! methods below.

use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::decimal::Decimal;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Buy,
    Sell,
}

/// A single fill applied to a position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
}

impl Transaction {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.quantity.is_positive() {
            return Err(CoreError::validation("transaction quantity must be > 0"));
        }
        if !self.price.is_positive() {
            return Err(CoreError::validation("transaction price must be > 0"));
        }
        if self.fee.is_negative() {
            return Err(CoreError::validation("transaction fee must be >= 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub asset: Asset,
    pub side: PositionSide,
    pub status: PositionStatus,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub transactions: Vec<Transaction>,
    pub opened_at: i64,
    pub updated_at: i64,
    pub closed_at: Option<i64>,
    pub max_unrealized_pnl: Decimal,
    pub min_unrealized_pnl: Decimal,
    pub max_drawdown: Decimal,
}

impl Position {
    /// Open a new position from its first transaction. Side is inferred:
    /// BUY opens Long, SELL opens Short.
    pub fn open(id: impl Into<String>, asset: Asset, tx: Transaction, now: i64) -> Result<Self, CoreError> {
        tx.validate()?;

        let side = match tx.transaction_type {
            TransactionType::Buy => PositionSide::Long,
            TransactionType::Sell => PositionSide::Short,
        };

        let cost_basis = tx.price * tx.quantity + tx.fee;

        Ok(Self {
            id: id.into(),
            asset,
            side,
            status: PositionStatus::Open,
            quantity: tx.quantity,
            avg_entry_price: tx.price,
            current_price: tx.price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            total_fees: tx.fee,
            market_value: tx.price * tx.quantity,
            cost_basis,
            transactions: vec![tx],
            opened_at: now,
            updated_at: now,
            closed_at: None,
            max_unrealized_pnl: Decimal::ZERO,
            min_unrealized_pnl: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
        })
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open | PositionStatus::Closing)
    }

    /// Does this transaction increase exposure on the current side (long+buy
    /// or short+sell), or reduce it?
    fn increases_side(&self, tx_type: TransactionType) -> bool {
        matches!(
            (self.side, tx_type),
            (PositionSide::Long, TransactionType::Buy) | (PositionSide::Short, TransactionType::Sell)
        )
    }

    /// Apply a transaction to an already-open position.
    pub fn add_transaction(&mut self, tx: Transaction, now: i64) -> Result<(), CoreError> {
        if self.status == PositionStatus::Closed {
            return Err(CoreError::invalid_state("cannot add transaction to a closed position"));
        }
        tx.validate()?;

        if self.increases_side(tx.transaction_type) {
            self.increase(tx);
        } else {
            self.reduce(tx)?;
            if self.status == PositionStatus::Closed {
                self.closed_at = Some(now);
            }
        }

        self.total_fees += tx.fee;
        self.transactions.push(tx);
        self.updated_at = now;
        Ok(())
    }

    fn increase(&mut self, tx: Transaction) {
        let new_qty = self.quantity + tx.quantity;
        self.avg_entry_price =
            (self.avg_entry_price * self.quantity + tx.price * tx.quantity).div(new_qty);
        self.quantity = new_qty;
        self.cost_basis += tx.price * tx.quantity + tx.fee;
    }

    fn reduce(&mut self, tx: Transaction) -> Result<(), CoreError> {
        if tx.quantity > self.quantity {
            return Err(CoreError::validation(format!(
                "reducing transaction quantity {} exceeds position quantity {}",
                tx.quantity, self.quantity
            )));
        }

        let per_share_pnl = match self.side {
            PositionSide::Long => tx.price - self.avg_entry_price,
            PositionSide::Short => self.avg_entry_price - tx.price,
            PositionSide::Flat => Decimal::ZERO,
        };
        self.realized_pnl += per_share_pnl * tx.quantity - tx.fee;

        let quantity_before_reduction = self.quantity;
        self.quantity -= tx.quantity;

        // Proportional cost-basis reduction divides by the quantity *before*
        // this reduction, not by `quantity + tx.quantity` evaluated after
        // the subtraction.
        self.cost_basis = (self.cost_basis * tx.quantity).div(quantity_before_reduction);

        if self.quantity.is_zero() {
            self.status = PositionStatus::Closed;
            self.side = PositionSide::Flat;
            self.market_value = Decimal::ZERO;
            self.unrealized_pnl = Decimal::ZERO;
        }

        Ok(())
    }

    /// Mark the market price and recompute market value, unrealized P&L, and
    /// drawdown watermarks.
    pub fn update_market_price(&mut self, price: Decimal, now: i64) -> Result<(), CoreError> {
        if !price.is_positive() {
            return Err(CoreError::validation("market price must be > 0"));
        }
        self.current_price = price;
        if !self.is_open() {
            return Ok(());
        }

        self.market_value = price * self.quantity;
        self.unrealized_pnl = match self.side {
            PositionSide::Long => (price - self.avg_entry_price) * self.quantity,
            PositionSide::Short => (self.avg_entry_price - price) * self.quantity,
            PositionSide::Flat => Decimal::ZERO,
        };

        self.max_unrealized_pnl = self.max_unrealized_pnl.max(self.unrealized_pnl);
        self.min_unrealized_pnl = self.min_unrealized_pnl.min(self.unrealized_pnl);
        self.max_drawdown = self
            .max_drawdown
            .max(self.max_unrealized_pnl - self.unrealized_pnl);

        self.updated_at = now;
        Ok(())
    }

    /// Force-close the position, folding any remaining unrealized P&L into
    /// realized P&L.
    pub fn force_close(&mut self, now: i64) {
        self.realized_pnl += self.unrealized_pnl;
        self.unrealized_pnl = Decimal::ZERO;
        self.market_value = Decimal::ZERO;
        self.quantity = Decimal::ZERO;
        self.side = PositionSide::Flat;
        self.status = PositionStatus::Closed;
        self.closed_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetType;
    use proptest::prelude::*;

    fn asset() -> Asset {
        Asset::builder("BTC", AssetType::Crypto).build().unwrap()
    }

    fn buy(qty: i64, price: i64) -> Transaction {
        Transaction {
            transaction_type: TransactionType::Buy,
            quantity: Decimal::from_i64(qty),
            price: Decimal::from_i64(price),
            fee: Decimal::ZERO,
        }
    }

    fn sell(qty: i64, price: i64) -> Transaction {
        Transaction {
            transaction_type: TransactionType::Sell,
            quantity: Decimal::from_i64(qty),
            price: Decimal::from_i64(price),
            fee: Decimal::ZERO,
        }
    }

    #[test]
    fn weighted_average_entry_after_two_buys() {
        let mut pos = Position::open("p1", asset(), buy(10, 100), 1).unwrap();
        pos.add_transaction(buy(10, 200), 2).unwrap();
        // (10*100 + 10*200) / 20 == 150
        assert_eq!(pos.avg_entry_price, Decimal::from_i64(150));
        assert_eq!(pos.quantity, Decimal::from_i64(20));
    }

    #[test]
    fn buy_n_then_sell_n_closes_with_fee_only_loss() {
        let mut pos = Position::open(
            "p1",
            asset(),
            Transaction {
                transaction_type: TransactionType::Buy,
                quantity: Decimal::from_i64(100),
                price: Decimal::from_i64(150),
                fee: Decimal::from_i64(1),
            },
            1,
        )
        .unwrap();

        pos.add_transaction(
            Transaction {
                transaction_type: TransactionType::Sell,
                quantity: Decimal::from_i64(100),
                price: Decimal::from_i64(150),
                fee: Decimal::from_i64(1),
            },
            2,
        )
        .unwrap();

        assert_eq!(pos.quantity, Decimal::ZERO);
        assert_eq!(pos.realized_pnl, Decimal::from_i64(-1));
        assert_eq!(pos.status, PositionStatus::Closed);
    }

    #[test]
    fn short_position_profit_scenario() {
        let mut pos = Position::open("p1", asset(), sell(100, 150), 1).unwrap();
        assert_eq!(pos.side, PositionSide::Short);

        pos.update_market_price(Decimal::from_i64(140), 2).unwrap();
        assert_eq!(pos.unrealized_pnl, Decimal::from_i64(1000));

        pos.add_transaction(
            Transaction {
                transaction_type: TransactionType::Buy,
                quantity: Decimal::from_i64(100),
                price: Decimal::from_i64(140),
                fee: Decimal::from_i64(1),
            },
            3,
        )
        .unwrap();

        assert_eq!(pos.realized_pnl, Decimal::from_i64(999));
        assert_eq!(pos.status, PositionStatus::Closed);
    }

    #[test]
    fn reduce_uses_quantity_before_reduction_for_cost_basis() {
        // 10 units bought at 100 with no fee: cost_basis = 1000.
        let mut pos = Position::open("p1", asset(), buy(10, 100), 1).unwrap();
        // Sell 4: cost_basis should become 1000 * 4 / 10 == 400, leaving 6 units
        // each of the original average cost ($100) still represented.
        pos.add_transaction(sell(4, 100), 2).unwrap();
        assert_eq!(pos.cost_basis, Decimal::from_i64(400));
        assert_eq!(pos.quantity, Decimal::from_i64(6));
    }

    #[test]
    fn reducing_past_zero_is_rejected() {
        let mut pos = Position::open("p1", asset(), buy(10, 100), 1).unwrap();
        assert!(pos.add_transaction(sell(11, 100), 2).is_err());
    }

    #[test]
    fn force_close_folds_unrealized_into_realized() {
        let mut pos = Position::open("p1", asset(), buy(10, 100), 1).unwrap();
        pos.update_market_price(Decimal::from_i64(110), 2).unwrap();
        pos.force_close(3);
        assert_eq!(pos.realized_pnl, Decimal::from_i64(100));
        assert_eq!(pos.quantity, Decimal::ZERO);
        assert_eq!(pos.status, PositionStatus::Closed);
    }

    #[test]
    fn drawdown_tracks_peak_to_trough_of_unrealized_pnl() {
        let mut pos = Position::open("p1", asset(), buy(10, 100), 1).unwrap();
        pos.update_market_price(Decimal::from_i64(120), 2).unwrap(); // unrealized = 200
        pos.update_market_price(Decimal::from_i64(105), 3).unwrap(); // unrealized = 50
        assert_eq!(pos.max_unrealized_pnl, Decimal::from_i64(200));
        assert_eq!(pos.max_drawdown, Decimal::from_i64(150));
    }

    proptest! {
        /// Two buys at arbitrary quantities/prices always average to a price
        /// between the two inputs, and never lose units.
        #[test]
        fn weighted_average_stays_between_the_two_fill_prices(
            qty1 in 1i64..10_000,
            price1 in 1i64..100_000,
            qty2 in 1i64..10_000,
            price2 in 1i64..100_000,
        ) {
            let mut pos = Position::open("p1", asset(), buy(qty1, price1), 1).unwrap();
            pos.add_transaction(buy(qty2, price2), 2).unwrap();

            let (lo, hi) = if price1 <= price2 { (price1, price2) } else { (price2, price1) };
            prop_assert!(pos.avg_entry_price >= Decimal::from_i64(lo));
            prop_assert!(pos.avg_entry_price <= Decimal::from_i64(hi));
            prop_assert_eq!(pos.quantity, Decimal::from_i64(qty1 + qty2));
        }

        /// Buying `qty` units then selling the same `qty` at the same price,
        /// fee-free, always returns to flat with zero realized P&L: the
        /// round trip neither manufactures nor destroys cash.
        #[test]
        fn round_trip_buy_then_sell_conserves_cash(qty in 1i64..10_000, price in 1i64..100_000) {
            let mut pos = Position::open("p1", asset(), buy(qty, price), 1).unwrap();
            pos.add_transaction(sell(qty, price), 2).unwrap();

            prop_assert_eq!(pos.realized_pnl, Decimal::ZERO);
            prop_assert_eq!(pos.quantity, Decimal::ZERO);
            prop_assert_eq!(pos.status, PositionStatus::Closed);
        }

        /// Partially reducing a position never reduces `cost_basis` by more
        /// than the fraction of quantity sold, and never leaves a negative
        /// cost basis.
        #[test]
        fn partial_reduce_keeps_cost_basis_non_negative_and_proportional(
            qty in 2i64..10_000,
            price in 1i64..100_000,
            sell_qty in 1i64..10_000,
        ) {
            // Fold into 1..qty so it is always a true partial reduce.
            let sell_qty = 1 + sell_qty % (qty - 1);
            let mut pos = Position::open("p1", asset(), buy(qty, price), 1).unwrap();
            pos.add_transaction(sell(sell_qty, price), 2).unwrap();

            prop_assert!(pos.cost_basis >= Decimal::ZERO);
            prop_assert_eq!(pos.quantity, Decimal::from_i64(qty - sell_qty));
        }
    }
}
