//! Portfolio accounting: cash balance, the position book, aggregate
//! P&L/drawdown metrics, and target-weight rebalance planning.
//!
//! A `Portfolio` owns its positions exclusively. `asset_positions`
//! is a derived view keyed by symbol, recomputed whenever the position book
//! changes — never an independent source of truth — which is how this
//! module avoids the back-reference cycles a pointer-based position index
//! would otherwise invite.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::CoreError;
use crate::position::{Position, Transaction};

/// Default depth of the bounded `metrics_history` ring (SPEC_FULL.md §2).
pub const DEFAULT_METRICS_HISTORY_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortfolioStatus {
    Active,
    Suspended,
    Closed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub total_value: Decimal,
    pub market_value: Decimal,
    pub total_cost: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub net_pnl: Decimal,
    pub return_pct: Decimal,
    pub peak_value: Decimal,
    pub current_drawdown: Decimal,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Decimal,
    pub total_positions: usize,
    pub long_positions: usize,
    pub short_positions: usize,
    pub profitable_positions: usize,
    pub losing_positions: usize,
    pub max_position_weight: Decimal,
    pub concentration_risk: Decimal,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceAction {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceInstruction {
    pub symbol: String,
    pub current_weight: Decimal,
    pub target_weight: Decimal,
    pub weight_diff: Decimal,
    pub current_value: Decimal,
    pub target_value: Decimal,
    pub value_diff: Decimal,
    pub action: RebalanceAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: String,
    pub name: String,
    pub status: PortfolioStatus,
    positions: BTreeMap<String, Position>,
    /// Derived view: asset symbol -> position id. Recomputed on every
    /// mutation, never read from independently of `positions`.
    asset_index: BTreeMap<String, String>,
    pub cash_balance: Decimal,
    pub initial_capital: Decimal,
    pub metrics: PortfolioMetrics,
    /// A bounded history of every `metrics` snapshot, newest last (SPEC_FULL.md
    /// §2's supplemental "drawdown-over-time introspection"). Capped at
    /// `metrics_history_capacity`; the oldest point drops off once full.
    metrics_history: VecDeque<PortfolioMetrics>,
    metrics_history_capacity: usize,
    pub created_at: i64,
    pub updated_at: i64,
    pub closed_at: Option<i64>,
    next_position_seq: u64,
}

impl Portfolio {
    pub fn new(id: impl Into<String>, name: impl Into<String>, initial_capital: Decimal, now: i64) -> Result<Self, CoreError> {
        if !initial_capital.is_positive() {
            return Err(CoreError::validation("initial_capital must be > 0"));
        }
        Ok(Self {
            id: id.into(),
            name: name.into(),
            status: PortfolioStatus::Active,
            positions: BTreeMap::new(),
            asset_index: BTreeMap::new(),
            cash_balance: initial_capital,
            initial_capital,
            metrics: PortfolioMetrics {
                peak_value: initial_capital,
                total_value: initial_capital,
                updated_at: now,
                ..Default::default()
            },
            metrics_history: VecDeque::new(),
            metrics_history_capacity: DEFAULT_METRICS_HISTORY_CAPACITY,
            created_at: now,
            updated_at: now,
            closed_at: None,
            next_position_seq: 0,
        })
    }

    /// A read-only view of the bounded metrics-snapshot ring, oldest first.
    pub fn metrics_history(&self) -> impl Iterator<Item = &PortfolioMetrics> {
        self.metrics_history.iter()
    }

    fn require_active(&self) -> Result<(), CoreError> {
        if self.status != PortfolioStatus::Active {
            return Err(CoreError::invalid_state(format!(
                "portfolio {:?} is not Active",
                self.status
            )));
        }
        Ok(())
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position(&self, id: &str) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn position_by_symbol(&self, symbol: &str) -> Option<&Position> {
        self.asset_index.get(symbol).and_then(|id| self.positions.get(id))
    }

    /// Open a new position from its first transaction, or add to the
    /// existing open position for that symbol if one exists. A portfolio
    /// holds at most one open position per asset.
    pub fn open_position(
        &mut self,
        asset: crate::asset::Asset,
        tx: Transaction,
        now: i64,
    ) -> Result<String, CoreError> {
        self.require_active()?;

        if let Some(existing) = self.position_by_symbol(&asset.symbol) {
            if existing.is_open() {
                return Err(CoreError::already_exists(format!(
                    "an open position already exists for {}",
                    asset.symbol
                )));
            }
        }

        self.next_position_seq += 1;
        let id = format!("{}-{}", self.id, self.next_position_seq);
        let position = Position::open(id.clone(), asset.clone(), tx, now)?;

        self.asset_index.insert(asset.symbol.clone(), id.clone());
        self.positions.insert(id.clone(), position);
        self.updated_at = now;
        self.recompute_metrics(now);
        Ok(id)
    }

    /// Apply a transaction to the open position for `symbol`.
    pub fn add_transaction(&mut self, symbol: &str, tx: Transaction, now: i64) -> Result<(), CoreError> {
        self.require_active()?;
        let id = self
            .asset_index
            .get(symbol)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("no position for symbol {}", symbol)))?;
        let position = self
            .positions
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("position id missing from book"))?;
        position.add_transaction(tx, now)?;
        self.updated_at = now;
        self.recompute_metrics(now);
        Ok(())
    }

    pub fn update_position_price(&mut self, symbol: &str, price: Decimal, now: i64) -> Result<(), CoreError> {
        let id = self
            .asset_index
            .get(symbol)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("no position for symbol {}", symbol)))?;
        let position = self
            .positions
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("position id missing from book"))?;
        position.update_market_price(price, now)?;
        self.recompute_metrics(now);
        Ok(())
    }

    pub fn update_all_prices(&mut self, prices: &BTreeMap<String, Decimal>, now: i64) -> Result<(), CoreError> {
        for (symbol, price) in prices {
            if let Some(id) = self.asset_index.get(symbol).cloned() {
                if let Some(position) = self.positions.get_mut(&id) {
                    position.update_market_price(*price, now)?;
                }
            }
        }
        self.recompute_metrics(now);
        Ok(())
    }

    pub fn add_cash(&mut self, amount: Decimal, now: i64) -> Result<(), CoreError> {
        self.require_active()?;
        if !amount.is_positive() {
            return Err(CoreError::validation("add_cash amount must be > 0"));
        }
        self.cash_balance += amount;
        self.updated_at = now;
        self.recompute_metrics(now);
        Ok(())
    }

    pub fn withdraw_cash(&mut self, amount: Decimal, now: i64) -> Result<(), CoreError> {
        self.require_active()?;
        if !amount.is_positive() {
            return Err(CoreError::validation("withdraw_cash amount must be > 0"));
        }
        if amount > self.cash_balance {
            return Err(CoreError::InsufficientFunds {
                needed: amount,
                available: self.cash_balance,
            });
        }
        self.cash_balance -= amount;
        self.updated_at = now;
        self.recompute_metrics(now);
        Ok(())
    }

    /// Apply a fill's cash delta: buys debit cash (price*qty + fee), sells
    /// credit cash (price*qty - fee). validation must reject a
    /// buy whose cost exceeds cash before this is called; this function
    /// assumes that has already happened and never fails on arithmetic.
    pub fn apply_fill_cash(&mut self, side: crate::position::TransactionType, quantity: Decimal, price: Decimal, fee: Decimal, now: i64) {
        let notional = quantity * price;
        match side {
            crate::position::TransactionType::Buy => self.cash_balance -= notional + fee,
            crate::position::TransactionType::Sell => self.cash_balance += notional - fee,
        }
        self.updated_at = now;
        self.recompute_metrics(now);
    }

    pub fn close(&mut self, now: i64) -> Result<(), CoreError> {
        if self.positions.values().any(|p| !p.quantity.is_zero()) {
            return Err(CoreError::invalid_state("cannot close portfolio with non-zero positions"));
        }
        self.status = PortfolioStatus::Closed;
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn suspend(&mut self) -> Result<(), CoreError> {
        if self.status != PortfolioStatus::Active {
            return Err(CoreError::invalid_state("only an Active portfolio may be suspended"));
        }
        self.status = PortfolioStatus::Suspended;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), CoreError> {
        if self.status != PortfolioStatus::Suspended {
            return Err(CoreError::invalid_state("only a Suspended portfolio may be resumed"));
        }
        self.status = PortfolioStatus::Active;
        Ok(())
    }

    /// Recompute every field of [`PortfolioMetrics`] from scratch (spec
    /// §4.3). Called after every mutating operation; cheap relative to fill
    /// processing since position counts are small (tens, not thousands).
    fn recompute_metrics(&mut self, now: i64) {
        let open: Vec<&Position> = self.positions.values().filter(|p| p.is_open()).collect();

        let market_value: Decimal = open.iter().fold(Decimal::ZERO, |acc, p| acc + p.market_value);
        let total_cost: Decimal = open.iter().fold(Decimal::ZERO, |acc, p| acc + p.cost_basis);
        let unrealized: Decimal = open.iter().fold(Decimal::ZERO, |acc, p| acc + p.unrealized_pnl);
        let realized: Decimal = self
            .positions
            .values()
            .fold(Decimal::ZERO, |acc, p| acc + p.realized_pnl);
        let total_fees: Decimal = self
            .positions
            .values()
            .fold(Decimal::ZERO, |acc, p| acc + p.total_fees);

        let total_value = self.cash_balance + market_value;
        let total_pnl = realized + unrealized;
        let net_pnl = total_pnl - total_fees;
        let return_pct = net_pnl.div(self.initial_capital).to_bps().div(Decimal::from_i64(100));

        let peak_value = self.metrics.peak_value.max(total_value);
        let current_drawdown = (peak_value - total_value).max(Decimal::ZERO);
        let max_drawdown = self.metrics.max_drawdown.max(current_drawdown);
        let max_drawdown_pct = if peak_value.is_positive() {
            max_drawdown.div(peak_value).to_bps().div(Decimal::from_i64(100))
        } else {
            Decimal::ZERO
        };

        let long_positions = open.iter().filter(|p| matches!(p.side, crate::position::PositionSide::Long)).count();
        let short_positions = open.iter().filter(|p| matches!(p.side, crate::position::PositionSide::Short)).count();
        let profitable_positions = open.iter().filter(|p| p.unrealized_pnl.is_positive()).count();
        let losing_positions = open.iter().filter(|p| p.unrealized_pnl.is_negative()).count();

        let (max_weight, hhi) = if market_value.is_positive() {
            let mut max_weight = Decimal::ZERO;
            let mut sum_sq = Decimal::ZERO;
            for p in &open {
                let weight = p.market_value.div(market_value);
                max_weight = max_weight.max(weight);
                sum_sq += weight * weight;
            }
            (
                max_weight.mul(Decimal::from_i64(100)),
                sum_sq.mul(Decimal::from_i64(100)),
            )
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

        self.metrics = PortfolioMetrics {
            total_value,
            market_value,
            total_cost,
            realized_pnl: realized,
            unrealized_pnl: unrealized,
            total_pnl,
            net_pnl,
            return_pct,
            peak_value,
            current_drawdown,
            max_drawdown,
            max_drawdown_pct,
            total_positions: open.len(),
            long_positions,
            short_positions,
            profitable_positions,
            losing_positions,
            max_position_weight: max_weight,
            concentration_risk: hhi,
            updated_at: now,
        };

        if self.metrics_history.len() >= self.metrics_history_capacity {
            self.metrics_history.pop_front();
        }
        self.metrics_history.push_back(self.metrics.clone());
    }

    /// Generate rebalance instructions for `targets` (symbol -> target
    /// weight in percent, summing to ~100). only symbols whose
    /// |target - current| exceeds 0.5 percentage points get an instruction;
    /// instructions are sorted by |value_diff| descending.
    pub fn rebalance(&self, targets: &BTreeMap<String, Decimal>) -> Result<Vec<RebalanceInstruction>, CoreError> {
        if self.status != PortfolioStatus::Active {
            return Err(CoreError::invalid_state("portfolio must be Active to rebalance"));
        }

        let total_value = self.metrics.total_value;
        if !total_value.is_positive() {
            return Err(CoreError::validation("portfolio value must be > 0 to rebalance"));
        }

        let weight_sum: Decimal = targets.values().fold(Decimal::ZERO, |acc, w| acc + *w);
        let deviation = (weight_sum - Decimal::from_i64(100)).abs();
        if deviation > Decimal::new(1, 2) {
            return Err(CoreError::validation(format!(
                "target weights sum to {}, expected 100 (+/- 0.01)",
                weight_sum
            )));
        }

        let half_pct = Decimal::new(5, 1); // 0.5
        let mut instructions = Vec::new();

        for (symbol, target_weight) in targets {
            let (current_value, current_weight) = match self.position_by_symbol(symbol) {
                Some(p) if p.is_open() => {
                    let value = p.market_value;
                    (value, value.div(total_value).mul(Decimal::from_i64(100)))
                }
                _ => (Decimal::ZERO, Decimal::ZERO),
            };

            let weight_diff = *target_weight - current_weight;
            if weight_diff.abs() <= half_pct {
                continue;
            }

            let target_value = target_weight.mul(total_value).div(Decimal::from_i64(100));
            let value_diff = target_value - current_value;
            let action = if value_diff.is_positive() {
                RebalanceAction::Buy
            } else if value_diff.is_negative() {
                RebalanceAction::Sell
            } else {
                RebalanceAction::Hold
            };

            instructions.push(RebalanceInstruction {
                symbol: symbol.clone(),
                current_weight,
                target_weight: *target_weight,
                weight_diff,
                current_value,
                target_value,
                value_diff,
                action,
            });
        }

        instructions.sort_by(|a, b| b.value_diff.abs().cmp(&a.value_diff.abs()));
        Ok(instructions)
    }
}
