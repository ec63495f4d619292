//! Slippage Estimator: a read-side advisor that prices the expected gap
//! between an order's reference price and its likely execution price, in
//! basis points.
//!
//! The estimator never mutates an order — it only ever reads a
//! [`MarketData`] snapshot and, optionally, a per-symbol price history it
//! maintains internally. A single lock guards that history, the volatility
//! cache, the liquidity profile, the market regime, and the calibrated
//! impact models, keyed per symbol.
//!
//! Every factor is value-path Decimal arithmetic except the annualized
//! volatility estimate and the OLS calibration, which are allowed to use
//! `f64` since they are statistics, not money.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::{CoreError, CoreResult};
use crate::order::{Order, OrderType, Side};
use crate::ports::MarketData;

/// Overlay applied on top of the calibrated-model estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketRegime {
    Normal,
    Elevated,
    Volatile,
}

impl MarketRegime {
    fn adjustment(self) -> Decimal {
        match self {
            MarketRegime::Normal => Decimal::new(10, 1),
            MarketRegime::Elevated => Decimal::new(12, 1),
            MarketRegime::Volatile => Decimal::new(15, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketTrend {
    Up,
    Down,
    Sideways,
}

/// `{regime, trend, stress}`, updated by an external caller (a strategy, a
/// risk desk process) — this module never infers it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: MarketRegime,
    pub trend: MarketTrend,
    /// Fractional stress level in `[0, 1]`.
    pub stress: Decimal,
}

impl Default for RegimeState {
    fn default() -> Self {
        Self {
            regime: MarketRegime::Normal,
            trend: MarketTrend::Sideways,
            stress: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageConfig {
    pub base_bps: Decimal,
    pub liquidity_factor: Decimal,
    pub volatility_multiplier: Decimal,
    pub time_decay_factor: Decimal,
    /// Ring buffer size for the per-symbol price history ("bounded
    /// history ring, default 50 points").
    pub history_capacity: usize,
    pub volatility_cache_ttl: Duration,
    /// Minimum ring occupancy before a stdev is trusted over the 1bp default.
    pub min_history_for_volatility: usize,
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            base_bps: Decimal::new(5, 1),
            liquidity_factor: Decimal::from_i64(2),
            volatility_multiplier: Decimal::ONE,
            time_decay_factor: Decimal::new(5, 2),
            history_capacity: 50,
            volatility_cache_ttl: Duration::from_secs(60),
            min_history_for_volatility: 5,
        }
    }
}

/// One historical execution sample used to calibrate a per-symbol impact
/// model.
#[derive(Debug, Clone, Copy)]
pub struct ImpactSample {
    pub order_size_ratio: f64,
    pub realized_slippage: f64,
}

/// A calibrated linear/square-root impact model for one symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImpactModel {
    pub linear_impact: Decimal,
    pub sqrt_impact: Decimal,
    pub temp_impact: Decimal,
    pub perm_impact: Decimal,
    pub confidence: Decimal,
}

struct SymbolHistory {
    prices: VecDeque<f64>,
    capacity: usize,
    cached_vol_bps: f64,
    cached_at: i64,
    dirty: bool,
    avg_bid_size: Decimal,
    avg_ask_size: Decimal,
    liquidity_samples: u32,
}

impl SymbolHistory {
    fn new(capacity: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(capacity),
            capacity,
            cached_vol_bps: 1.0,
            cached_at: i64::MIN,
            dirty: true,
            avg_bid_size: Decimal::ZERO,
            avg_ask_size: Decimal::ZERO,
            liquidity_samples: 0,
        }
    }

    fn push_price(&mut self, price: f64) {
        if self.prices.len() >= self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back(price);
        self.dirty = true;
    }

    fn record_liquidity(&mut self, bid_size: Decimal, ask_size: Decimal) {
        let n = Decimal::from_i64(self.liquidity_samples as i64 + 1);
        self.avg_bid_size = (self.avg_bid_size * Decimal::from_i64(self.liquidity_samples as i64) + bid_size).div(n);
        self.avg_ask_size = (self.avg_ask_size * Decimal::from_i64(self.liquidity_samples as i64) + ask_size).div(n);
        self.liquidity_samples += 1;
    }

    /// Annualized stdev of log returns, expressed in basis points. A
    /// dirty flag invalidates the cache on new data; otherwise it is
    /// recomputed once its TTL (default 1 minute) elapses.
    fn volatility_bps(&mut self, now: i64, ttl: Duration, min_history: usize) -> f64 {
        let stale = !self.dirty && now.saturating_sub(self.cached_at) >= ttl.as_nanos() as i64;
        if !self.dirty && !stale {
            return self.cached_vol_bps;
        }

        if self.prices.len() < min_history.max(2) {
            self.cached_vol_bps = 1.0;
        } else {
            let log_returns: Vec<f64> = self
                .prices
                .iter()
                .zip(self.prices.iter().skip(1))
                .filter(|(p1, _)| **p1 > 0.0)
                .map(|(p1, p2)| (p2 / p1).ln())
                .collect();

            if log_returns.len() < 2 {
                self.cached_vol_bps = 1.0;
            } else {
                let mean = log_returns.iter().sum::<f64>() / log_returns.len() as f64;
                let variance = log_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / log_returns.len() as f64;
                let stdev = variance.sqrt();
                // Annualize assuming one observation per trading day.
                let annualized = stdev * 252f64.sqrt();
                self.cached_vol_bps = (annualized * 10_000.0).max(0.0);
            }
        }

        self.cached_at = now;
        self.dirty = false;
        self.cached_vol_bps
    }
}

struct Inner {
    histories: HashMap<String, SymbolHistory>,
    regime: RegimeState,
    models: HashMap<String, ImpactModel>,
}

/// The multi-factor slippage model.
pub struct SlippageEstimator {
    config: SlippageConfig,
    inner: RwLock<Inner>,
}

impl SlippageEstimator {
    pub fn new(config: SlippageConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                histories: HashMap::new(),
                regime: RegimeState::default(),
                models: HashMap::new(),
            }),
        }
    }

    fn history_capacity(&self) -> usize {
        self.config.history_capacity
    }

    /// Feed a trade price into a symbol's ring buffer, dirtying its
    /// volatility cache.
    pub fn record_trade(&self, symbol: &str, price: Decimal, _now: i64) {
        let mut inner = self.inner.write();
        let capacity = self.history_capacity();
        let history = inner
            .histories
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolHistory::new(capacity));
        history.push_price(price.to_f64());
    }

    /// Feed a liquidity observation, supplementing `MarketData` sizes for
    /// `estimate_with_model`'s `avg_volume` default.
    pub fn record_liquidity(&self, symbol: &str, bid_size: Decimal, ask_size: Decimal) {
        let mut inner = self.inner.write();
        let capacity = self.history_capacity();
        let history = inner
            .histories
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolHistory::new(capacity));
        history.record_liquidity(bid_size, ask_size);
    }

    pub fn set_regime(&self, regime: RegimeState) {
        self.inner.write().regime = regime;
    }

    pub fn regime(&self) -> RegimeState {
        self.inner.read().regime
    }

    /// Estimate slippage in bps for `order` against `market`.
    pub fn estimate(&self, order: &Order, market: &MarketData, symbol: &str, now: i64) -> CoreResult<Decimal> {
        if market.bid_size.is_zero() && market.ask_size.is_zero() {
            return Err(CoreError::insufficient_liquidity(format!(
                "no liquidity for {}: bid_size and ask_size are both zero",
                symbol
            )));
        }

        let crossed = market.bid_price > market.ask_price;
        let base = self.config.base_bps.div(Decimal::from_i64(10_000));

        let liquidity = self.liquidity_factor(order, market, base);
        let volatility = self.volatility_factor(symbol, now);
        let decay = self.time_decay_factor(market, now, base);
        let order_type_adj = self.order_type_factor(order, market);

        let total_fractional = base + liquidity + volatility + decay + order_type_adj;
        let bps = total_fractional.mul(Decimal::from_i64(10_000));

        if crossed {
            Ok(bps)
        } else {
            Ok(bps.max(Decimal::ZERO))
        }
    }

    fn liquidity_factor(&self, order: &Order, market: &MarketData, base: Decimal) -> Decimal {
        let avail = match order.side {
            Side::Buy => market.ask_size,
            Side::Sell => market.bid_size,
        };

        if avail.is_zero() {
            return base.mul(Decimal::from_i64(5));
        }

        let ratio = order.quantity.div(avail);
        let half = Decimal::new(5, 1);
        let one = Decimal::ONE;

        if ratio <= half {
            Decimal::new(1, 1).div(Decimal::from_i64(10_000))
        } else if ratio <= one {
            ratio.mul(self.config.liquidity_factor).mul(base)
        } else {
            ratio.mul(self.config.liquidity_factor).mul(base).mul(Decimal::from_i64(2))
        }
    }

    fn volatility_factor(&self, symbol: &str, now: i64) -> Decimal {
        let mut inner = self.inner.write();
        let capacity = self.history_capacity();
        let ttl = self.config.volatility_cache_ttl;
        let min_history = self.config.min_history_for_volatility;
        let history = inner
            .histories
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolHistory::new(capacity));
        let vol_bps = history.volatility_bps(now, ttl, min_history);

        let vol_bps_decimal = Decimal::from_f64(vol_bps).unwrap_or(Decimal::ONE);
        vol_bps_decimal.mul(self.config.volatility_multiplier).div(Decimal::from_i64(10_000))
    }

    fn time_decay_factor(&self, market: &MarketData, now: i64, base: Decimal) -> Decimal {
        let age_nanos = now.saturating_sub(market.timestamp).max(0);
        let age_minutes = age_nanos / 60_000_000_000;
        if age_minutes <= 1 {
            return Decimal::ZERO;
        }

        let growth = Decimal::ONE + self.config.time_decay_factor;
        let exponent = age_minutes - 1;
        let factor = growth.powi(exponent) - Decimal::ONE;
        factor.mul(base)
    }

    fn order_type_factor(&self, order: &Order, market: &MarketData) -> Decimal {
        match order.order_type {
            OrderType::Market => {
                let mid = (market.bid_price + market.ask_price).div(Decimal::from_i64(2));
                if mid.is_zero() {
                    return Decimal::ZERO;
                }
                (market.ask_price - market.bid_price).div(mid).div(Decimal::from_i64(2))
            }
            OrderType::Limit => {
                let limit_price = match order.price {
                    Some(p) => p,
                    None => return Decimal::ZERO,
                };
                let passive = match order.side {
                    Side::Buy => limit_price <= market.bid_price,
                    Side::Sell => limit_price >= market.ask_price,
                };
                let aggressive = match order.side {
                    Side::Buy => limit_price >= market.ask_price,
                    Side::Sell => limit_price <= market.bid_price,
                };

                if aggressive && !passive {
                    let reference = (market.bid_price + market.ask_price).div(Decimal::from_i64(2));
                    if reference.is_zero() {
                        Decimal::ZERO
                    } else {
                        (limit_price - reference).abs().div(reference)
                    }
                } else {
                    Decimal::new(5, 2).div(Decimal::from_i64(10_000))
                }
            }
            OrderType::Stop | OrderType::StopLimit | OrderType::TrailingStop => Decimal::ZERO,
        }
    }

    /// Calibrate a per-symbol impact model from historical execution samples
    /// via ordinary least squares. Requires at least 10 samples;
    /// fails with a "singular matrix" validation error when the regression's
    /// denominator `n*sum(x^2) - sum(x)^2` is zero (degenerate input, e.g.
    /// every sample has the same `order_size_ratio`).
    pub fn calibrate(&self, symbol: &str, samples: &[ImpactSample]) -> CoreResult<ImpactModel> {
        if samples.len() < 10 {
            return Err(CoreError::validation(format!(
                "calibration requires at least 10 samples, got {}",
                samples.len()
            )));
        }

        let n = samples.len() as f64;
        let sum_x: f64 = samples.iter().map(|s| s.order_size_ratio).sum();
        let sum_y: f64 = samples.iter().map(|s| s.realized_slippage).sum();
        let sum_xy: f64 = samples.iter().map(|s| s.order_size_ratio * s.realized_slippage).sum();
        let sum_x2: f64 = samples.iter().map(|s| s.order_size_ratio.powi(2)).sum();

        let denom = n * sum_x2 - sum_x * sum_x;
        if denom.abs() < f64::EPSILON {
            return Err(CoreError::validation("singular matrix: order_size_ratio samples have no variance"));
        }

        let slope = (n * sum_xy - sum_x * sum_y) / denom;
        let intercept = (sum_y - slope * sum_x) / n;

        let mean_y = sum_y / n;
        let ss_tot: f64 = samples.iter().map(|s| (s.realized_slippage - mean_y).powi(2)).sum();
        let ss_res: f64 = samples
            .iter()
            .map(|s| {
                let predicted = slope * s.order_size_ratio + intercept;
                (s.realized_slippage - predicted).powi(2)
            })
            .sum();
        let r_squared = if ss_tot.abs() < f64::EPSILON { 0.0 } else { 1.0 - ss_res / ss_tot };

        let linear_impact = Decimal::from_f64(slope).unwrap_or(Decimal::ZERO);
        let sqrt_impact = linear_impact.mul(Decimal::new(6, 1));
        let temp_impact = linear_impact.mul(Decimal::new(7, 1));
        let perm_impact = linear_impact.mul(Decimal::new(3, 1));
        let confidence = Decimal::from_f64(r_squared.max(0.0))
            .unwrap_or(Decimal::ZERO)
            .mul(Decimal::ONE.min(Decimal::from_i64(samples.len() as i64).div(Decimal::from_i64(50))));

        let model = ImpactModel {
            linear_impact,
            sqrt_impact,
            temp_impact,
            perm_impact,
            confidence,
        };
        self.inner.write().models.insert(symbol.to_string(), model);
        Ok(model)
    }

    pub fn model_for(&self, symbol: &str) -> Option<ImpactModel> {
        self.inner.read().models.get(symbol).copied()
    }

    /// Estimate slippage using a calibrated model, gated on `confidence >=
    /// 0.3`. Falls back to an error if no model has been
    /// calibrated or confidence is too low.
    pub fn estimate_with_model(&self, symbol: &str, order: &Order, avg_volume: Decimal) -> CoreResult<Decimal> {
        let model = self
            .model_for(symbol)
            .ok_or_else(|| CoreError::not_found(format!("no calibrated impact model for {}", symbol)))?;

        let min_confidence = Decimal::new(3, 1);
        if model.confidence < min_confidence {
            return Err(CoreError::validation(format!(
                "calibrated model confidence {} below 0.3 minimum",
                model.confidence
            )));
        }

        if avg_volume.is_zero() {
            return Err(CoreError::validation("avg_volume must be > 0"));
        }
        let r = order.quantity.div(avg_volume);
        let sqrt_r = r.sqrt().unwrap_or(Decimal::ZERO);

        let regime = self.regime();
        let stress_adj = Decimal::ONE + regime.stress.div(Decimal::from_i64(2));

        let base_estimate = model.linear_impact.mul(r) + model.sqrt_impact.mul(sqrt_r);
        let adjusted = base_estimate.mul(regime.regime.adjustment()).mul(stress_adj);
        Ok(adjusted.mul(Decimal::from_i64(10_000)))
    }
}
