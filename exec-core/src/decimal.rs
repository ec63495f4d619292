//! Fixed-precision decimal arithmetic — the one numeric type every money and
//! quantity field in this crate is built on.
//!
//! # Motivation
//!
//! Floating point is forbidden on any value path that touches money or order
//! quantity : `f64` rounding is non-deterministic across platforms
//! and accumulates error across thousands of fills. [`Decimal`] wraps
//! [`rust_decimal::Decimal`] (already the reference codebase's choice for
//! money fields, see `risk::types::Position`) behind a narrow newtype so the
//! arithmetic used by this crate stays exact, totally ordered, and panics
//! instead of silently wrapping on overflow.
//!
//! The slippage estimator is the sole exception : its internal
//! statistics (stdev of log returns, OLS regression) operate on `f64`
//! because they are advisory, not value-path arithmetic.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};

/// A fixed-precision decimal amount.
///
/// `Decimal` is `Copy`, totally ordered, and arithmetic never silently loses
/// precision: operations are exact within `rust_decimal`'s 96-bit mantissa.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decimal(rust_decimal::Decimal);

impl Decimal {
    pub const ZERO: Decimal = Decimal(rust_decimal::Decimal::ZERO);
    pub const ONE: Decimal = Decimal(rust_decimal::Decimal::ONE);

    /// Construct `num * 10^-scale`. Panics if `scale > 28`, matching
    /// `rust_decimal::Decimal::new`.
    #[inline]
    pub fn new(num: i64, scale: u32) -> Self {
        Decimal(rust_decimal::Decimal::new(num, scale))
    }

    /// Construct from an integer with zero fractional part.
    #[inline]
    pub fn from_i64(value: i64) -> Self {
        Decimal(rust_decimal::Decimal::from(value))
    }

    /// Construct from an `f64`. Used only at the boundary with the slippage
    /// estimator's statistical output, never on a value path that feeds
    /// orders, fills, or portfolio state.
    pub fn from_f64(value: f64) -> Option<Self> {
        rust_decimal::Decimal::from_f64_retain(value).map(Decimal)
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    #[inline]
    pub fn abs(self) -> Self {
        Decimal(self.0.abs())
    }

    #[inline]
    pub fn neg(self) -> Self {
        Decimal(-self.0)
    }

    #[inline]
    pub fn add(self, rhs: Decimal) -> Self {
        Decimal(self.0 + rhs.0)
    }

    #[inline]
    pub fn sub(self, rhs: Decimal) -> Self {
        Decimal(self.0 - rhs.0)
    }

    #[inline]
    pub fn mul(self, rhs: Decimal) -> Self {
        Decimal(self.0 * rhs.0)
    }

    /// Exact division. Panics on division by zero — callers on a value path
    /// must never divide by a quantity that can be zero without checking
    /// `is_zero()` first (e.g. average entry price is undefined at zero
    /// quantity).
    #[inline]
    pub fn div(self, rhs: Decimal) -> Self {
        Decimal(self.0 / rhs.0)
    }

    pub fn checked_div(self, rhs: Decimal) -> Option<Self> {
        if rhs.is_zero() {
            None
        } else {
            Some(Decimal(self.0 / rhs.0))
        }
    }

    pub fn min(self, other: Decimal) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Decimal) -> Self {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// Round to `precision` fractional digits, half-away-from-zero, matching
    /// the tick-size rounding an order's price undergoes at build time.
    pub fn round_dp(self, precision: u32) -> Self {
        Decimal(self.0.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Round to the nearest multiple of `tick`. `tick` must be positive.
    pub fn round_to_tick(self, tick: Decimal) -> Self {
        if tick.is_zero() {
            return self;
        }
        let ticks = (self.0 / tick.0).round();
        Decimal(ticks * tick.0)
    }

    /// Raise to an integer power. Used by the slippage estimator's time-decay
    /// factor: `(1 + time_decay_factor) ^ (age_minutes - 1)`.
    pub fn powi(self, exp: i64) -> Self {
        Decimal(self.0.powi(exp))
    }

    pub fn sqrt(self) -> Option<Self> {
        self.0.sqrt().map(Decimal)
    }

    pub fn to_i64(self) -> Option<i64> {
        self.0.to_i64()
    }

    /// Basis points: multiply a fraction by 10,000.
    pub fn to_bps(self) -> Self {
        self.mul(Decimal::from_i64(10_000))
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Decimal::ZERO
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({})", self.0)
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        rust_decimal::Decimal::from_str(s).map(Decimal)
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;
    fn add(self, rhs: Decimal) -> Decimal {
        Decimal::add(self, rhs)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;
    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal::sub(self, rhs)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;
    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal::mul(self, rhs)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;
    fn div(self, rhs: Decimal) -> Decimal {
        Decimal::div(self, rhs)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;
    fn neg(self) -> Decimal {
        Decimal::neg(self)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        *self = *self + rhs;
    }
}

impl std::ops::SubAssign for Decimal {
    fn sub_assign(&mut self, rhs: Decimal) {
        *self = *self - rhs;
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal::from_i64(value)
    }
}

impl From<i32> for Decimal {
    fn from(value: i32) -> Self {
        Decimal::from_i64(value as i64)
    }
}

/// Total ordering is already provided by `#[derive(Ord)]` over
/// `rust_decimal::Decimal`, which orders by mathematical value. Exposed
/// explicitly here since it is an invariant worth a regression test, not
/// just an incidental derive.
pub fn total_order(a: Decimal, b: Decimal) -> Ordering {
    a.cmp(&b)
}

impl From<rust_decimal::Decimal> for Decimal {
    fn from(value: rust_decimal::Decimal) -> Self {
        Decimal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use proptest::prelude::*;

    #[test]
    fn addition_is_exact() {
        let a = Decimal::from_str("150.05").unwrap();
        let b = Decimal::from_str("0.01").unwrap();
        assert_eq!(a.add(b), Decimal::from_str("150.06").unwrap());
    }

    #[test]
    fn total_ordering_holds() {
        let a = Decimal::from_str("1.1").unwrap();
        let b = Decimal::from_str("1.10000001").unwrap();
        assert_eq!(total_order(a, b), Ordering::Less);
        assert!(a < b);
    }

    #[test]
    fn rounds_to_tick_size() {
        let price = Decimal::from_str("150.073").unwrap();
        let tick = Decimal::from_str("0.05").unwrap();
        assert_eq!(price.round_to_tick(tick), Decimal::from_str("150.05").unwrap());
    }

    #[test]
    fn predicates() {
        assert!(Decimal::ZERO.is_zero());
        assert!(!Decimal::ZERO.is_positive());
        assert!(!Decimal::ZERO.is_negative());
        assert!(Decimal::from_i64(5).is_positive());
        assert!(Decimal::from_i64(-5).is_negative());
    }

    #[test]
    fn checked_div_guards_zero() {
        assert!(Decimal::from_i64(5).checked_div(Decimal::ZERO).is_none());
        assert_eq!(
            Decimal::from_i64(10).checked_div(Decimal::from_i64(2)).unwrap(),
            Decimal::from_i64(5)
        );
    }

    #[test]
    fn weighted_average_formula_is_exact() {
        // (100*150.00 + 50*150.10) / 150 == 150.0333...
        let q1 = Decimal::from_i64(100);
        let p1 = Decimal::from_str("150.00").unwrap();
        let q2 = Decimal::from_i64(50);
        let p2 = Decimal::from_str("150.10").unwrap();
        let total_qty = q1 + q2;
        let avg = (q1 * p1 + q2 * p2).div(total_qty);
        assert_eq!(avg.round_dp(4), Decimal::from_str("150.0333").unwrap());
    }

    proptest! {
        /// Addition is commutative for any two integer-valued amounts.
        #[test]
        fn add_is_commutative(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let a = Decimal::from_i64(a);
            let b = Decimal::from_i64(b);
            prop_assert_eq!(a + b, b + a);
        }

        /// `x - x` is always zero, for any representable amount.
        #[test]
        fn subtracting_self_is_zero(value in -1_000_000i64..1_000_000) {
            let d = Decimal::from_i64(value);
            prop_assert_eq!(d - d, Decimal::ZERO);
        }

        /// Total ordering agrees with the underlying integer ordering.
        #[test]
        fn ordering_matches_integer_ordering(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let da = Decimal::from_i64(a);
            let db = Decimal::from_i64(b);
            prop_assert_eq!(da.cmp(&db), a.cmp(&b));
        }
    }
}
