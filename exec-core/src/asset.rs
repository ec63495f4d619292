//! Tradable instrument metadata.
//!
//! `Asset` carries the per-instrument configuration the rest of the crate
//! needs to validate and price an order: tick size, lot-size bounds,
//! currency, and the decimal precision prices/quantities round to. It has
//! no behavior beyond construction-time validation and identity — it is a
//! value type, copied freely into `Order` and `Position`.

use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    Stock,
    Crypto,
    Forex,
    Future,
    Option,
    Bond,
    Etf,
    Commodity,
}

impl AssetType {
    /// Asset-type-dependent default precision
    pub fn default_precision(self) -> u32 {
        match self {
            AssetType::Stock => 2,
            AssetType::Crypto => 8,
            AssetType::Forex => 5,
            AssetType::Future => 2,
            AssetType::Option => 2,
            AssetType::Bond => 3,
            AssetType::Etf => 2,
            AssetType::Commodity => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    pub asset_type: AssetType,
    pub exchange: String,
    pub currency: String,
    pub precision: u32,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub tick_size: Decimal,
    pub is_active: bool,
}

/// Builder enforcing asset invariants at construction time rather than
/// scattering validation across every call site that builds an `Asset`.
#[derive(Debug, Clone)]
pub struct AssetBuilder {
    symbol: String,
    name: String,
    asset_type: AssetType,
    exchange: String,
    currency: String,
    precision: Option<u32>,
    min_qty: Decimal,
    max_qty: Decimal,
    tick_size: Decimal,
    is_active: bool,
}

impl AssetBuilder {
    pub fn new(symbol: impl Into<String>, asset_type: AssetType) -> Self {
        Self {
            symbol: symbol.into(),
            name: String::new(),
            asset_type,
            exchange: String::new(),
            currency: "USD".to_string(),
            precision: None,
            min_qty: Decimal::ZERO,
            max_qty: Decimal::from_i64(1_000_000_000),
            tick_size: Decimal::new(1, 2),
            is_active: true,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn min_qty(mut self, min_qty: Decimal) -> Self {
        self.min_qty = min_qty;
        self
    }

    pub fn max_qty(mut self, max_qty: Decimal) -> Self {
        self.max_qty = max_qty;
        self
    }

    pub fn tick_size(mut self, tick_size: Decimal) -> Self {
        self.tick_size = tick_size;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn build(self) -> Result<Asset, CoreError> {
        if self.symbol.is_empty()
            || self.symbol.len() > 20
            || !self
                .symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'))
        {
            return Err(CoreError::validation(format!(
                "asset symbol '{}' must match [A-Za-z0-9._/-]{{1,20}}",
                self.symbol
            )));
        }

        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::validation(format!(
                "currency '{}' must be three letters",
                self.currency
            )));
        }

        let precision = self.precision.unwrap_or_else(|| self.asset_type.default_precision());
        if precision > 18 {
            return Err(CoreError::validation("precision must be in [0, 18]"));
        }

        if !self.max_qty.is_positive() {
            return Err(CoreError::validation("max_qty must be > 0"));
        }
        if self.min_qty.is_negative() {
            return Err(CoreError::validation("min_qty must be >= 0"));
        }
        if self.min_qty > self.max_qty {
            return Err(CoreError::validation("min_qty must be <= max_qty"));
        }
        if !self.tick_size.is_positive() {
            return Err(CoreError::validation("tick_size must be > 0"));
        }

        Ok(Asset {
            symbol: self.symbol,
            name: self.name,
            asset_type: self.asset_type,
            exchange: self.exchange,
            currency: self.currency.to_ascii_uppercase(),
            precision,
            min_qty: self.min_qty,
            max_qty: self.max_qty,
            tick_size: self.tick_size,
            is_active: self.is_active,
        })
    }
}

impl Asset {
    pub fn builder(symbol: impl Into<String>, asset_type: AssetType) -> AssetBuilder {
        AssetBuilder::new(symbol, asset_type)
    }

    /// Identity is `exchange:symbol`, or the bare symbol when no exchange is
    /// set.
    pub fn identity(&self) -> String {
        if self.exchange.is_empty() {
            self.symbol.clone()
        } else {
            format!("{}:{}", self.exchange, self.symbol)
        }
    }

    /// Round a price to this asset's tick size.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        price.round_to_tick(self.tick_size)
    }

    pub fn validate_quantity(&self, quantity: Decimal) -> Result<(), CoreError> {
        if !quantity.is_positive() {
            return Err(CoreError::validation("quantity must be > 0"));
        }
        if quantity < self.min_qty {
            return Err(CoreError::validation(format!(
                "quantity {} below asset minimum {}",
                quantity, self.min_qty
            )));
        }
        if quantity > self.max_qty {
            return Err(CoreError::validation(format!(
                "quantity {} above asset maximum {}",
                quantity, self.max_qty
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Asset {
        Asset::builder("AAPL", AssetType::Stock)
            .exchange("NASDAQ")
            .tick_size(Decimal::new(1, 2))
            .build()
            .unwrap()
    }

    #[test]
    fn identity_includes_exchange_when_present() {
        assert_eq!(sample().identity(), "NASDAQ:AAPL");
    }

    #[test]
    fn identity_is_bare_symbol_without_exchange() {
        let asset = Asset::builder("AAPL", AssetType::Stock).build().unwrap();
        assert_eq!(asset.identity(), "AAPL");
    }

    #[test]
    fn rejects_malformed_symbol() {
        assert!(Asset::builder("", AssetType::Stock).build().is_err());
        assert!(Asset::builder("bad symbol!", AssetType::Stock).build().is_err());
    }

    #[test]
    fn rejects_bad_currency() {
        assert!(Asset::builder("AAPL", AssetType::Stock)
            .currency("US")
            .build()
            .is_err());
    }

    #[test]
    fn rejects_min_greater_than_max() {
        assert!(Asset::builder("AAPL", AssetType::Stock)
            .min_qty(Decimal::from_i64(100))
            .max_qty(Decimal::from_i64(10))
            .build()
            .is_err());
    }

    #[test]
    fn default_precision_is_asset_type_dependent() {
        let stock = Asset::builder("AAPL", AssetType::Stock).build().unwrap();
        let crypto = Asset::builder("BTC", AssetType::Crypto).build().unwrap();
        assert_eq!(stock.precision, 2);
        assert_eq!(crypto.precision, 8);
    }

    #[test]
    fn rounds_price_to_tick() {
        let asset = sample();
        assert_eq!(asset.round_price(Decimal::new(150073, 3)), Decimal::new(15007, 2));
    }
}
