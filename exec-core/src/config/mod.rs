//! Top-level runtime configuration, aggregating every component's own
//! `*Config` type behind one `serde`-deserializable struct (SPEC_FULL.md
//! §1). Each component also accepts its config type directly at
//! construction — this aggregate exists for callers (the paper-trading
//! demo, the operator CLI) that want to load every knob from one TOML/JSON
//! document instead of wiring each component by hand.

use serde::{Deserialize, Serialize};

use crate::execution::ExecutionConfig;
use crate::integration::IntegrationConfig;
use crate::oms::OmsConfig;
use crate::portfolio_service::PortfolioConfig;
use crate::slippage::SlippageConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub oms: OmsConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub slippage: SlippageConfig,
    #[serde(default)]
    pub integration: IntegrationConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
}
