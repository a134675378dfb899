//! Display-only price lookup.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::{Error, Result};

/// USD quote for a token symbol. Never consulted for signing.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_price(&self, symbol: &str) -> Result<Decimal>;
}

/// Fixed prices, keyed case-insensitively by symbol.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource {
    prices: HashMap<String, Decimal>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, usd: Decimal) -> Self {
        self.prices.insert(symbol.to_ascii_uppercase(), usd);
        self
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        self.prices
            .get(&symbol.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| Error::Input(format!("no price for {}", symbol)))
    }
}
