//! Gas price estimation and fee arithmetic.

use alloy_primitives::U256;
use limit_order_core::api::ChainRpc;
use limit_order_core::types::format_native;
use limit_order_core::{Error, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const GWEI: u128 = 1_000_000_000;

/// Gas settings for fill transactions.
#[derive(Debug, Clone)]
pub struct GasConfig {
    /// Percentage added on top of `eth_gasPrice`.
    pub boost_percent: u32,
    /// Gas budget for one `fillOrder` call.
    pub gas_limit: u64,
    /// Tip per gas, in wei.
    pub priority_fee: u128,
    /// Headroom over the base fee, as a percentage of the base fee.
    pub max_fee_buffer_percent: u32,
    /// Native balance below which submission is refused regardless of the fee estimate.
    pub min_native_balance: U256,
    /// Timeout for the gas price query.
    pub call_timeout: Duration,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            boost_percent: 20,
            gas_limit: 400_000,
            priority_fee: 30 * GWEI,
            max_fee_buffer_percent: 25,
            // 0.01 POL
            min_native_balance: U256::from(10_000_000_000_000_000u64),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// EIP-1559 fee parameters for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasQuote {
    /// Boosted network gas price used as the base fee.
    pub base_fee: u128,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
}

impl GasQuote {
    /// Worst-case fee: `maxFeePerGas * gasLimit`.
    pub fn max_fee(&self) -> Result<FeeEstimate> {
        calculate_fee(self.max_fee_per_gas, self.gas_limit)
    }
}

/// A fee in wei and in native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub wei: U256,
    pub native: Decimal,
}

/// `price * gas_limit`, in wei and in native units.
pub fn calculate_fee(price: u128, gas_limit: u64) -> Result<FeeEstimate> {
    let wei = U256::from(price) * U256::from(gas_limit);
    Ok(FeeEstimate {
        wei,
        native: format_native(wei)?,
    })
}

/// Derives fee quotes from the node's current gas price.
#[derive(Clone)]
pub struct GasEstimator {
    rpc: Arc<dyn ChainRpc>,
    config: GasConfig,
}

impl GasEstimator {
    pub fn new(rpc: Arc<dyn ChainRpc>, config: GasConfig) -> Self {
        Self { rpc, config }
    }

    pub fn config(&self) -> &GasConfig {
        &self.config
    }

    /// Current network gas price with the configured boost applied.
    pub async fn estimate_gas_price(&self) -> Result<u128> {
        let price = tokio::time::timeout(self.config.call_timeout, self.rpc.gas_price())
            .await
            .map_err(|_| Error::timeout("eth_gasPrice", self.config.call_timeout.as_secs()))??;

        let boosted = price.saturating_add(price.saturating_mul(self.config.boost_percent as u128) / 100);
        debug!(network_price = price, boosted, "Estimated gas price");
        Ok(boosted)
    }

    /// Full fee quote from the current network price.
    pub async fn quote(&self) -> Result<GasQuote> {
        let base_fee = self.estimate_gas_price().await?;
        Ok(self.quote_from_base_fee(base_fee))
    }

    /// `maxFee = base + priority + buffer% of base`.
    pub fn quote_from_base_fee(&self, base_fee: u128) -> GasQuote {
        let priority = self.config.priority_fee;
        let buffer = base_fee.saturating_mul(self.config.max_fee_buffer_percent as u128) / 100;
        GasQuote {
            base_fee,
            max_priority_fee_per_gas: priority,
            max_fee_per_gas: base_fee.saturating_add(priority).saturating_add(buffer),
            gas_limit: self.config.gas_limit,
        }
    }

    /// Native balance the maker must hold: the worst-case fee, but never
    /// less than the configured floor.
    pub fn required_balance(&self, quote: &GasQuote) -> Result<U256> {
        Ok(quote.max_fee()?.wei.max(self.config.min_native_balance))
    }
}

impl std::fmt::Debug for GasEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GasEstimator")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;

    fn estimator(price: u128) -> GasEstimator {
        let mut rpc = MockChain::new();
        rpc.expect_gas_price().returning(move || Ok(price));
        GasEstimator::new(Arc::new(rpc), GasConfig::default())
    }

    #[tokio::test]
    async fn test_boost_applied() {
        let price = estimator(100 * GWEI).estimate_gas_price().await.unwrap();
        assert_eq!(price, 120 * GWEI);
    }

    #[tokio::test]
    async fn test_quote() {
        let quote = estimator(100 * GWEI).quote().await.unwrap();
        assert_eq!(quote.base_fee, 120 * GWEI);
        assert_eq!(quote.max_priority_fee_per_gas, 30 * GWEI);
        // 120 + 30 + 30
        assert_eq!(quote.max_fee_per_gas, 180 * GWEI);
        assert_eq!(quote.gas_limit, 400_000);
    }

    #[tokio::test]
    async fn test_rpc_failure_propagates() {
        let mut rpc = MockChain::new();
        rpc.expect_gas_price()
            .returning(|| Err(Error::network("connection refused")));
        let estimator = GasEstimator::new(Arc::new(rpc), GasConfig::default());
        assert!(estimator.quote().await.unwrap_err().is_network());
    }

    #[test]
    fn test_calculate_fee() {
        let fee = calculate_fee(30 * GWEI, 400_000).unwrap();
        assert_eq!(fee.wei, U256::from(12_000_000_000_000_000u64));
        assert_eq!(fee.native, Decimal::new(12, 3));
    }

    #[test]
    fn test_required_balance_floor() {
        // 0.05 native, above the ~0.012 worst case of a near-zero base fee.
        let floor = U256::from(50_000_000_000_000_000u64);
        let config = GasConfig {
            min_native_balance: floor,
            ..GasConfig::default()
        };
        let estimator = GasEstimator::new(Arc::new(MockChain::new()), config);

        let cheap = estimator.quote_from_base_fee(1);
        assert!(cheap.max_fee().unwrap().wei < floor);
        assert_eq!(estimator.required_balance(&cheap).unwrap(), floor);

        let pricey = estimator.quote_from_base_fee(1_000 * GWEI);
        assert!(pricey.max_fee().unwrap().wei > floor);
        assert_eq!(
            estimator.required_balance(&pricey).unwrap(),
            pricey.max_fee().unwrap().wei
        );
    }
}
