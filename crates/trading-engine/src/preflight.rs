//! Read-only checks run before spending a broadcast.
//!
//! Both checks must pass. A check whose query fails or times out blocks
//! submission exactly like an insufficient balance would, but is reported as
//! unavailable rather than insufficient.

use alloy_primitives::{Address, U256};
use limit_order_core::api::ChainRpc;
use limit_order_core::signing::Order;
use limit_order_core::{Error, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of one preflight check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Sufficient { have: U256, need: U256 },
    Insufficient { have: U256, need: U256 },
    /// The query failed; sufficiency is unknown.
    Unavailable(String),
}

impl CheckOutcome {
    fn compare(have: U256, need: U256) -> Self {
        if have >= need {
            CheckOutcome::Sufficient { have, need }
        } else {
            CheckOutcome::Insufficient { have, need }
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, CheckOutcome::Sufficient { .. })
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Sufficient { have, need } => write!(f, "ok ({} >= {})", have, need),
            CheckOutcome::Insufficient { have, need } => {
                write!(f, "insufficient ({} < {})", have, need)
            }
            CheckOutcome::Unavailable(reason) => write!(f, "unavailable ({})", reason),
        }
    }
}

/// Outcome of both checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub balance: CheckOutcome,
    pub allowance: CheckOutcome,
}

impl PreflightReport {
    pub fn passed(&self) -> bool {
        self.balance.passed() && self.allowance.passed()
    }

    /// `Err(Error::Preflight)` naming every failed check.
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            return Ok(self);
        }
        let mut failures = Vec::new();
        if !self.balance.passed() {
            failures.push(format!("native balance {}", self.balance));
        }
        if !self.allowance.passed() {
            failures.push(format!("allowance {}", self.allowance));
        }
        Err(Error::Preflight(failures.join("; ")))
    }
}

/// Balance and allowance checks against the router.
#[derive(Clone)]
pub struct PreflightChecker {
    rpc: Arc<dyn ChainRpc>,
    router: Address,
    call_timeout: Duration,
}

impl PreflightChecker {
    pub fn new(rpc: Arc<dyn ChainRpc>, router: Address, call_timeout: Duration) -> Self {
        Self {
            rpc,
            router,
            call_timeout,
        }
    }

    async fn query<F>(&self, operation: &str, fut: F) -> std::result::Result<U256, String>
    where
        F: Future<Output = Result<U256>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(Error::timeout(operation, self.call_timeout.as_secs()).to_string()),
        }
    }

    /// Native currency balance of `owner` against `required`.
    pub async fn check_balance(&self, owner: Address, required: U256) -> CheckOutcome {
        match self
            .query("eth_getBalance", self.rpc.native_balance(owner))
            .await
        {
            Ok(have) => {
                let outcome = CheckOutcome::compare(have, required);
                if !outcome.passed() {
                    warn!(owner = %owner, %have, need = %required, "Native balance insufficient");
                }
                outcome
            }
            Err(reason) => {
                warn!(owner = %owner, error = %reason, "Native balance check unavailable");
                CheckOutcome::Unavailable(reason)
            }
        }
    }

    /// Router allowance of `owner` on `token` against `required`.
    pub async fn check_allowance(&self, token: Address, owner: Address, required: U256) -> CheckOutcome {
        match self
            .query(
                "allowance",
                self.rpc.erc20_allowance(token, owner, self.router),
            )
            .await
        {
            Ok(have) => {
                let outcome = CheckOutcome::compare(have, required);
                if !outcome.passed() {
                    warn!(token = %token, owner = %owner, %have, need = %required, "Router allowance insufficient");
                }
                outcome
            }
            Err(reason) => {
                warn!(token = %token, owner = %owner, error = %reason, "Allowance check unavailable");
                CheckOutcome::Unavailable(reason)
            }
        }
    }

    /// Run the balance check, then the allowance check, for `order`.
    ///
    /// Both checks always run so the report names every shortfall.
    ///
    /// # Arguments
    ///
    /// * `order` - Order whose maker and maker asset are checked
    /// * `required_balance` - Worst-case native spend for the fill transaction
    pub async fn run(&self, order: &Order, required_balance: U256) -> PreflightReport {
        let balance = self.check_balance(order.maker, required_balance).await;
        let allowance = self
            .check_allowance(order.maker_asset, order.maker, order.making_amount)
            .await;

        let report = PreflightReport { balance, allowance };
        info!(
            balance = %report.balance,
            allowance = %report.allowance,
            passed = report.passed(),
            "Preflight complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;
    use limit_order_core::config::{ROUTER_V6_ADDRESS, USDC_ADDRESS, WMATIC_ADDRESS};
    use limit_order_core::signing::MakerTraits;
    use mockall::predicate::eq;

    fn order() -> Order {
        let maker = Address::repeat_byte(0x01);
        Order {
            salt: U256::from(1u64),
            maker,
            receiver: maker,
            maker_asset: WMATIC_ADDRESS,
            taker_asset: USDC_ADDRESS,
            making_amount: U256::from(10_000_000_000_000_000u64),
            taking_amount: U256::from(10_000u64),
            maker_traits: MakerTraits::new(1, 1_700_000_000).unwrap().pack(),
        }
    }

    fn checker(rpc: MockChain) -> PreflightChecker {
        PreflightChecker::new(Arc::new(rpc), ROUTER_V6_ADDRESS, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_all_sufficient() {
        let mut rpc = MockChain::new();
        rpc.expect_native_balance()
            .returning(|_| Ok(U256::from(10u64).pow(U256::from(18u64))));
        rpc.expect_erc20_allowance()
            .with(eq(WMATIC_ADDRESS), eq(Address::repeat_byte(0x01)), eq(ROUTER_V6_ADDRESS))
            .returning(|_, _, _| Ok(U256::MAX));

        let report = checker(rpc).run(&order(), U256::from(1u64)).await;
        assert!(report.passed());
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_zero_allowance_is_insufficient() {
        let mut rpc = MockChain::new();
        rpc.expect_native_balance()
            .returning(|_| Ok(U256::from(10u64).pow(U256::from(18u64))));
        rpc.expect_erc20_allowance()
            .returning(|_, _, _| Ok(U256::ZERO));

        let report = checker(rpc).run(&order(), U256::from(1u64)).await;
        assert_eq!(
            report.allowance,
            CheckOutcome::Insufficient {
                have: U256::ZERO,
                need: U256::from(10_000_000_000_000_000u64)
            }
        );
        match report.into_result() {
            Err(Error::Preflight(msg)) => assert!(msg.contains("allowance insufficient")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_network_error_blocks_as_unavailable() {
        let mut rpc = MockChain::new();
        rpc.expect_native_balance()
            .returning(|_| Err(Error::network("connection reset")));
        rpc.expect_erc20_allowance()
            .returning(|_, _, _| Ok(U256::MAX));

        let report = checker(rpc).run(&order(), U256::from(1u64)).await;
        assert!(matches!(report.balance, CheckOutcome::Unavailable(_)));
        assert!(!report.passed());
        match report.into_result() {
            Err(Error::Preflight(msg)) => assert!(msg.contains("unavailable")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_balance_checked_before_allowance() {
        let mut seq = mockall::Sequence::new();
        let mut rpc = MockChain::new();
        rpc.expect_native_balance()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(U256::from(10u64).pow(U256::from(18u64))));
        rpc.expect_erc20_allowance()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(U256::MAX));

        assert!(checker(rpc).run(&order(), U256::from(1u64)).await.passed());
    }

    #[tokio::test]
    async fn test_low_balance() {
        let mut rpc = MockChain::new();
        rpc.expect_native_balance().returning(|_| Ok(U256::from(5u64)));
        rpc.expect_erc20_allowance()
            .returning(|_, _, _| Ok(U256::MAX));

        let report = checker(rpc).run(&order(), U256::from(6u64)).await;
        assert!(matches!(report.balance, CheckOutcome::Insufficient { .. }));
        assert!(report.allowance.passed());
    }
}
