//! Shared test doubles.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use limit_order_core::api::{ChainRpc, TransactionReceipt};
use limit_order_core::Result;
use mockall::mock;

mock! {
    pub Chain {}

    #[async_trait]
    impl ChainRpc for Chain {
        async fn native_balance(&self, owner: Address) -> Result<U256>;
        async fn erc20_allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;
        async fn gas_price(&self) -> Result<u128>;
        async fn pending_nonce(&self, owner: Address) -> Result<u64>;
        async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256>;
        async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>>;
    }
}

// Well-known test private key (DO NOT USE IN PRODUCTION)
pub const TEST_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
