//! JSON-RPC access to the chain.
//!
//! [`ChainRpc`] is the seam every engine component talks through; the
//! [`JsonRpcClient`] implementation speaks plain HTTP JSON-RPC to a node.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::router::encode_allowance;
use crate::config::NetworkConfig;
use crate::{Error, Result};

/// Receipt fields the order lifecycle cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub effective_gas_price: Option<u128>,
    /// `true` when the receipt status is `0x1`.
    pub success: bool,
}

/// Read and broadcast operations against a chain node.
///
/// Implementations must bound every call with a timeout.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Native currency balance in wei.
    async fn native_balance(&self, owner: Address) -> Result<U256>;

    /// ERC-20 `allowance(owner, spender)` of `token`.
    async fn erc20_allowance(&self, token: Address, owner: Address, spender: Address)
        -> Result<U256>;

    /// Current `eth_gasPrice` in wei.
    async fn gas_price(&self) -> Result<u128>;

    /// Pending transaction count for `owner`.
    async fn pending_nonce(&self, owner: Address) -> Result<u64>;

    /// Broadcast a signed transaction; returns the hash reported by the node.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256>;

    /// `None` while the transaction is not yet included.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>>;
}

/// HTTP JSON-RPC client for an EVM node.
#[derive(Clone)]
pub struct JsonRpcClient {
    rpc_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl JsonRpcClient {
    /// Create a client with a per-call timeout.
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let rpc_url = rpc_url.into();
        url::Url::parse(&rpc_url)
            .map_err(|e| Error::Input(format!("invalid RPC URL {}: {}", rpc_url, e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            rpc_url,
            http_client,
            timeout,
        })
    }

    pub fn from_network(network: &NetworkConfig, timeout: Duration) -> Result<Self> {
        Self::new(network.rpc_url.clone(), timeout)
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn rpc_call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        self.rpc_call_optional(method, params)
            .await?
            .ok_or_else(|| Error::network(format!("{} returned no result", method)))
    }

    /// Like `rpc_call`, but a null result is `Ok(None)`.
    async fn rpc_call_optional<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        debug!(method, "JSON-RPC request");
        let call = async {
            let response = self
                .http_client
                .post(&self.rpc_url)
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(Error::network(format!(
                    "{} failed with HTTP {}",
                    method,
                    response.status()
                )));
            }

            let body: JsonRpcResponse<T> = response.json().await?;
            Ok(body)
        };

        let body = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| Error::timeout(method, self.timeout.as_secs()))??;

        if let Some(err) = body.error {
            return Err(Error::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(body.result)
    }
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("rpc_url", &self.rpc_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ChainRpc for JsonRpcClient {
    async fn native_balance(&self, owner: Address) -> Result<U256> {
        let hex: String = self
            .rpc_call("eth_getBalance", serde_json::json!([owner, "latest"]))
            .await?;
        parse_u256(&hex)
    }

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256> {
        let data = encode_allowance(owner, spender);
        let hex: String = self
            .rpc_call(
                "eth_call",
                serde_json::json!([{ "to": token, "data": data }, "latest"]),
            )
            .await?;
        // Non-contract targets answer "0x".
        if hex == "0x" {
            return Ok(U256::ZERO);
        }
        parse_u256(&hex)
    }

    async fn gas_price(&self) -> Result<u128> {
        let hex: String = self.rpc_call("eth_gasPrice", serde_json::json!([])).await?;
        parse_quantity(&hex)
    }

    async fn pending_nonce(&self, owner: Address) -> Result<u64> {
        let hex: String = self
            .rpc_call(
                "eth_getTransactionCount",
                serde_json::json!([owner, "pending"]),
            )
            .await?;
        let nonce = parse_quantity(&hex)?;
        u64::try_from(nonce).map_err(|_| Error::network(format!("nonce {} out of range", nonce)))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        self.rpc_call("eth_sendRawTransaction", serde_json::json!([raw]))
            .await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        // Null until the transaction is mined.
        let raw: Option<RawReceipt> = self
            .rpc_call_optional("eth_getTransactionReceipt", serde_json::json!([hash]))
            .await?;
        raw.map(RawReceipt::into_receipt).transpose()
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    block_number: Option<String>,
    gas_used: Option<String>,
    effective_gas_price: Option<String>,
    status: Option<String>,
}

impl RawReceipt {
    fn into_receipt(self) -> Result<TransactionReceipt> {
        let to_u64 = |field: Option<String>| -> Result<Option<u64>> {
            field
                .map(|s| {
                    let v = parse_quantity(&s)?;
                    u64::try_from(v).map_err(|_| Error::network(format!("{} out of range", s)))
                })
                .transpose()
        };

        Ok(TransactionReceipt {
            transaction_hash: self.transaction_hash,
            block_number: to_u64(self.block_number)?,
            gas_used: to_u64(self.gas_used)?,
            effective_gas_price: self
                .effective_gas_price
                .map(|s| parse_quantity(&s))
                .transpose()?,
            success: self.status.as_deref() == Some("0x1"),
        })
    }
}

fn parse_quantity(hex: &str) -> Result<u128> {
    u128::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| Error::network(format!("malformed quantity {}: {}", hex, e)))
}

fn parse_u256(hex: &str) -> Result<U256> {
    U256::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| Error::network(format!("malformed quantity {}: {}", hex, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x6fc23ac00").unwrap(), 30_000_000_000);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_raw_receipt_conversion() {
        let raw: RawReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "status": "0x1"
        }))
        .unwrap();

        let receipt = raw.into_receipt().unwrap();
        assert_eq!(receipt.block_number, Some(16));
        assert_eq!(receipt.gas_used, Some(21_000));
        assert_eq!(receipt.effective_gas_price, Some(1_000_000_000));
        assert!(receipt.success);
    }

    #[test]
    fn test_reverted_receipt() {
        let raw: RawReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": format!("0x{}", "cd".repeat(32)),
            "blockNumber": "0x1",
            "gasUsed": "0x1",
            "status": "0x0"
        }))
        .unwrap();
        let receipt = raw.into_receipt().unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.effective_gas_price, None);
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(matches!(
            JsonRpcClient::new("not a url", Duration::from_secs(1)),
            Err(Error::Input(_))
        ));
    }
}
