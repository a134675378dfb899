//! Configuration management for limit order submission.

use crate::signing::Eip712Domain;
use crate::{Error, Result};
use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Chain ID for Polygon mainnet.
pub const POLYGON_CHAIN_ID: u64 = 137;

/// 1inch Aggregation Router V6 (limit order protocol v4).
pub const ROUTER_V6_ADDRESS: Address = address!("111111125421cA6dc452d289314280a0f8842A65");

/// Wrapped MATIC on Polygon mainnet.
pub const WMATIC_ADDRESS: Address = address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270");

/// Native USDC on Polygon mainnet.
pub const USDC_ADDRESS: Address = address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359");

pub const DEFAULT_RPC_URL: &str = "https://polygon-bor-rpc.publicnode.com";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub rpc: RpcConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// ERC-20 token known to the network bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}

/// Constant per-network bundle injected into every component that needs chain context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub router: Address,
    pub token_a: TokenInfo,
    pub token_b: TokenInfo,
    pub domain_name: String,
    pub domain_version: String,
    pub native_symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Upper bound for every individual JSON-RPC call.
    pub timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl NetworkConfig {
    /// Polygon mainnet with the 1inch router and the WMATIC/USDC pair.
    pub fn polygon() -> Self {
        Self {
            name: "polygon".to_string(),
            chain_id: POLYGON_CHAIN_ID,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            router: ROUTER_V6_ADDRESS,
            token_a: TokenInfo {
                symbol: "WMATIC".to_string(),
                address: WMATIC_ADDRESS,
                decimals: 18,
            },
            token_b: TokenInfo {
                symbol: "USDC".to_string(),
                address: USDC_ADDRESS,
                decimals: 6,
            },
            domain_name: "1inch Aggregation Router".to_string(),
            domain_version: "6".to_string(),
            native_symbol: "POL".to_string(),
        }
    }

    /// EIP-712 domain bound to the router on this chain.
    pub fn eip712_domain(&self) -> Eip712Domain {
        Eip712Domain::custom(
            self.domain_name.clone(),
            self.domain_version.clone(),
            self.chain_id,
            self.router,
        )
    }

    pub fn token_by_address(&self, address: Address) -> Option<&TokenInfo> {
        [&self.token_a, &self.token_b]
            .into_iter()
            .find(|t| t.address == address)
    }

    pub fn token_by_symbol(&self, symbol: &str) -> Option<&TokenInfo> {
        [&self.token_a, &self.token_b]
            .into_iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.rpc_url).map_err(|e| Error::Config {
            message: format!("invalid RPC URL {}: {}", self.rpc_url, e),
        })?;
        if self.chain_id == 0 {
            return Err(Error::Config {
                message: "chain id must be non-zero".to_string(),
            });
        }
        if self.router == Address::ZERO {
            return Err(Error::Config {
                message: "router address must be set".to_string(),
            });
        }
        if self.token_a.address == self.token_b.address {
            return Err(Error::Config {
                message: "token pair must contain two distinct tokens".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::polygon()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset values fall back to Polygon mainnet.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut network = NetworkConfig::polygon();
        if let Ok(url) = env::var("POLYGON_RPC_URL") {
            network.rpc_url = url;
        }
        if let Ok(chain_id) = env::var("CHAIN_ID") {
            network.chain_id = chain_id.parse().map_err(|_| Error::Config {
                message: format!("CHAIN_ID is not a number: {}", chain_id),
            })?;
        }
        if let Ok(router) = env::var("ROUTER_ADDRESS") {
            network.router = router.parse().map_err(|_| Error::Config {
                message: format!("ROUTER_ADDRESS is not an address: {}", router),
            })?;
        }
        network.validate()?;

        let database = env::var("DATABASE_URL").ok().map(|url| DatabaseConfig {
            url,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        });

        Ok(Self {
            network,
            rpc: RpcConfig {
                timeout_secs: env::var("RPC_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            },
            database,
        })
    }

    /// Load configuration from an optional TOML file layered with
    /// `ONE_LIMIT__*` environment variables (e.g. `ONE_LIMIT__NETWORK__RPC_URL`).
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder().add_source(config::Config::try_from(
            &Self::default(),
        )?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix("ONE_LIMIT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.network.validate()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::polygon(),
            rpc: RpcConfig::default(),
            database: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_defaults_are_valid() {
        let network = NetworkConfig::polygon();
        assert!(network.validate().is_ok());
        assert_eq!(network.chain_id, 137);
        assert_eq!(
            network.router,
            "0x111111125421cA6dc452d289314280a0f8842A65"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[test]
    fn test_token_lookup() {
        let network = NetworkConfig::polygon();
        assert_eq!(network.token_by_symbol("usdc").unwrap().decimals, 6);
        assert_eq!(
            network.token_by_address(WMATIC_ADDRESS).unwrap().symbol,
            "WMATIC"
        );
        assert!(network.token_by_symbol("DAI").is_none());
    }

    #[test]
    fn test_validate_rejects_same_tokens() {
        let mut network = NetworkConfig::polygon();
        network.token_b = network.token_a.clone();
        assert!(matches!(network.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_rpc_url() {
        let mut network = NetworkConfig::polygon();
        network.rpc_url = "not a url".to_string();
        assert!(network.validate().is_err());
    }

    #[test]
    fn test_domain_uses_router() {
        let network = NetworkConfig::polygon();
        let domain = network.eip712_domain();
        assert_eq!(domain.verifying_contract, ROUTER_V6_ADDRESS);
        assert_eq!(domain.name, "1inch Aggregation Router");
        assert_eq!(domain.version, "6");
    }
}
