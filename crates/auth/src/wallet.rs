//! Trading wallet management for limit order signing.
//!
//! A wallet is loaded per submission from a [`WalletSource`] and dropped once
//! the fill transaction is signed. The private key lives inside the
//! [`PrivateKeySigner`] and is never formatted into logs.

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default environment variable holding the wallet key.
pub const WALLET_KEY_VAR: &str = "WALLET_PRIVATE_KEY";

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("{0} environment variable not set")]
    MissingEnv(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Wallet address {declared} does not match key-derived address {derived}")]
    AddressMismatch { declared: String, derived: String },

    #[error("Failed to read wallet file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed wallet file: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WalletError>;

/// Shorten a hex value for logs: `0x1234...abcd`.
pub fn mask_hex(value: &str) -> String {
    if value.len() <= 10 {
        return "0x****".to_string();
    }
    match (value.get(..6), value.get(value.len() - 4..)) {
        (Some(head), Some(tail)) => format!("{}...{}", head, tail),
        _ => "0x****".to_string(),
    }
}

fn is_hex_of_len(value: &str, hex_chars: usize) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|h| h.len() == hex_chars && h.chars().all(|c| c.is_ascii_hexdigit()))
}

/// A trading wallet with private key access for signing orders.
#[derive(Clone)]
pub struct TradingWallet {
    signer: PrivateKeySigner,
    address: Address,
}

impl TradingWallet {
    /// Load wallet from the `WALLET_PRIVATE_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variable is not set or
    /// if the private key format is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_env_var(WALLET_KEY_VAR)
    }

    pub fn from_env_var(var: &str) -> Result<Self> {
        let private_key =
            std::env::var(var).map_err(|_| WalletError::MissingEnv(var.to_string()))?;
        Self::from_private_key(&private_key)
    }

    /// Create a wallet from a hex-encoded private key.
    ///
    /// # Arguments
    ///
    /// * `key` - A 64-character hex string, optionally prefixed with "0x"
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidKey`] if the key is not a valid
    /// secp256k1 scalar.
    pub fn from_private_key(key: &str) -> Result<Self> {
        let key_clean = key.trim().trim_start_matches("0x");
        if key_clean.len() != 64 || !key_clean.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WalletError::InvalidKey(
                "expected 64 hex characters".to_string(),
            ));
        }

        let bytes = hex::decode(key_clean).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let signer = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let address = signer.address();

        Ok(Self { signer, address })
    }

    /// Parse a wallet JSON document `{"address": "0x..", "private_key": "0x.."}`.
    ///
    /// Both fields must be `0x`-prefixed and the declared address must match
    /// the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, either field has the wrong
    /// shape, or the declared address differs from the key's address. Field
    /// values appear masked in the error.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: WalletFile = serde_json::from_str(json)?;

        if !is_hex_of_len(&file.address, 40) {
            return Err(WalletError::InvalidAddress(mask_hex(&file.address)));
        }
        if !is_hex_of_len(&file.private_key, 64) {
            return Err(WalletError::InvalidKey(
                "expected 0x followed by 64 hex characters".to_string(),
            ));
        }

        let declared: Address = file
            .address
            .parse()
            .map_err(|_| WalletError::InvalidAddress(mask_hex(&file.address)))?;
        let wallet = Self::from_private_key(&file.private_key)?;

        if wallet.address != declared {
            return Err(WalletError::AddressMismatch {
                declared: mask_hex(&file.address),
                derived: wallet.masked_address(),
            });
        }
        Ok(wallet)
    }

    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WalletError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&contents)
    }

    /// Get the wallet's Ethereum address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get the wallet address as a checksummed hex string.
    pub fn address_string(&self) -> String {
        format!("{}", self.address)
    }

    pub fn masked_address(&self) -> String {
        mask_hex(&self.address_string())
    }

    /// Get a reference to the underlying signer.
    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Consume the wallet and return the signer.
    pub fn into_signer(self) -> PrivateKeySigner {
        self.signer
    }
}

impl std::fmt::Debug for TradingWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the private key in debug output
        f.debug_struct("TradingWallet")
            .field("address", &self.masked_address())
            .finish()
    }
}

#[derive(Deserialize)]
struct WalletFile {
    address: String,
    private_key: String,
}

/// Where the pipeline obtains the wallet for one submission.
#[async_trait]
pub trait WalletSource: Send + Sync {
    async fn load(&self) -> Result<TradingWallet>;
}

/// Reads the key from an environment variable on every load.
#[derive(Debug, Clone)]
pub struct EnvWalletSource {
    var: String,
}

impl EnvWalletSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvWalletSource {
    fn default() -> Self {
        Self::new(WALLET_KEY_VAR)
    }
}

#[async_trait]
impl WalletSource for EnvWalletSource {
    async fn load(&self) -> Result<TradingWallet> {
        let wallet = TradingWallet::from_env_var(&self.var)?;
        debug!(wallet = %wallet.masked_address(), var = %self.var, "Loaded wallet from environment");
        Ok(wallet)
    }
}

/// Reads a wallet JSON file on every load.
#[derive(Debug, Clone)]
pub struct FileWalletSource {
    path: PathBuf,
}

impl FileWalletSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WalletSource for FileWalletSource {
    async fn load(&self) -> Result<TradingWallet> {
        let wallet = TradingWallet::from_json_file(&self.path).await?;
        debug!(wallet = %wallet.masked_address(), path = %self.path.display(), "Loaded wallet from file");
        Ok(wallet)
    }
}

/// Hands out clones of an in-memory wallet.
#[derive(Debug, Clone)]
pub struct StaticWalletSource {
    wallet: TradingWallet,
}

impl StaticWalletSource {
    pub fn new(wallet: TradingWallet) -> Self {
        Self { wallet }
    }
}

#[async_trait]
impl WalletSource for StaticWalletSource {
    async fn load(&self) -> Result<TradingWallet> {
        Ok(self.wallet.clone())
    }
}
