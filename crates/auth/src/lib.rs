//! Wallet access for order signing.
//!
//! Loads the trading wallet (`{address, private_key}`) from the environment,
//! a JSON file or memory, and masks keys and addresses for logging.

pub mod wallet;

pub use wallet::{
    mask_hex, EnvWalletSource, FileWalletSource, StaticWalletSource, TradingWallet, WalletError,
    WalletSource,
};
