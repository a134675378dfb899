//! One-Limit: signed 1inch limit orders filled on Polygon
//!
//! This is the root crate that provides benchmark and end-to-end test access
//! to the internal crates. For actual functionality, use them directly:
//!
//! - `limit-order-core`: order construction, EIP-712 signing, JSON-RPC client, transaction records
//! - `trading-engine`: preflight, gas, fill transaction submission, polling, the order pipeline
//! - `auth`: trading wallet loading and key masking
//! - `order-cli`: the `one-limit` binary

pub use auth;
pub use limit_order_core as core;
pub use trading_engine as engine;
