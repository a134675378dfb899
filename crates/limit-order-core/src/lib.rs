//! Limit Order Core Library
//!
//! Order construction, EIP-712 signing, chain access and transaction records
//! for 1inch limit orders on Polygon.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod signing;
pub mod types;

pub use error::{Error, Result};
