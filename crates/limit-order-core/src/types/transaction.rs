//! Transaction record lifecycle for submitted orders.

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::amount::{limit_price, to_decimal};
use crate::api::TransactionReceipt;
use crate::config::TokenInfo;
use crate::{Error, Result};

/// How long after creation a pending record keeps being polled.
pub const POLLING_WINDOW_SECS: i64 = 120;

/// Minimum spacing between two polls of the same record.
pub const MIN_POLL_SPACING_SECS: i64 = 5;

/// Status of a submitted order transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" | "canceled" => Ok(TransactionStatus::Cancelled),
            other => Err(Error::Input(format!("unknown transaction status '{}'", other))),
        }
    }
}

/// One submitted order and its on-chain outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub maker: Address,
    pub maker_asset: Address,
    pub taker_asset: Address,
    pub maker_symbol: String,
    pub taker_symbol: String,
    /// Human amounts in token units.
    pub making_amount: Decimal,
    pub taking_amount: Decimal,
    /// Taker tokens per maker token.
    pub limit_price: Option<Decimal>,
    /// Display-only USD value of the making side.
    pub usd_value: Option<Decimal>,
    pub order_hash: Option<B256>,
    pub status: TransactionStatus,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    /// Effective gas price in wei.
    pub gas_price: Option<u128>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// A new pending record for an order of `making` base units of
    /// `maker_token` against `taking` base units of `taker_token`.
    pub fn new(
        maker: Address,
        maker_token: &TokenInfo,
        taker_token: &TokenInfo,
        making: U256,
        taking: U256,
    ) -> Result<Self> {
        let making_amount = to_decimal(making, maker_token.decimals)?;
        let taking_amount = to_decimal(taking, taker_token.decimals)?;
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            maker,
            maker_asset: maker_token.address,
            taker_asset: taker_token.address,
            maker_symbol: maker_token.symbol.clone(),
            taker_symbol: taker_token.symbol.clone(),
            making_amount,
            taking_amount,
            limit_price: limit_price(making_amount, taking_amount),
            usd_value: None,
            order_hash: None,
            status: TransactionStatus::Pending,
            tx_hash: None,
            block_number: None,
            gas_used: None,
            gas_price: None,
            error: None,
            created_at: now,
            last_polled_at: None,
            updated_at: now,
        })
    }

    pub fn with_order_hash(mut self, order_hash: B256) -> Self {
        self.order_hash = Some(order_hash);
        self
    }

    pub fn with_usd_value(mut self, usd_value: Decimal) -> Self {
        self.usd_value = Some(usd_value);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    fn transition(&mut self, to: TransactionStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attach the broadcast hash to a pending record.
    pub fn set_tx_hash(&mut self, tx_hash: B256) -> Result<()> {
        if !self.is_pending() {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: "pending (hash attached)".to_string(),
            });
        }
        self.tx_hash = Some(tx_hash);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Move to `confirmed` or `failed` according to the receipt status.
    pub fn apply_receipt(&mut self, receipt: &TransactionReceipt) -> Result<()> {
        let to = if receipt.success {
            TransactionStatus::Confirmed
        } else {
            TransactionStatus::Failed
        };
        self.transition(to)?;

        self.tx_hash.get_or_insert(receipt.transaction_hash);
        self.block_number = receipt.block_number;
        self.gas_used = receipt.gas_used;
        self.gas_price = receipt.effective_gas_price;
        if !receipt.success {
            self.error = Some("transaction reverted".to_string());
        }
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(TransactionStatus::Failed)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Manual cancellation. Never set by polling.
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(TransactionStatus::Cancelled)
    }

    pub fn record_poll(&mut self, at: DateTime<Utc>) {
        self.last_polled_at = Some(at);
        self.updated_at = at.max(self.updated_at);
    }

    /// Pending and still inside the polling window.
    pub fn needs_polling_at(&self, now: DateTime<Utc>) -> bool {
        self.needs_polling_within(now, Duration::seconds(POLLING_WINDOW_SECS))
    }

    pub fn needs_polling_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.is_pending() && now - self.created_at < window
    }

    pub fn needs_polling(&self) -> bool {
        self.needs_polling_at(Utc::now())
    }

    /// Zero when the record may be polled now.
    pub fn time_until_next_poll_at(&self, now: DateTime<Utc>) -> Duration {
        self.time_until_next_poll_with(now, Duration::seconds(MIN_POLL_SPACING_SECS))
    }

    pub fn time_until_next_poll_with(&self, now: DateTime<Utc>, spacing: Duration) -> Duration {
        match self.last_polled_at {
            None => Duration::zero(),
            Some(last) => (spacing - (now - last)).max(Duration::zero()),
        }
    }

    /// Fee actually paid, in wei, once confirmed.
    pub fn fee_paid(&self) -> Option<U256> {
        match (self.gas_used, self.gas_price) {
            (Some(used), Some(price)) => Some(U256::from(used) * U256::from(price)),
            _ => None,
        }
    }
}
