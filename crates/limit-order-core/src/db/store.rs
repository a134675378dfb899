//! Storage contract for transaction records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{TransactionRecord, TransactionStatus};
use crate::Result;

/// Record persistence.
///
/// Writes are atomic per record id. `update` refuses to move a record out of
/// a terminal status.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new record. Fails if the id already exists.
    async fn save(&self, record: &TransactionRecord) -> Result<()>;

    /// Replace an existing record.
    async fn update(&self, record: &TransactionRecord) -> Result<()>;

    /// All records, newest first.
    async fn load_all(&self) -> Result<Vec<TransactionRecord>>;

    /// Remove every record.
    async fn clear(&self) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<TransactionRecord>>;

    /// Records matching `query`, newest first.
    async fn query(&self, query: &TransactionQuery) -> Result<Vec<TransactionRecord>>;
}

/// Filter for listing records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub status: Option<TransactionStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl TransactionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.created_at > to {
                return false;
            }
        }
        true
    }
}
