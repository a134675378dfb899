//! In-memory transaction store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::store::{TransactionQuery, TransactionStore};
use crate::types::TransactionRecord;
use crate::{Error, Result};

/// Store backed by a concurrent map. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransactionStore {
    records: Arc<DashMap<Uuid, TransactionRecord>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn sorted(mut records: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn save(&self, record: &TransactionRecord) -> Result<()> {
        match self.records.entry(record.id) {
            Entry::Occupied(_) => Err(Error::Store(format!(
                "record {} already exists",
                record.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, record: &TransactionRecord) -> Result<()> {
        let mut stored = self
            .records
            .get_mut(&record.id)
            .ok_or_else(|| Error::Store(format!("record {} not found", record.id)))?;

        if stored.status.is_terminal() && stored.status != record.status {
            return Err(Error::InvalidTransition {
                from: stored.status.to_string(),
                to: record.status.to_string(),
            });
        }
        *stored = record.clone();
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TransactionRecord>> {
        let records = self.records.iter().map(|r| r.value().clone()).collect();
        Ok(Self::sorted(records))
    }

    async fn clear(&self) -> Result<()> {
        self.records.clear();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TransactionRecord>> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn query(&self, query: &TransactionQuery) -> Result<Vec<TransactionRecord>> {
        let matching = self
            .records
            .iter()
            .filter(|r| query.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();

        let mut records = Self::sorted(matching);
        if let Some(limit) = query.limit {
            records.truncate(limit as usize);
        }
        Ok(records)
    }
}
