use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{Chain, TokenKey, TokenRecord};

/// Filter for `find_many`. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub chain: Option<Chain>,
    pub unvetted_only: bool,
}

/// Read/write contract the engine requires from the backing store. The
/// storage engine itself lives outside this crate; only this contract is
/// part of the core.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn upsert(&self, record: &TokenRecord) -> Result<()>;
    async fn find_one(&self, key: &TokenKey) -> Result<Option<TokenRecord>>;
    async fn find_many(&self, filter: RecordFilter) -> Result<Vec<TokenRecord>>;
    async fn delete_many(&self, keys: &[TokenKey]) -> Result<u64>;
    async fn count(&self) -> Result<u64>;
}

/// In-memory store used by the default wiring and the tests.
#[derive(Default)]
pub struct MemoryPersistence {
    records: Arc<RwLock<HashMap<TokenKey, TokenRecord>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn upsert(&self, record: &TokenRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.key(), record.clone());
        Ok(())
    }

    async fn find_one(&self, key: &TokenKey) -> Result<Option<TokenRecord>> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn find_many(&self, filter: RecordFilter) -> Result<Vec<TokenRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| filter.chain.map_or(true, |c| r.chain == c))
            .filter(|r| !filter.unvetted_only || r.tier.is_none())
            .cloned()
            .collect())
    }

    async fn delete_many(&self, keys: &[TokenKey]) -> Result<u64> {
        let mut records = self.records.write().await;
        let mut removed = 0;
        for key in keys {
            if records.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<u64> {
        let records = self.records.read().await;
        Ok(records.len() as u64)
    }
}
