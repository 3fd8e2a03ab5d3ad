use crate::domain::model::SessionRecord;
use crate::domain::ports::SessionStore;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

/// Process-local session store. Contents are lost on restart and not
/// shared between instances.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    records: Arc<DashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>> {
        let now = Utc::now();

        // remove_if holds the shard lock, so a concurrent store() is not clobbered
        if self
            .records
            .remove_if(id, |_, record| record.is_expired(now))
            .is_some()
        {
            tracing::debug!("Session {} expired on load", id);
            return Ok(None);
        }

        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    async fn store(&self, id: &str, record: SessionRecord) -> Result<()> {
        self.records.insert(id.to_string(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.remove(id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        Ok(before.saturating_sub(self.records.len()))
    }
}
