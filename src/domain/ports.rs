use crate::domain::model::SessionRecord;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Server-side persistence for session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the record if it exists and has not expired.
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>>;
    async fn store(&self, id: &str, record: SessionRecord) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    /// Drops every expired record, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}
