use anyhow::Result;
use async_trait::async_trait;
use civic_types::Identity;

/// Source of recent consumption values for an identity, chronological,
/// oldest first.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn recent_values(&self, identity: &Identity, limit: usize) -> Result<Vec<f64>>;
}
