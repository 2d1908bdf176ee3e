use async_trait::async_trait;
use civic_types::{Identity, RewardAmount};

/// External transfer rail that pays out a settled balance.
///
/// Implementations must be idempotent on `reference`: replaying a transfer
/// with a reference they have already processed must succeed without paying
/// twice.
#[async_trait]
pub trait SettlementClient: Send + Sync {
    /// Pay `amount` to `to`, returning the rail's own transaction reference.
    async fn transfer(
        &self,
        to: &Identity,
        amount: RewardAmount,
        reference: &str,
    ) -> anyhow::Result<String>;
}
