use async_trait::async_trait;
use civic_ledger::SettlementClient;
use civic_sanctions::PenaltyClient;
use civic_signal::HistoryProvider;
use civic_storage::AdjudicationStore;
use civic_types::{
    ClaimBody, Domain, Identity, NotificationKind, NotificationSink, NotifyTarget, RewardAmount,
};
use std::sync::Arc;
use tracing::info;

/// History provider backed by the node's own claim store: the consumption
/// deltas of the identity's accepted water readings, oldest first.
pub struct StoreHistory {
    store: Arc<dyn AdjudicationStore>,
}

impl StoreHistory {
    pub fn new(store: Arc<dyn AdjudicationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HistoryProvider for StoreHistory {
    async fn recent_values(&self, identity: &Identity, limit: usize) -> anyhow::Result<Vec<f64>> {
        let claims = self.store.claims_by_identity(identity).await?;
        let mut values: Vec<f64> = claims
            .iter()
            .filter_map(|c| match &c.body {
                ClaimBody::Reading { consumption, .. } => Some(*consumption),
                ClaimBody::Declaration { .. } => None,
            })
            .collect();
        if values.len() > limit {
            values.drain(..values.len() - limit);
        }
        Ok(values)
    }
}

/// Stand-in transfer rail for nodes running without an external ledger.
/// Accepts every transfer and echoes a reference derived from ours.
pub struct LoggingSettlement;

#[async_trait]
impl SettlementClient for LoggingSettlement {
    async fn transfer(
        &self,
        to: &Identity,
        amount: RewardAmount,
        reference: &str,
    ) -> anyhow::Result<String> {
        info!(
            to = %to.short(),
            amount = %amount,
            reference,
            "📡 Settlement transfer dispatched"
        );
        Ok(format!("local-{}", reference))
    }
}

/// Stand-in penalty rail; records nothing beyond the log line.
pub struct LoggingPenalty;

#[async_trait]
impl PenaltyClient for LoggingPenalty {
    async fn apply_penalty(
        &self,
        identity: &Identity,
        domain: Domain,
        amount: f64,
        reason: &str,
    ) -> anyhow::Result<String> {
        info!(
            identity = %identity.short(),
            domain = %domain,
            amount,
            reason,
            "📡 Penalty dispatched"
        );
        Ok(format!("local-pen-{}", identity.short()))
    }

    async fn blacklist(&self, identity: &Identity, domain: Domain) -> anyhow::Result<String> {
        info!(
            identity = %identity.short(),
            domain = %domain,
            "📡 Blacklist mirrored"
        );
        Ok(format!("local-bl-{}", identity.short()))
    }
}

/// Log-only notification sink.
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn notify(&self, target: NotifyTarget, kind: NotificationKind, title: &str, message: &str) {
        info!(target = ?target, kind = ?kind, title, message, "🔔 Notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use civic_storage::MemoryBackend;
    use civic_types::{Claim, ClaimId, ClaimState};

    #[tokio::test]
    async fn history_returns_reading_deltas_in_order() {
        let store = Arc::new(MemoryBackend::new());
        let who = Identity::parse("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
        for (i, consumption) in [12.0, 14.0, 11.0].iter().enumerate() {
            let claim = Claim {
                id: ClaimId::new(format!("r{}", i).as_bytes()),
                identity: who.clone(),
                body: ClaimBody::Reading {
                    meter_ref: "WM-1".to_string(),
                    reading_index: 2000 + i as u64,
                    consumption: *consumption,
                    confirmed_drop: false,
                },
                computed_reward: RewardAmount::ZERO,
                state: ClaimState::Approved,
                created_at: Utc::now() + chrono::Duration::seconds(i as i64),
                resolved_at: None,
                resolver_identity: None,
                fraud_reason: None,
                version: 0,
            };
            store.put_claim(&claim).await.unwrap();
        }

        let history = StoreHistory::new(store);
        let values = history.recent_values(&who, 2).await.unwrap();
        assert_eq!(values, vec![14.0, 11.0]);
    }
}
