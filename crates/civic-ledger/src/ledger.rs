use crate::settlement::SettlementClient;
use civic_storage::AdjudicationStore;
use civic_types::{CivicError, ClaimId, Identity, Result, RewardAmount};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Hard deadline for one settlement transfer call.
    pub transfer_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of a successful settlement.
#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    pub identity: Identity,
    pub amount: RewardAmount,
    /// Our deterministic settlement reference.
    pub reference: String,
    /// The transfer rail's transaction reference.
    pub transaction: String,
}

/// Accumulate-then-claim reward ledger.
///
/// Credits are keyed by claim id and applied at most once, so an approval
/// replayed after a crash cannot double-pay. Settlement pays the whole
/// balance through the external rail and zeroes it only once the transfer
/// has succeeded.
pub struct RewardLedger {
    store: Arc<dyn AdjudicationStore>,
    settlement: Arc<dyn SettlementClient>,
    config: LedgerConfig,
}

impl RewardLedger {
    pub fn new(
        store: Arc<dyn AdjudicationStore>,
        settlement: Arc<dyn SettlementClient>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            settlement,
            config,
        }
    }

    pub async fn balance(&self, identity: &Identity) -> Result<RewardAmount> {
        Ok(self.store.get_balance(identity).await?)
    }

    /// Credit an adjudicated reward. Returns false when the claim was
    /// already credited.
    pub async fn accrue(
        &self,
        identity: &Identity,
        claim_id: &ClaimId,
        amount: RewardAmount,
    ) -> Result<bool> {
        if amount.is_zero() {
            return Ok(false);
        }
        let credited = self.store.credit_if_absent(identity, claim_id, amount).await?;
        if credited {
            info!(
                identity = %identity.short(),
                claim = %claim_id,
                amount = %amount,
                "💰 Reward accrued"
            );
        } else {
            warn!(
                identity = %identity.short(),
                claim = %claim_id,
                "Duplicate credit attempt ignored"
            );
        }
        Ok(credited)
    }

    /// Settle the whole pending balance through the transfer rail.
    ///
    /// The balance read at entry is the settled amount: a credit landing
    /// while the transfer is in flight makes the final zeroing fail with a
    /// conflict and the caller retries with the fresh balance.
    pub async fn claim_rewards(&self, identity: &Identity) -> Result<SettlementReceipt> {
        let amount = self.store.get_balance(identity).await?;
        if amount.is_zero() {
            return Err(CivicError::Validation(
                "no pending rewards to claim".to_string(),
            ));
        }

        let nonce = self.store.settlement_count(identity).await?;
        let reference = settlement_reference(identity, nonce);

        let transfer = tokio::time::timeout(
            self.config.transfer_timeout,
            self.settlement.transfer(identity, amount, &reference),
        )
        .await;

        let transaction = match transfer {
            Ok(Ok(tx)) => tx,
            Ok(Err(e)) => {
                warn!(
                    identity = %identity.short(),
                    amount = %amount,
                    error = %e,
                    "Settlement transfer failed, balance untouched"
                );
                return Err(CivicError::Dependency(format!(
                    "settlement transfer failed: {}",
                    e
                )));
            }
            Err(_) => {
                warn!(
                    identity = %identity.short(),
                    amount = %amount,
                    "Settlement transfer timed out, balance untouched"
                );
                return Err(CivicError::Dependency(
                    "settlement transfer timed out".to_string(),
                ));
            }
        };

        self.store.settle_balance(identity, amount, &reference).await?;

        info!(
            identity = %identity.short(),
            amount = %amount,
            reference = %reference,
            transaction = %transaction,
            "✅ Rewards settled"
        );

        Ok(SettlementReceipt {
            identity: identity.clone(),
            amount,
            reference,
            transaction,
        })
    }
}

/// Deterministic per-settlement reference: hash of the identity and its
/// settlement nonce, so a retried payout reuses the same reference.
fn settlement_reference(identity: &Identity, nonce: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(identity.as_str().as_bytes());
    hasher.update(&nonce.to_be_bytes());
    let digest = hasher.finalize();
    format!("stl-{}", &hex::encode(digest.as_bytes())[..16])
}
