use crate::config::AdjudicationConfig;
use civic_appeals::{AppealDecision, AppealResolver, ResolverConfig};
use civic_claims::{ClaimManager, ClaimManagerConfig, ReadingOutcome, ReadingRequest};
use civic_inspections::{InspectionConfig, InspectionReconciler};
use civic_ledger::{LedgerConfig, RewardLedger, SettlementClient, SettlementReceipt};
use civic_sanctions::{PenaltyClient, WarningTracker};
use civic_signal::{ConsumptionGuard, HistoryProvider, SignalEngine};
use civic_storage::AdjudicationStore;
use civic_types::{
    Appeal, AppealId, Claim, ClaimId, ClaimState, FraudRecord, Identity, InspectionId,
    InspectionRecord, MaterialType, NotificationKind, NotificationSink, NotifyTarget, Quantity,
    Result, RewardAmount, WarningRecord,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Aggregate sanction view for one identity.
#[derive(Debug, Clone, Serialize)]
pub struct FraudStatus {
    pub warnings: WarningRecord,
    pub pending_balance: RewardAmount,
    pub fraud_records: Vec<FraudRecord>,
}

/// The adjudication API surface, wiring every manager over one store.
///
/// All identity strings are normalized exactly once at this boundary;
/// the managers below assume parsed identities.
pub struct AdjudicationService {
    store: Arc<dyn AdjudicationStore>,
    ledger: Arc<RewardLedger>,
    warnings: Arc<WarningTracker>,
    notifier: Arc<dyn NotificationSink>,
    claims: ClaimManager,
    appeals: AppealResolver,
    inspections: InspectionReconciler,
}

impl AdjudicationService {
    pub fn new(
        store: Arc<dyn AdjudicationStore>,
        settlement: Arc<dyn SettlementClient>,
        penalty: Arc<dyn PenaltyClient>,
        notifier: Arc<dyn NotificationSink>,
        history: Arc<dyn HistoryProvider>,
        config: &AdjudicationConfig,
    ) -> Self {
        let ledger = Arc::new(RewardLedger::new(
            store.clone(),
            settlement,
            LedgerConfig {
                transfer_timeout: Duration::from_secs(config.transfer_timeout_secs),
            },
        ));
        let warnings = Arc::new(WarningTracker::new(store.clone()));
        let claims = ClaimManager::new(
            store.clone(),
            ledger.clone(),
            history,
            notifier.clone(),
            SignalEngine::default(),
            ConsumptionGuard::default(),
            ClaimManagerConfig::default(),
        );
        let appeals = AppealResolver::new(
            store.clone(),
            ledger.clone(),
            warnings.clone(),
            penalty.clone(),
            notifier.clone(),
            ResolverConfig {
                full_penalty: config.full_penalty,
                partial_penalty: config.partial_penalty,
                ..ResolverConfig::default()
            },
        );
        let inspections = InspectionReconciler::new(
            store.clone(),
            warnings.clone(),
            penalty,
            notifier.clone(),
            InspectionConfig {
                regular_interval_days: config.inspection_interval_days,
                expedited_interval_days: config.expedited_interval_days,
                tolerance_percent: config.tolerance_percent,
                unit_price: config.unit_price,
                monthly_interest: config.monthly_interest,
                ..InspectionConfig::default()
            },
        );
        Self {
            store,
            ledger,
            warnings,
            notifier,
            claims,
            appeals,
            inspections,
        }
    }

    // --- Claims ---

    pub async fn create_declaration(
        &self,
        identity: &str,
        quantities: BTreeMap<MaterialType, Quantity>,
    ) -> Result<Claim> {
        let identity = Identity::parse(identity)?;
        self.claims.create_declaration(&identity, quantities).await
    }

    pub async fn submit_reading(
        &self,
        identity: &str,
        request: ReadingRequest,
    ) -> Result<ReadingOutcome> {
        let identity = Identity::parse(identity)?;
        self.claims.create_reading(&identity, request).await
    }

    pub async fn approve_claim(&self, claim_id: &ClaimId, approver: &str) -> Result<Claim> {
        let approver = Identity::parse(approver)?;
        self.claims.approve(claim_id, &approver).await
    }

    pub async fn reject_claim(
        &self,
        claim_id: &ClaimId,
        resolver: &str,
        reason: &str,
    ) -> Result<Claim> {
        let resolver = Identity::parse(resolver)?;
        self.claims.reject(claim_id, &resolver, reason).await
    }

    /// Flag a claim as fraud and immediately open the appeal that will
    /// adjudicate it.
    pub async fn mark_claim_fraud(
        &self,
        claim_id: &ClaimId,
        staff: &str,
        reason: &str,
    ) -> Result<(Claim, Appeal)> {
        let staff = Identity::parse(staff)?;
        let claim = self.claims.mark_fraud(claim_id, &staff, reason).await?;
        let appeal = self.appeals.open(claim_id, &staff, reason).await?;
        Ok((claim, appeal))
    }

    pub async fn get_claim(&self, claim_id: &ClaimId) -> Result<Claim> {
        self.claims.get(claim_id).await
    }

    pub async fn claim_for_token(&self, token_id: &str) -> Result<Claim> {
        self.claims.claim_for_token(token_id).await
    }

    pub async fn pending_claims(&self) -> Result<Vec<Claim>> {
        self.claims.pending().await
    }

    pub async fn claims_for(&self, identity: &str) -> Result<Vec<Claim>> {
        let identity = Identity::parse(identity)?;
        self.claims.for_identity(&identity).await
    }

    // --- Appeals ---

    pub async fn open_appeal(
        &self,
        claim_id: &ClaimId,
        staff: &str,
        reason: &str,
    ) -> Result<Appeal> {
        let staff = Identity::parse(staff)?;
        self.appeals.open(claim_id, &staff, reason).await
    }

    pub async fn resolve_appeal(
        &self,
        appeal_id: &AppealId,
        admin: &str,
        decision: AppealDecision,
        note: Option<&str>,
    ) -> Result<Appeal> {
        let admin = Identity::parse(admin)?;
        self.appeals.resolve(appeal_id, &admin, decision, note).await
    }

    pub async fn pending_appeals(&self) -> Result<Vec<Appeal>> {
        self.appeals.pending().await
    }

    // --- Sanction status ---

    pub async fn fraud_status(&self, identity: &str) -> Result<FraudStatus> {
        let identity = Identity::parse(identity)?;
        Ok(FraudStatus {
            warnings: self.warnings.status(&identity).await?,
            pending_balance: self.ledger.balance(&identity).await?,
            fraud_records: self.store.fraud_records(&identity).await?,
        })
    }

    // --- Ledger ---

    pub async fn balance(&self, identity: &str) -> Result<RewardAmount> {
        let identity = Identity::parse(identity)?;
        self.ledger.balance(&identity).await
    }

    pub async fn claim_rewards(&self, identity: &str) -> Result<SettlementReceipt> {
        let identity = Identity::parse(identity)?;
        let receipt = self.ledger.claim_rewards(&identity).await?;
        self.notifier
            .notify(
                NotifyTarget::Citizen(identity),
                NotificationKind::RewardClaimed,
                "Rewards paid out",
                &format!("{} transferred, reference {}", receipt.amount, receipt.reference),
            )
            .await;
        Ok(receipt)
    }

    // --- Inspections ---

    pub async fn schedule_inspection(
        &self,
        identity: &str,
        meter_ref: &str,
        reported_value: u64,
        inspector: Option<&str>,
    ) -> Result<InspectionRecord> {
        let identity = Identity::parse(identity)?;
        let inspector = match inspector {
            Some(raw) => Some(Identity::parse(raw)?),
            None => None,
        };
        let has_open_signal = self.has_open_fraud(&identity).await?;
        self.inspections
            .schedule(&identity, meter_ref, reported_value, inspector, has_open_signal)
            .await
    }

    pub async fn complete_inspection(
        &self,
        inspection_id: &InspectionId,
        inspector: &str,
        actual_value: u64,
        fraud_found: bool,
        notes: Option<&str>,
    ) -> Result<InspectionRecord> {
        let inspector = Identity::parse(inspector)?;
        self.inspections
            .complete(inspection_id, &inspector, actual_value, fraud_found, notes)
            .await
    }

    pub async fn cancel_inspection(
        &self,
        inspection_id: &InspectionId,
        by: &str,
        reason: Option<&str>,
    ) -> Result<InspectionRecord> {
        let by = Identity::parse(by)?;
        self.inspections.cancel(inspection_id, &by, reason).await
    }

    pub async fn pending_inspections(&self) -> Result<Vec<InspectionRecord>> {
        self.inspections.pending().await
    }

    /// Identities past their inspection interval, highest priority first.
    /// Candidates are every identity that has submitted a water reading.
    pub async fn inspections_due(&self) -> Result<Vec<(Identity, u8)>> {
        let mut candidates: Vec<(Identity, bool)> = Vec::new();
        for state in [ClaimState::Pending, ClaimState::Approved, ClaimState::Fraud] {
            for claim in self.store.claims_by_state(state).await? {
                if claim.domain() != civic_types::Domain::Water {
                    continue;
                }
                if candidates.iter().any(|(id, _)| id == &claim.identity) {
                    continue;
                }
                let open = self.has_open_fraud(&claim.identity).await?;
                candidates.push((claim.identity, open));
            }
        }
        self.inspections.due_scan(&candidates).await
    }

    pub async fn authorize_inspector(&self, identity: &str) -> Result<()> {
        let identity = Identity::parse(identity)?;
        self.inspections.authorize_inspector(&identity).await
    }

    pub async fn revoke_inspector(&self, identity: &str) -> Result<bool> {
        let identity = Identity::parse(identity)?;
        self.inspections.revoke_inspector(&identity).await
    }

    async fn has_open_fraud(&self, identity: &Identity) -> Result<bool> {
        let claims = self.store.claims_by_identity(identity).await?;
        Ok(claims.iter().any(|c| c.state == ClaimState::Fraud))
    }

    // --- Sweeps ---

    /// One pass of the periodic maintenance: expire lapsed declaration
    /// tokens and log inspection backlog. Re-entrant.
    pub async fn sweep(&self) -> Result<()> {
        let expired = self.claims.sweep_expired().await?;
        let due = self.inspections_due().await?;
        if expired > 0 || !due.is_empty() {
            info!(
                expired,
                inspections_due = due.len(),
                "🧹 Maintenance sweep finished"
            );
        }
        Ok(())
    }

    /// Spawn the periodic sweep loop.
    pub fn run_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = service.sweep().await {
                    error!(error = %e, "Sweep pass failed");
                }
            }
        })
    }
}
