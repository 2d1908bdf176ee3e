use crate::Result;
use async_trait::async_trait;
use civic_types::{
    Appeal, AppealId, AppealStatus, Claim, ClaimId, ClaimState, FraudRecord, Identity,
    InspectionId, InspectionRecord, InspectionStatus, RewardAmount, WarningRecord,
};

/// Authoritative persistence for every adjudication entity.
///
/// All mutating claim/appeal/inspection operations are compare-and-swap on
/// the entity version: a writer that read a stale version observes
/// `StorageError::VersionConflict` and must not silently overwrite.
/// `credit_if_absent` is the single atomic credit primitive; the claim id is
/// its idempotency key.
#[async_trait]
pub trait AdjudicationStore: Send + Sync {
    // --- Claims ---

    /// Insert a new claim. Fails if the id already exists.
    async fn put_claim(&self, claim: &Claim) -> Result<()>;

    async fn get_claim(&self, id: &ClaimId) -> Result<Option<Claim>>;

    /// Replace a claim if its stored version equals `expected_version`;
    /// the stored version is bumped by one.
    async fn update_claim(&self, claim: &Claim, expected_version: u64) -> Result<()>;

    async fn claims_by_state(&self, state: ClaimState) -> Result<Vec<Claim>>;

    async fn claims_by_identity(&self, identity: &Identity) -> Result<Vec<Claim>>;

    /// Look up a declaration claim by its QR token id.
    async fn claim_by_token(&self, token_id: &str) -> Result<Option<Claim>>;

    // --- Appeals ---

    async fn put_appeal(&self, appeal: &Appeal) -> Result<()>;

    async fn get_appeal(&self, id: &AppealId) -> Result<Option<Appeal>>;

    async fn update_appeal(&self, appeal: &Appeal, expected_version: u64) -> Result<()>;

    async fn pending_appeal_for_claim(&self, claim_id: &ClaimId) -> Result<Option<Appeal>>;

    async fn appeals_by_status(&self, status: AppealStatus) -> Result<Vec<Appeal>>;

    // --- Warning counters ---

    async fn get_warnings(&self, identity: &Identity) -> Result<Option<WarningRecord>>;

    async fn put_warnings(&self, record: &WarningRecord) -> Result<()>;

    // --- Inspections ---

    async fn put_inspection(&self, record: &InspectionRecord) -> Result<()>;

    async fn get_inspection(&self, id: &InspectionId) -> Result<Option<InspectionRecord>>;

    async fn update_inspection(
        &self,
        record: &InspectionRecord,
        expected_version: u64,
    ) -> Result<()>;

    async fn pending_inspection_for(
        &self,
        identity: &Identity,
    ) -> Result<Option<InspectionRecord>>;

    async fn inspections_by_status(
        &self,
        status: InspectionStatus,
    ) -> Result<Vec<InspectionRecord>>;

    /// Most recent terminal (completed or fraud-found) inspection.
    async fn last_completed_inspection(
        &self,
        identity: &Identity,
    ) -> Result<Option<InspectionRecord>>;

    // --- Reward balances ---

    async fn get_balance(&self, identity: &Identity) -> Result<RewardAmount>;

    /// Atomically credit `amount` unless `claim_id` was credited before.
    /// Returns true when the balance changed.
    async fn credit_if_absent(
        &self,
        identity: &Identity,
        claim_id: &ClaimId,
        amount: RewardAmount,
    ) -> Result<bool>;

    /// Zero the balance, recording `reference`, but only if the current
    /// balance still equals `expected` (a concurrent credit otherwise
    /// surfaces as a version conflict).
    async fn settle_balance(
        &self,
        identity: &Identity,
        expected: RewardAmount,
        reference: &str,
    ) -> Result<()>;

    /// Number of successful settlements for the identity, used as the
    /// settlement reference nonce.
    async fn settlement_count(&self, identity: &Identity) -> Result<u64>;

    // --- Fraud audit trail ---

    async fn append_fraud_record(&self, record: &FraudRecord) -> Result<()>;

    async fn fraud_records(&self, identity: &Identity) -> Result<Vec<FraudRecord>>;

    // --- Inspector whitelist ---

    async fn add_inspector(&self, identity: &Identity) -> Result<()>;

    async fn remove_inspector(&self, identity: &Identity) -> Result<bool>;

    async fn is_inspector(&self, identity: &Identity) -> Result<bool>;
}
