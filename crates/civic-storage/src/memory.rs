use crate::backend::AdjudicationStore;
use crate::error::StorageError;
use crate::Result;
use async_trait::async_trait;
use civic_types::{
    Appeal, AppealId, AppealStatus, Claim, ClaimId, ClaimState, FraudRecord, Identity,
    InspectionId, InspectionRecord, InspectionStatus, RewardAmount, WarningRecord,
};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Identity, RewardAmount>,
    credited: HashSet<ClaimId>,
    settlements: HashMap<Identity, u64>,
}

/// HashMap-backed store for tests and single-process deployments.
pub struct MemoryBackend {
    claims: RwLock<HashMap<ClaimId, Claim>>,
    appeals: RwLock<HashMap<AppealId, Appeal>>,
    warnings: RwLock<HashMap<Identity, WarningRecord>>,
    inspections: RwLock<HashMap<InspectionId, InspectionRecord>>,
    // Balance, credited set and settlement counters share one lock so a
    // credit and a settlement can never interleave at the map level.
    ledger: RwLock<LedgerState>,
    fraud: RwLock<HashMap<Identity, Vec<FraudRecord>>>,
    inspectors: RwLock<HashSet<Identity>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            claims: RwLock::new(HashMap::new()),
            appeals: RwLock::new(HashMap::new()),
            warnings: RwLock::new(HashMap::new()),
            inspections: RwLock::new(HashMap::new()),
            ledger: RwLock::new(LedgerState::default()),
            fraud: RwLock::new(HashMap::new()),
            inspectors: RwLock::new(HashSet::new()),
        }
    }

    fn lock_err() -> StorageError {
        StorageError::Backend("lock poisoned".to_string())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdjudicationStore for MemoryBackend {
    async fn put_claim(&self, claim: &Claim) -> Result<()> {
        let mut claims = self.claims.write().map_err(|_| Self::lock_err())?;
        if claims.contains_key(&claim.id) {
            return Err(StorageError::AlreadyExists(claim.id.to_hex()));
        }
        claims.insert(claim.id, claim.clone());
        Ok(())
    }

    async fn get_claim(&self, id: &ClaimId) -> Result<Option<Claim>> {
        let claims = self.claims.read().map_err(|_| Self::lock_err())?;
        Ok(claims.get(id).cloned())
    }

    async fn update_claim(&self, claim: &Claim, expected_version: u64) -> Result<()> {
        let mut claims = self.claims.write().map_err(|_| Self::lock_err())?;
        let current = claims
            .get(&claim.id)
            .ok_or_else(|| StorageError::NotFound(claim.id.to_hex()))?;
        if current.version != expected_version {
            return Err(StorageError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        let mut next = claim.clone();
        next.version = expected_version + 1;
        claims.insert(next.id, next);
        Ok(())
    }

    async fn claims_by_state(&self, state: ClaimState) -> Result<Vec<Claim>> {
        let claims = self.claims.read().map_err(|_| Self::lock_err())?;
        let mut out: Vec<Claim> = claims.values().filter(|c| c.state == state).cloned().collect();
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }

    async fn claims_by_identity(&self, identity: &Identity) -> Result<Vec<Claim>> {
        let claims = self.claims.read().map_err(|_| Self::lock_err())?;
        let mut out: Vec<Claim> = claims
            .values()
            .filter(|c| &c.identity == identity)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }

    async fn claim_by_token(&self, token_id: &str) -> Result<Option<Claim>> {
        let claims = self.claims.read().map_err(|_| Self::lock_err())?;
        Ok(claims
            .values()
            .find(|c| c.token().map(|t| t.token_id.as_str()) == Some(token_id))
            .cloned())
    }

    async fn put_appeal(&self, appeal: &Appeal) -> Result<()> {
        let mut appeals = self.appeals.write().map_err(|_| Self::lock_err())?;
        if appeals.contains_key(&appeal.id) {
            return Err(StorageError::AlreadyExists(appeal.id.to_hex()));
        }
        // One pending appeal per claim is an invariant the store itself
        // enforces, so two racing staff members cannot both file.
        if appeals
            .values()
            .any(|a| a.claim_id == appeal.claim_id && a.status == AppealStatus::Pending)
        {
            return Err(StorageError::AlreadyExists(format!(
                "pending appeal for claim {}",
                appeal.claim_id
            )));
        }
        appeals.insert(appeal.id, appeal.clone());
        Ok(())
    }

    async fn get_appeal(&self, id: &AppealId) -> Result<Option<Appeal>> {
        let appeals = self.appeals.read().map_err(|_| Self::lock_err())?;
        Ok(appeals.get(id).cloned())
    }

    async fn update_appeal(&self, appeal: &Appeal, expected_version: u64) -> Result<()> {
        let mut appeals = self.appeals.write().map_err(|_| Self::lock_err())?;
        let current = appeals
            .get(&appeal.id)
            .ok_or_else(|| StorageError::NotFound(appeal.id.to_hex()))?;
        if current.version != expected_version {
            return Err(StorageError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        let mut next = appeal.clone();
        next.version = expected_version + 1;
        appeals.insert(next.id, next);
        Ok(())
    }

    async fn pending_appeal_for_claim(&self, claim_id: &ClaimId) -> Result<Option<Appeal>> {
        let appeals = self.appeals.read().map_err(|_| Self::lock_err())?;
        Ok(appeals
            .values()
            .find(|a| &a.claim_id == claim_id && a.status == AppealStatus::Pending)
            .cloned())
    }

    async fn appeals_by_status(&self, status: AppealStatus) -> Result<Vec<Appeal>> {
        let appeals = self.appeals.read().map_err(|_| Self::lock_err())?;
        let mut out: Vec<Appeal> =
            appeals.values().filter(|a| a.status == status).cloned().collect();
        out.sort_by_key(|a| a.created_at);
        Ok(out)
    }

    async fn get_warnings(&self, identity: &Identity) -> Result<Option<WarningRecord>> {
        let warnings = self.warnings.read().map_err(|_| Self::lock_err())?;
        Ok(warnings.get(identity).cloned())
    }

    async fn put_warnings(&self, record: &WarningRecord) -> Result<()> {
        let mut warnings = self.warnings.write().map_err(|_| Self::lock_err())?;
        warnings.insert(record.identity.clone(), record.clone());
        Ok(())
    }

    async fn put_inspection(&self, record: &InspectionRecord) -> Result<()> {
        let mut inspections = self.inspections.write().map_err(|_| Self::lock_err())?;
        if inspections.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists(record.id.to_hex()));
        }
        inspections.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_inspection(&self, id: &InspectionId) -> Result<Option<InspectionRecord>> {
        let inspections = self.inspections.read().map_err(|_| Self::lock_err())?;
        Ok(inspections.get(id).cloned())
    }

    async fn update_inspection(
        &self,
        record: &InspectionRecord,
        expected_version: u64,
    ) -> Result<()> {
        let mut inspections = self.inspections.write().map_err(|_| Self::lock_err())?;
        let current = inspections
            .get(&record.id)
            .ok_or_else(|| StorageError::NotFound(record.id.to_hex()))?;
        if current.version != expected_version {
            return Err(StorageError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        let mut next = record.clone();
        next.version = expected_version + 1;
        inspections.insert(next.id, next);
        Ok(())
    }

    async fn pending_inspection_for(
        &self,
        identity: &Identity,
    ) -> Result<Option<InspectionRecord>> {
        let inspections = self.inspections.read().map_err(|_| Self::lock_err())?;
        Ok(inspections
            .values()
            .find(|r| &r.identity == identity && r.is_active())
            .cloned())
    }

    async fn inspections_by_status(
        &self,
        status: InspectionStatus,
    ) -> Result<Vec<InspectionRecord>> {
        let inspections = self.inspections.read().map_err(|_| Self::lock_err())?;
        let mut out: Vec<InspectionRecord> = inspections
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.scheduled_at);
        Ok(out)
    }

    async fn last_completed_inspection(
        &self,
        identity: &Identity,
    ) -> Result<Option<InspectionRecord>> {
        let inspections = self.inspections.read().map_err(|_| Self::lock_err())?;
        Ok(inspections
            .values()
            .filter(|r| {
                &r.identity == identity
                    && matches!(
                        r.status,
                        InspectionStatus::Completed | InspectionStatus::FraudFound
                    )
            })
            .max_by_key(|r| r.completed_at)
            .cloned())
    }

    async fn get_balance(&self, identity: &Identity) -> Result<RewardAmount> {
        let ledger = self.ledger.read().map_err(|_| Self::lock_err())?;
        Ok(ledger.balances.get(identity).copied().unwrap_or(RewardAmount::ZERO))
    }

    async fn credit_if_absent(
        &self,
        identity: &Identity,
        claim_id: &ClaimId,
        amount: RewardAmount,
    ) -> Result<bool> {
        let mut ledger = self.ledger.write().map_err(|_| Self::lock_err())?;
        if !ledger.credited.insert(*claim_id) {
            return Ok(false);
        }
        let balance = ledger.balances.entry(identity.clone()).or_insert(RewardAmount::ZERO);
        *balance = balance.saturating_add(amount);
        Ok(true)
    }

    async fn settle_balance(
        &self,
        identity: &Identity,
        expected: RewardAmount,
        _reference: &str,
    ) -> Result<()> {
        let mut ledger = self.ledger.write().map_err(|_| Self::lock_err())?;
        let current = ledger.balances.get(identity).copied().unwrap_or(RewardAmount::ZERO);
        if current != expected {
            return Err(StorageError::VersionConflict {
                expected: expected.to_tokens(),
                actual: current.to_tokens(),
            });
        }
        ledger.balances.insert(identity.clone(), RewardAmount::ZERO);
        *ledger.settlements.entry(identity.clone()).or_insert(0) += 1;
        Ok(())
    }

    async fn settlement_count(&self, identity: &Identity) -> Result<u64> {
        let ledger = self.ledger.read().map_err(|_| Self::lock_err())?;
        Ok(ledger.settlements.get(identity).copied().unwrap_or(0))
    }

    async fn append_fraud_record(&self, record: &FraudRecord) -> Result<()> {
        let mut fraud = self.fraud.write().map_err(|_| Self::lock_err())?;
        fraud
            .entry(record.identity.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn fraud_records(&self, identity: &Identity) -> Result<Vec<FraudRecord>> {
        let fraud = self.fraud.read().map_err(|_| Self::lock_err())?;
        Ok(fraud.get(identity).cloned().unwrap_or_default())
    }

    async fn add_inspector(&self, identity: &Identity) -> Result<()> {
        let mut inspectors = self.inspectors.write().map_err(|_| Self::lock_err())?;
        inspectors.insert(identity.clone());
        Ok(())
    }

    async fn remove_inspector(&self, identity: &Identity) -> Result<bool> {
        let mut inspectors = self.inspectors.write().map_err(|_| Self::lock_err())?;
        Ok(inspectors.remove(identity))
    }

    async fn is_inspector(&self, identity: &Identity) -> Result<bool> {
        let inspectors = self.inspectors.read().map_err(|_| Self::lock_err())?;
        Ok(inspectors.contains(identity))
    }
}
