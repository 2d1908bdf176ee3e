use chrono::Utc;
use civic_ledger::RewardLedger;
use civic_sanctions::{PenaltyClient, WarningTracker};
use civic_storage::{AdjudicationStore, StorageError};
use civic_types::{
    Appeal, AppealId, AppealStatus, CivicError, Claim, ClaimId, ClaimState, DependencyOutcome,
    Domain, FraudRecord, Identity, NotificationKind, NotificationSink, NotifyTarget, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppealDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Penalty when the rejection also exhausts the warnings.
    pub full_penalty: f64,
    /// Penalty while warnings remain.
    pub partial_penalty: f64,
    pub penalty_timeout: Duration,
    pub penalty_attempts: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            full_penalty: 100.0,
            partial_penalty: 50.0,
            penalty_timeout: Duration::from_secs(15),
            penalty_attempts: 2,
        }
    }
}

/// Resolves fraud appeals.
///
/// Approving restores the claim and one warning; rejecting confirms the
/// fraud, deducts a warning and levies the penalty. The penalty call runs
/// strictly after the local commit and its outcome is recorded on the
/// appeal, never rolled back into it.
pub struct AppealResolver {
    store: Arc<dyn AdjudicationStore>,
    ledger: Arc<RewardLedger>,
    warnings: Arc<WarningTracker>,
    penalty: Arc<dyn PenaltyClient>,
    notifier: Arc<dyn NotificationSink>,
    config: ResolverConfig,
}

impl AppealResolver {
    pub fn new(
        store: Arc<dyn AdjudicationStore>,
        ledger: Arc<RewardLedger>,
        warnings: Arc<WarningTracker>,
        penalty: Arc<dyn PenaltyClient>,
        notifier: Arc<dyn NotificationSink>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            warnings,
            penalty,
            notifier,
            config,
        }
    }

    /// Open an appeal for a fraud-marked claim. At most one pending appeal
    /// may exist per claim.
    pub async fn open(
        &self,
        claim_id: &ClaimId,
        staff: &Identity,
        reason: &str,
    ) -> Result<Appeal> {
        let claim = self
            .store
            .get_claim(claim_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("claim {}", claim_id)))?;
        if claim.state != ClaimState::Fraud {
            return Err(CivicError::Conflict(format!(
                "claim {} is {}, appeals only follow a fraud mark",
                claim_id,
                claim.state.as_str()
            )));
        }

        let now = Utc::now();
        let appeal = Appeal {
            id: AppealId::new(
                format!("{}:{}:{}", claim_id, staff, now.timestamp_micros()).as_bytes(),
            ),
            claim_id: *claim_id,
            identity: claim.identity.clone(),
            staff_identity: staff.clone(),
            reason: reason.to_string(),
            status: AppealStatus::Pending,
            admin_identity: None,
            decision_note: None,
            created_at: now,
            resolved_at: None,
            penalty: None,
            version: 0,
        };
        match self.store.put_appeal(&appeal).await {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => {
                return Err(CivicError::DuplicateAppeal(*claim_id))
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            appeal_id = %appeal.id,
            claim_id = %claim_id,
            staff = %staff.short(),
            "⚖️ Appeal opened"
        );
        Ok(appeal)
    }

    /// Resolve a pending appeal. Terminal and idempotent: a second resolve
    /// observes a conflict and re-applies nothing.
    pub async fn resolve(
        &self,
        appeal_id: &AppealId,
        admin: &Identity,
        decision: AppealDecision,
        note: Option<&str>,
    ) -> Result<Appeal> {
        let appeal = self
            .store
            .get_appeal(appeal_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("appeal {}", appeal_id)))?;
        if appeal.is_resolved() {
            return Err(CivicError::Conflict(format!(
                "appeal {} was already resolved",
                appeal_id
            )));
        }
        let claim = self
            .store
            .get_claim(&appeal.claim_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("claim {}", appeal.claim_id)))?;

        let mut resolved = appeal.clone();
        resolved.admin_identity = Some(admin.clone());
        resolved.decision_note = note.map(str::to_string);
        resolved.resolved_at = Some(Utc::now());

        // The decision's local effects land before the appeal goes
        // terminal: a crash in between leaves a pending appeal whose
        // retry re-applies only idempotent effects. An appeal must never
        // read resolved while the claim and warnings still read fraud.
        match decision {
            AppealDecision::Approve => {
                self.vindicate(&resolved, &claim).await?;
                resolved.status = AppealStatus::Approved;
                self.store.update_appeal(&resolved, appeal.version).await?;
                resolved.version = appeal.version + 1;
            }
            AppealDecision::Reject => {
                self.confirm_fraud(&mut resolved, &claim, appeal.version)
                    .await?;
            }
        }

        self.notifier
            .notify(
                NotifyTarget::Citizen(resolved.identity.clone()),
                NotificationKind::AppealResolved,
                "Appeal resolved",
                match decision {
                    AppealDecision::Approve => "Your appeal was upheld, the claim is approved",
                    AppealDecision::Reject => "Your appeal was rejected, the fraud mark stands",
                },
            )
            .await;
        Ok(resolved)
    }

    /// Citizen vindicated: claim back to approved, reward credited once,
    /// one warning restored.
    async fn vindicate(&self, appeal: &Appeal, claim: &Claim) -> Result<()> {
        let domain = claim.domain();

        // An already-approved claim means an earlier attempt got this
        // far; the credit and restore below are safe to repeat.
        if claim.state == ClaimState::Fraud {
            let mut next = claim.clone();
            next.state = ClaimState::Approved;
            next.resolved_at = Some(Utc::now());
            next.fraud_reason = None;
            self.store.update_claim(&next, claim.version).await?;
        }

        if !claim.computed_reward.is_zero() {
            self.ledger
                .accrue(&claim.identity, &claim.id, claim.computed_reward)
                .await?;
        }
        self.warnings.restore(&claim.identity, domain).await?;

        info!(
            appeal_id = %appeal.id,
            claim_id = %claim.id,
            identity = %claim.identity.short(),
            "✅ Appeal upheld, claim restored"
        );
        Ok(())
    }

    /// Fraud confirmed: the claim stays fraud, one warning goes, and the
    /// external penalty is attempted post-commit.
    async fn confirm_fraud(
        &self,
        appeal: &mut Appeal,
        claim: &Claim,
        base_version: u64,
    ) -> Result<()> {
        let domain = claim.domain();
        let deduction = self.warnings.deduct(&claim.identity, domain).await?;

        let amount = if deduction.blacklisted_now {
            self.config.full_penalty
        } else {
            self.config.partial_penalty
        };

        if deduction.blacklisted_now {
            // Best-effort mirror; the local flag is authoritative.
            if let Err(e) = self.penalty.blacklist(&claim.identity, domain).await {
                error!(
                    identity = %claim.identity.short(),
                    domain = %domain,
                    error = %e,
                    "On-chain blacklist mirror failed"
                );
            }
        }

        appeal.status = AppealStatus::Rejected;
        self.store.update_appeal(appeal, base_version).await?;
        appeal.version = base_version + 1;

        let outcome = self
            .call_penalty(&claim.identity, domain, amount, &appeal.reason)
            .await;

        self.store
            .append_fraud_record(&FraudRecord {
                identity: claim.identity.clone(),
                domain,
                detection_method: "appeal".to_string(),
                penalty_amount: amount,
                reported_value: None,
                actual_value: None,
                underpayment: 0.0,
                interest: 0.0,
                reference: match &outcome {
                    DependencyOutcome::Confirmed { reference } => Some(reference.clone()),
                    DependencyOutcome::Failed { .. } => None,
                },
                detected_by: appeal
                    .admin_identity
                    .clone()
                    .unwrap_or_else(|| appeal.staff_identity.clone()),
                created_at: Utc::now(),
            })
            .await?;

        appeal.penalty = Some(outcome);
        self.store.update_appeal(appeal, appeal.version).await?;
        appeal.version += 1;

        warn!(
            appeal_id = %appeal.id,
            identity = %claim.identity.short(),
            penalty = amount,
            blacklisted = deduction.blacklisted_now,
            "🚩 Fraud confirmed"
        );
        Ok(())
    }

    async fn call_penalty(
        &self,
        identity: &Identity,
        domain: Domain,
        amount: f64,
        reason: &str,
    ) -> DependencyOutcome {
        let mut last_error = String::new();
        for attempt in 1..=self.config.penalty_attempts {
            let call = self.penalty.apply_penalty(identity, domain, amount, reason);
            match tokio::time::timeout(self.config.penalty_timeout, call).await {
                Ok(Ok(reference)) => {
                    return DependencyOutcome::Confirmed { reference };
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = "penalty call timed out".to_string(),
            }
            warn!(
                identity = %identity.short(),
                attempt,
                error = %last_error,
                "Penalty call failed"
            );
        }
        DependencyOutcome::Failed { error: last_error }
    }

    pub async fn get(&self, appeal_id: &AppealId) -> Result<Appeal> {
        self.store
            .get_appeal(appeal_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("appeal {}", appeal_id)))
    }

    pub async fn pending(&self) -> Result<Vec<Appeal>> {
        self.store
            .appeals_by_status(AppealStatus::Pending)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use civic_ledger::{LedgerConfig, SettlementClient};
    use civic_storage::MemoryBackend;
    use civic_types::{ClaimBody, ErrorKind, MaterialType, Quantity, QrToken, RewardAmount};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct NoRail;

    #[async_trait]
    impl SettlementClient for NoRail {
        async fn transfer(
            &self,
            _to: &Identity,
            _amount: RewardAmount,
            reference: &str,
        ) -> anyhow::Result<String> {
            Ok(format!("tx-{}", reference))
        }
    }

    struct RecordingPenalty {
        calls: Mutex<Vec<f64>>,
        blacklists: AtomicUsize,
        fail: bool,
    }

    impl RecordingPenalty {
        fn new(fail: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                blacklists: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl PenaltyClient for RecordingPenalty {
        async fn apply_penalty(
            &self,
            _identity: &Identity,
            _domain: Domain,
            amount: f64,
            _reason: &str,
        ) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(amount);
            if self.fail {
                anyhow::bail!("chain unavailable");
            }
            Ok("pen-1".to_string())
        }

        async fn blacklist(&self, _identity: &Identity, _domain: Domain) -> anyhow::Result<String> {
            self.blacklists.fetch_add(1, Ordering::SeqCst);
            Ok("bl-1".to_string())
        }
    }

    struct SilentSink;

    #[async_trait]
    impl NotificationSink for SilentSink {
        async fn notify(
            &self,
            _target: NotifyTarget,
            _kind: NotificationKind,
            _title: &str,
            _message: &str,
        ) {
        }
    }

    struct Fixture {
        resolver: AppealResolver,
        store: Arc<MemoryBackend>,
        ledger: Arc<RewardLedger>,
        warnings: Arc<WarningTracker>,
        penalty: Arc<RecordingPenalty>,
    }

    fn fixture(fail_penalty: bool) -> Fixture {
        let store = Arc::new(MemoryBackend::new());
        let ledger = Arc::new(RewardLedger::new(
            store.clone(),
            Arc::new(NoRail),
            LedgerConfig::default(),
        ));
        let warnings = Arc::new(WarningTracker::new(store.clone()));
        let penalty = Arc::new(RecordingPenalty::new(fail_penalty));
        let resolver = AppealResolver::new(
            store.clone(),
            ledger.clone(),
            warnings.clone(),
            penalty.clone(),
            Arc::new(SilentSink),
            ResolverConfig::default(),
        );
        Fixture {
            resolver,
            store,
            ledger,
            warnings,
            penalty,
        }
    }

    fn citizen() -> Identity {
        Identity::parse("0x5555555555555555555555555555555555555555").unwrap()
    }

    fn staff() -> Identity {
        Identity::parse("0x6666666666666666666666666666666666666666").unwrap()
    }

    fn admin() -> Identity {
        Identity::parse("0x7777777777777777777777777777777777777777").unwrap()
    }

    async fn seed_fraud_claim(store: &MemoryBackend, reward: u64, tag: &str) -> Claim {
        let now = Utc::now();
        let claim = Claim {
            id: ClaimId::new(tag.as_bytes()),
            identity: citizen(),
            body: ClaimBody::Declaration {
                quantities: BTreeMap::from([(MaterialType::Plastic, Quantity::from_kg(2.0))]),
                token: QrToken {
                    token_id: format!("tok-{}", tag),
                    hash: "h".to_string(),
                    issued_at: now,
                    expires_at: now + chrono::Duration::hours(3),
                    used: false,
                },
            },
            computed_reward: RewardAmount::from_tokens(reward),
            state: ClaimState::Fraud,
            created_at: now,
            resolved_at: Some(now),
            resolver_identity: Some(staff()),
            fraud_reason: Some("flagged".to_string()),
            version: 0,
        };
        store.put_claim(&claim).await.unwrap();
        claim
    }

    #[tokio::test]
    async fn open_requires_fraud_state() {
        let f = fixture(false);
        let mut claim = seed_fraud_claim(&f.store, 20, "open-state").await;
        claim.state = ClaimState::Pending;
        f.store.update_claim(&claim, 0).await.unwrap();

        let err = f
            .resolver
            .open(&claim.id, &staff(), "reason")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn duplicate_open_is_distinguishable() {
        let f = fixture(false);
        let claim = seed_fraud_claim(&f.store, 20, "dup-open").await;
        f.resolver.open(&claim.id, &staff(), "first").await.unwrap();

        let err = f
            .resolver
            .open(&claim.id, &staff(), "second")
            .await
            .unwrap_err();
        assert!(matches!(err, CivicError::DuplicateAppeal(id) if id == claim.id));
    }

    #[tokio::test]
    async fn approval_restores_claim_credit_and_warning() {
        let f = fixture(false);
        let claim = seed_fraud_claim(&f.store, 37, "uphold").await;
        // One warning already gone from an earlier incident.
        f.warnings.deduct(&citizen(), Domain::Recycling).await.unwrap();

        let appeal = f.resolver.open(&claim.id, &staff(), "receipts").await.unwrap();
        let resolved = f
            .resolver
            .resolve(&appeal.id, &admin(), AppealDecision::Approve, None)
            .await
            .unwrap();
        assert_eq!(resolved.status, AppealStatus::Approved);

        let stored = f.store.get_claim(&claim.id).await.unwrap().unwrap();
        assert_eq!(stored.state, ClaimState::Approved);
        assert_eq!(
            f.ledger.balance(&citizen()).await.unwrap(),
            RewardAmount::from_tokens(37)
        );
        let record = f.warnings.status(&citizen()).await.unwrap();
        assert_eq!(record.remaining(Domain::Recycling), 2);
        assert!(f.penalty.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejection_deducts_and_applies_partial_penalty() {
        let f = fixture(false);
        let claim = seed_fraud_claim(&f.store, 37, "reject-partial").await;
        let appeal = f.resolver.open(&claim.id, &staff(), "filler bags").await.unwrap();

        let resolved = f
            .resolver
            .resolve(&appeal.id, &admin(), AppealDecision::Reject, Some("confirmed"))
            .await
            .unwrap();
        assert_eq!(resolved.status, AppealStatus::Rejected);
        assert!(matches!(
            resolved.penalty,
            Some(DependencyOutcome::Confirmed { .. })
        ));

        let stored = f.store.get_claim(&claim.id).await.unwrap().unwrap();
        assert_eq!(stored.state, ClaimState::Fraud);
        assert_eq!(f.ledger.balance(&citizen()).await.unwrap(), RewardAmount::ZERO);

        let record = f.warnings.status(&citizen()).await.unwrap();
        assert_eq!(record.remaining(Domain::Recycling), 1);
        assert!(!record.is_blacklisted(Domain::Recycling));
        assert_eq!(*f.penalty.calls.lock().unwrap(), vec![50.0]);
        assert_eq!(f.penalty.blacklists.load(Ordering::SeqCst), 0);

        let frauds = f.store.fraud_records(&citizen()).await.unwrap();
        assert_eq!(frauds.len(), 1);
        assert_eq!(frauds[0].detection_method, "appeal");
    }

    #[tokio::test]
    async fn second_rejection_blacklists_with_full_penalty() {
        let f = fixture(false);
        for (i, tag) in ["strike-one", "strike-two"].iter().enumerate() {
            let claim = seed_fraud_claim(&f.store, 10, tag).await;
            let appeal = f.resolver.open(&claim.id, &staff(), "fraud").await.unwrap();
            f.resolver
                .resolve(&appeal.id, &admin(), AppealDecision::Reject, None)
                .await
                .unwrap();
            let record = f.warnings.status(&citizen()).await.unwrap();
            assert_eq!(record.remaining(Domain::Recycling) as usize, 1 - i);
        }

        let record = f.warnings.status(&citizen()).await.unwrap();
        assert!(record.is_blacklisted(Domain::Recycling));
        assert_eq!(*f.penalty.calls.lock().unwrap(), vec![50.0, 100.0]);
        assert_eq!(f.penalty.blacklists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn penalty_failure_never_blocks_the_decision() {
        let f = fixture(true);
        let claim = seed_fraud_claim(&f.store, 10, "pen-fail").await;
        let appeal = f.resolver.open(&claim.id, &staff(), "fraud").await.unwrap();

        let resolved = f
            .resolver
            .resolve(&appeal.id, &admin(), AppealDecision::Reject, None)
            .await
            .unwrap();
        assert_eq!(resolved.status, AppealStatus::Rejected);
        assert!(matches!(
            resolved.penalty,
            Some(DependencyOutcome::Failed { .. })
        ));
        // Retried per the attempt budget.
        assert_eq!(f.penalty.calls.lock().unwrap().len(), 2);

        let record = f.warnings.status(&citizen()).await.unwrap();
        assert_eq!(record.remaining(Domain::Recycling), 1);
    }

    #[tokio::test]
    async fn approval_retry_heals_a_partial_restore() {
        let f = fixture(false);
        let claim = seed_fraud_claim(&f.store, 37, "partial-heal").await;
        let appeal = f.resolver.open(&claim.id, &staff(), "receipts").await.unwrap();

        // The claim transition landed but the appeal never went terminal.
        let mut flipped = claim.clone();
        flipped.state = ClaimState::Approved;
        flipped.fraud_reason = None;
        f.store.update_claim(&flipped, claim.version).await.unwrap();

        let resolved = f
            .resolver
            .resolve(&appeal.id, &admin(), AppealDecision::Approve, None)
            .await
            .unwrap();
        assert_eq!(resolved.status, AppealStatus::Approved);
        assert_eq!(
            f.ledger.balance(&citizen()).await.unwrap(),
            RewardAmount::from_tokens(37)
        );
        let record = f.warnings.status(&citizen()).await.unwrap();
        assert_eq!(record.remaining(Domain::Recycling), 2);
    }

    #[tokio::test]
    async fn re_resolving_is_a_conflict() {
        let f = fixture(false);
        let claim = seed_fraud_claim(&f.store, 10, "re-resolve").await;
        let appeal = f.resolver.open(&claim.id, &staff(), "fraud").await.unwrap();
        f.resolver
            .resolve(&appeal.id, &admin(), AppealDecision::Reject, None)
            .await
            .unwrap();

        let err = f
            .resolver
            .resolve(&appeal.id, &admin(), AppealDecision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // No second deduction or penalty.
        let record = f.warnings.status(&citizen()).await.unwrap();
        assert_eq!(record.remaining(Domain::Recycling), 1);
        assert_eq!(f.penalty.calls.lock().unwrap().len(), 1);
    }
}
