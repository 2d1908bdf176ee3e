use crate::token::issue_token;
use chrono::Utc;
use civic_ledger::RewardLedger;
use civic_signal::{
    CaptureMetadata, ConsumptionGuard, GuardOutcome, HistoryProvider, SignalEngine, SignalLevel,
    SignalReport,
};
use civic_storage::AdjudicationStore;
use civic_types::{
    CivicError, Claim, ClaimBody, ClaimId, ClaimState, Domain, Identity, MaterialType,
    NotificationKind, NotificationSink, NotifyTarget, Quantity, Result, RewardAmount, RewardRates,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ClaimManagerConfig {
    pub rates: RewardRates,
}

/// A water meter reading submission.
#[derive(Debug, Clone)]
pub struct ReadingRequest {
    pub meter_ref: String,
    pub reading_index: u64,
    pub previous_index: u64,
    /// The submitter acknowledged an unusual consumption drop.
    pub confirmed_drop: bool,
    pub metadata: Option<CaptureMetadata>,
}

/// Result of a reading submission. `NeedsConfirmation` is a soft outcome,
/// not an error: the submitter re-sends with the confirmation flag.
#[derive(Debug, Clone)]
pub enum ReadingOutcome {
    Created(Claim),
    NeedsConfirmation {
        current: f64,
        average: f64,
        drop_percent: f64,
    },
}

/// Orchestrates the claim lifecycle for both domains.
///
/// State transitions go through the store's version check, so a racing
/// approve and mark_fraud on the same claim cannot both win. The ledger
/// credit is keyed by claim id, which makes the approve path safe to retry
/// from any point.
pub struct ClaimManager {
    store: Arc<dyn AdjudicationStore>,
    ledger: Arc<RewardLedger>,
    history: Arc<dyn HistoryProvider>,
    notifier: Arc<dyn NotificationSink>,
    engine: SignalEngine,
    guard: ConsumptionGuard,
    config: ClaimManagerConfig,
}

impl ClaimManager {
    pub fn new(
        store: Arc<dyn AdjudicationStore>,
        ledger: Arc<RewardLedger>,
        history: Arc<dyn HistoryProvider>,
        notifier: Arc<dyn NotificationSink>,
        engine: SignalEngine,
        guard: ConsumptionGuard,
        config: ClaimManagerConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            history,
            notifier,
            engine,
            guard,
            config,
        }
    }

    async fn ensure_not_blacklisted(&self, identity: &Identity, domain: Domain) -> Result<()> {
        if let Some(record) = self.store.get_warnings(identity).await? {
            if record.is_blacklisted(domain) {
                return Err(CivicError::Blacklisted { domain });
            }
        }
        Ok(())
    }

    /// Create a recycling declaration with its 3-hour QR token.
    pub async fn create_declaration(
        &self,
        identity: &Identity,
        quantities: BTreeMap<MaterialType, Quantity>,
    ) -> Result<Claim> {
        self.ensure_not_blacklisted(identity, Domain::Recycling)
            .await?;

        if quantities.values().all(|q| q.is_zero()) {
            return Err(CivicError::Validation(
                "declaration must contain at least one non-zero quantity".to_string(),
            ));
        }
        for (material, quantity) in &quantities {
            let cap = self.config.rates.cap(*material);
            if *quantity > cap {
                return Err(CivicError::QuantityOverCap {
                    material: material.to_string(),
                    max: format!("{} {}", cap, material.unit()),
                });
            }
        }

        let reward = self.config.rates.total_reward(&quantities);
        let now = Utc::now();
        let token = issue_token(identity, now);
        let claim = Claim {
            id: ClaimId::new(
                format!("{}:{}:{}", identity, token.token_id, now.timestamp_micros()).as_bytes(),
            ),
            identity: identity.clone(),
            body: ClaimBody::Declaration { quantities, token },
            computed_reward: reward,
            state: ClaimState::Pending,
            created_at: now,
            resolved_at: None,
            resolver_identity: None,
            fraud_reason: None,
            version: 0,
        };
        self.store.put_claim(&claim).await?;

        info!(
            claim_id = %claim.id,
            identity = %identity.short(),
            reward = %reward,
            "📦 Declaration created"
        );
        Ok(claim)
    }

    /// Submit a water meter reading. The consumption guard may soft-reject
    /// until the submitter confirms an unusual drop.
    pub async fn create_reading(
        &self,
        identity: &Identity,
        request: ReadingRequest,
    ) -> Result<ReadingOutcome> {
        self.ensure_not_blacklisted(identity, Domain::Water).await?;

        if request.reading_index < request.previous_index {
            return Err(CivicError::Validation(format!(
                "meter index cannot decrease: previous {}, submitted {}",
                request.previous_index, request.reading_index
            )));
        }
        let consumption = (request.reading_index - request.previous_index) as f64;

        let history = self
            .history
            .recent_values(identity, self.guard_window())
            .await
            .map_err(|e| CivicError::Dependency(format!("history provider: {}", e)))?;

        match self
            .guard
            .evaluate(consumption, &history, request.confirmed_drop)
        {
            GuardOutcome::NeedsConfirmation {
                current,
                average,
                drop_percent,
            } => {
                debug!(
                    identity = %identity.short(),
                    current,
                    average,
                    drop_percent,
                    "Reading held for drop confirmation"
                );
                return Ok(ReadingOutcome::NeedsConfirmation {
                    current,
                    average,
                    drop_percent,
                });
            }
            GuardOutcome::Allow { acknowledged_drop } => {
                let report =
                    self.engine
                        .score(consumption, &history, request.metadata.as_ref());
                self.review_signal(identity, &report, &request).await;

                let now = Utc::now();
                let claim = Claim {
                    id: ClaimId::new(
                        format!(
                            "{}:{}:{}:{}",
                            identity,
                            request.meter_ref,
                            request.reading_index,
                            now.timestamp_micros()
                        )
                        .as_bytes(),
                    ),
                    identity: identity.clone(),
                    body: ClaimBody::Reading {
                        meter_ref: request.meter_ref.clone(),
                        reading_index: request.reading_index,
                        consumption,
                        confirmed_drop: acknowledged_drop,
                    },
                    computed_reward: RewardAmount::ZERO,
                    state: ClaimState::Pending,
                    created_at: now,
                    resolved_at: None,
                    resolver_identity: None,
                    fraud_reason: None,
                    version: 0,
                };
                self.store.put_claim(&claim).await?;
                info!(
                    claim_id = %claim.id,
                    identity = %identity.short(),
                    consumption,
                    confirmed_drop = acknowledged_drop,
                    "💧 Reading recorded"
                );
                Ok(ReadingOutcome::Created(claim))
            }
        }
    }

    /// Log the advisory signal and alert staff on strong anomalies. Never
    /// blocks or rejects the submission on its own.
    async fn review_signal(
        &self,
        identity: &Identity,
        report: &SignalReport,
        request: &ReadingRequest,
    ) {
        let mut flags = self.engine.reading_flags(
            request.reading_index,
            request.previous_index,
            self.previous_consumption(report),
        );
        if let SignalReport::Scored(signal) = report {
            flags.extend(signal.flags.iter().cloned());
            if matches!(signal.level, SignalLevel::High | SignalLevel::Critical) {
                self.notifier
                    .notify(
                        NotifyTarget::Admins,
                        NotificationKind::FraudReviewRequired,
                        "Anomalous reading",
                        &format!(
                            "Reading from {} scored {} ({} flags), review recommended",
                            identity.short(),
                            signal.score,
                            signal.flags.len()
                        ),
                    )
                    .await;
            }
        }
        if !flags.is_empty() {
            debug!(
                identity = %identity.short(),
                flags = ?flags,
                score = report.score(),
                "Signal flags on reading"
            );
        }
    }

    fn previous_consumption(&self, report: &SignalReport) -> f64 {
        match report {
            SignalReport::Scored(s) => s.details.mean,
            SignalReport::InsufficientHistory { .. } => 0.0,
        }
    }

    fn guard_window(&self) -> usize {
        // Guard and engine both read at most this much history.
        8
    }

    /// Approve a pending claim and credit its reward exactly once.
    pub async fn approve(&self, claim_id: &ClaimId, approver: &Identity) -> Result<Claim> {
        let claim = self
            .store
            .get_claim(claim_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("claim {}", claim_id)))?;

        if claim.state != ClaimState::Pending {
            // A crash between the state flip and the credit leaves an
            // approved claim with no credit; the idempotent credit heals
            // that on the retry before the conflict is reported.
            if claim.state == ClaimState::Approved && !claim.computed_reward.is_zero() {
                self.ledger
                    .accrue(&claim.identity, claim_id, claim.computed_reward)
                    .await?;
            }
            return Err(CivicError::Conflict(format!(
                "claim {} is {}, not pending",
                claim_id,
                claim.state.as_str()
            )));
        }

        if let Some(token) = claim.token() {
            if token.used {
                return Err(CivicError::Conflict(format!(
                    "token for claim {} was already used",
                    claim_id
                )));
            }
            if token.is_expired(Utc::now()) {
                return Err(CivicError::Conflict(format!(
                    "token for claim {} has expired",
                    claim_id
                )));
            }
        }

        let mut next = claim.clone();
        next.state = ClaimState::Approved;
        next.resolved_at = Some(Utc::now());
        next.resolver_identity = Some(approver.clone());
        if let ClaimBody::Declaration { token, .. } = &mut next.body {
            token.used = true;
        }
        self.store.update_claim(&next, claim.version).await?;
        next.version = claim.version + 1;

        if !next.computed_reward.is_zero() {
            self.ledger
                .accrue(&next.identity, claim_id, next.computed_reward)
                .await?;
        }

        info!(
            claim_id = %claim_id,
            identity = %next.identity.short(),
            approver = %approver.short(),
            reward = %next.computed_reward,
            "✅ Claim approved"
        );
        self.notifier
            .notify(
                NotifyTarget::Citizen(next.identity.clone()),
                NotificationKind::ClaimApproved,
                "Claim approved",
                &format!("Your claim was approved, {} accrued", next.computed_reward),
            )
            .await;
        Ok(next)
    }

    /// Reject a pending claim. Not a fraud mark: no warning is deducted.
    pub async fn reject(
        &self,
        claim_id: &ClaimId,
        resolver: &Identity,
        reason: &str,
    ) -> Result<Claim> {
        let claim = self.require_pending(claim_id).await?;

        let mut next = claim.clone();
        next.state = ClaimState::Rejected;
        next.resolved_at = Some(Utc::now());
        next.resolver_identity = Some(resolver.clone());
        self.store.update_claim(&next, claim.version).await?;
        next.version = claim.version + 1;

        info!(
            claim_id = %claim_id,
            identity = %next.identity.short(),
            reason,
            "Claim rejected"
        );
        self.notifier
            .notify(
                NotifyTarget::Citizen(next.identity.clone()),
                NotificationKind::ClaimRejected,
                "Claim rejected",
                reason,
            )
            .await;
        Ok(next)
    }

    /// Flag a pending claim as fraud. The accusation alone deducts no
    /// warning and levies no penalty; that waits for the appeal decision.
    pub async fn mark_fraud(
        &self,
        claim_id: &ClaimId,
        staff: &Identity,
        reason: &str,
    ) -> Result<Claim> {
        let claim = self.require_pending(claim_id).await?;

        let mut next = claim.clone();
        next.state = ClaimState::Fraud;
        next.resolved_at = Some(Utc::now());
        next.resolver_identity = Some(staff.clone());
        next.fraud_reason = Some(reason.to_string());
        self.store.update_claim(&next, claim.version).await?;
        next.version = claim.version + 1;

        warn!(
            claim_id = %claim_id,
            identity = %next.identity.short(),
            staff = %staff.short(),
            reason,
            "🚩 Claim marked as fraud"
        );
        self.notifier
            .notify(
                NotifyTarget::Citizen(next.identity.clone()),
                NotificationKind::FraudMarked,
                "Claim flagged",
                "Your claim was flagged for review; an appeal has been opened",
            )
            .await;
        self.notifier
            .notify(
                NotifyTarget::Admins,
                NotificationKind::FraudMarked,
                "Claim flagged as fraud",
                &format!(
                    "Claim {} from {} was flagged by {}: {}",
                    claim_id,
                    next.identity.short(),
                    staff.short(),
                    reason
                ),
            )
            .await;
        Ok(next)
    }

    /// Expire pending declarations whose token window has lapsed. Safe to
    /// run concurrently; a losing version check just means another sweep or
    /// a resolver got there first.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let pending = self.store.claims_by_state(ClaimState::Pending).await?;
        let mut expired = 0usize;
        for claim in pending {
            let lapsed = claim
                .token()
                .map(|t| !t.used && t.is_expired(now))
                .unwrap_or(false);
            if !lapsed {
                continue;
            }
            let mut next = claim.clone();
            next.state = ClaimState::Expired;
            next.resolved_at = Some(now);
            match self.store.update_claim(&next, claim.version).await {
                Ok(()) => {
                    expired += 1;
                    debug!(claim_id = %claim.id, "Declaration expired unredeemed");
                }
                Err(civic_storage::StorageError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if expired > 0 {
            info!(count = expired, "🧹 Expired declaration sweep");
        }
        Ok(expired)
    }

    pub async fn get(&self, claim_id: &ClaimId) -> Result<Claim> {
        self.store
            .get_claim(claim_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("claim {}", claim_id)))
    }

    /// Look up a pending declaration by its presented QR token.
    pub async fn claim_for_token(&self, token_id: &str) -> Result<Claim> {
        self.store
            .claim_by_token(token_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("token {}", token_id)))
    }

    pub async fn pending(&self) -> Result<Vec<Claim>> {
        self.store.claims_by_state(ClaimState::Pending).await.map_err(Into::into)
    }

    pub async fn for_identity(&self, identity: &Identity) -> Result<Vec<Claim>> {
        self.store.claims_by_identity(identity).await.map_err(Into::into)
    }

    async fn require_pending(&self, claim_id: &ClaimId) -> Result<Claim> {
        let claim = self
            .store
            .get_claim(claim_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("claim {}", claim_id)))?;
        if claim.state != ClaimState::Pending {
            return Err(CivicError::Conflict(format!(
                "claim {} is {}, not pending",
                claim_id,
                claim.state.as_str()
            )));
        }
        Ok(claim)
    }
}
