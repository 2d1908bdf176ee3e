use chrono::{DateTime, Utc};
use civic_sanctions::{PenaltyClient, WarningTracker};
use civic_storage::AdjudicationStore;
use civic_types::{
    CivicError, DependencyOutcome, Domain, FraudRecord, Identity, InspectionId, InspectionRecord,
    InspectionStatus, NotificationKind, NotificationSink, NotifyTarget, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct InspectionConfig {
    /// Routine re-inspection interval.
    pub regular_interval_days: i64,
    /// Expedited interval when open fraud signals exist.
    pub expedited_interval_days: i64,
    /// Tolerance band as a percentage of the reported value.
    pub tolerance_percent: f64,
    /// Price per under-reported meter unit.
    pub unit_price: f64,
    /// Interest per 30-day month on the underpayment.
    pub monthly_interest: f64,
    pub penalty_timeout: Duration,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            regular_interval_days: 180,
            expedited_interval_days: 30,
            tolerance_percent: 5.0,
            unit_price: 10.0,
            monthly_interest: 0.05,
            penalty_timeout: Duration::from_secs(15),
        }
    }
}

/// Schedules and settles physical meter checks.
///
/// A difference within the tolerance band can never become a fraud finding,
/// whatever the inspector submitted: rounding and meter drift must not
/// produce penalties.
pub struct InspectionReconciler {
    store: Arc<dyn AdjudicationStore>,
    warnings: Arc<WarningTracker>,
    penalty: Arc<dyn PenaltyClient>,
    notifier: Arc<dyn NotificationSink>,
    config: InspectionConfig,
}

impl InspectionReconciler {
    pub fn new(
        store: Arc<dyn AdjudicationStore>,
        warnings: Arc<WarningTracker>,
        penalty: Arc<dyn PenaltyClient>,
        notifier: Arc<dyn NotificationSink>,
        config: InspectionConfig,
    ) -> Self {
        Self {
            store,
            warnings,
            penalty,
            notifier,
            config,
        }
    }

    /// Schedule an inspection. At most one may be pending per identity.
    pub async fn schedule(
        &self,
        identity: &Identity,
        meter_ref: &str,
        reported_value: u64,
        inspector: Option<Identity>,
        has_open_signal: bool,
    ) -> Result<InspectionRecord> {
        if let Some(pending) = self.store.pending_inspection_for(identity).await? {
            return Err(CivicError::Conflict(format!(
                "inspection {} is already pending for {}",
                pending.id,
                identity.short()
            )));
        }
        if let Some(inspector) = &inspector {
            self.require_inspector(inspector).await?;
        }

        let now = Utc::now();
        let last = self.store.last_completed_inspection(identity).await?;
        let priority = self.priority(last.as_ref(), has_open_signal, now);

        let record = InspectionRecord {
            id: InspectionId::new(
                format!("{}:{}:{}", identity, meter_ref, now.timestamp_micros()).as_bytes(),
            ),
            identity: identity.clone(),
            meter_ref: meter_ref.to_string(),
            scheduled_at: now,
            priority,
            inspector_identity: inspector,
            status: InspectionStatus::Pending,
            actual_value: None,
            reported_value,
            fraud_found: false,
            notes: None,
            completed_at: None,
            penalty: None,
            created_at: now,
            version: 0,
        };
        self.store.put_inspection(&record).await?;

        info!(
            inspection_id = %record.id,
            identity = %identity.short(),
            priority,
            "🔍 Inspection scheduled"
        );
        self.notifier
            .notify(
                NotifyTarget::Citizen(identity.clone()),
                NotificationKind::InspectionScheduled,
                "Inspection scheduled",
                &format!("A physical check of meter {} has been scheduled", meter_ref),
            )
            .await;
        Ok(record)
    }

    /// Priority 1 (routine) to 5 (overdue fraud follow-up).
    fn priority(
        &self,
        last: Option<&InspectionRecord>,
        has_open_signal: bool,
        now: DateTime<Utc>,
    ) -> u8 {
        let Some(last) = last else {
            return 4;
        };
        let completed = last.completed_at.unwrap_or(last.scheduled_at);
        let days_since = (now - completed).num_days();

        if has_open_signal {
            if days_since > self.config.expedited_interval_days {
                return 5;
            }
            return 4;
        }

        let overdue = days_since - self.config.regular_interval_days;
        if overdue > 60 {
            4
        } else if overdue > 30 {
            3
        } else if overdue > 0 {
            2
        } else {
            1
        }
    }

    /// Complete a pending inspection, reconciling the inspector's reading
    /// against the last reported value.
    pub async fn complete(
        &self,
        inspection_id: &InspectionId,
        inspector: &Identity,
        actual_value: u64,
        fraud_found: bool,
        notes: Option<&str>,
    ) -> Result<InspectionRecord> {
        self.require_inspector(inspector).await?;

        let record = self
            .store
            .get_inspection(inspection_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("inspection {}", inspection_id)))?;
        if record.status != InspectionStatus::Pending {
            return Err(CivicError::Conflict(format!(
                "inspection {} is not pending",
                inspection_id
            )));
        }

        let difference = actual_value as i64 - record.reported_value as i64;
        let tolerance = record.reported_value as f64 * self.config.tolerance_percent / 100.0;
        let within_band = (difference.unsigned_abs() as f64) <= tolerance;

        let now = Utc::now();
        let mut next = record.clone();
        next.inspector_identity = Some(inspector.clone());
        next.actual_value = Some(actual_value);
        next.notes = notes.map(str::to_string);
        next.completed_at = Some(now);

        if within_band || !fraud_found || difference <= 0 {
            // Tolerance overrides the inspector's flag.
            next.status = InspectionStatus::Completed;
            next.fraud_found = false;
            self.store.update_inspection(&next, record.version).await?;
            next.version = record.version + 1;
            info!(
                inspection_id = %inspection_id,
                identity = %next.identity.short(),
                difference,
                "Inspection completed clean"
            );
            return Ok(next);
        }

        // Under-reported outside the band with the inspector confirming.
        let underpayment = difference as f64 * self.config.unit_price;
        let months_late = ((now - record.scheduled_at).num_days() / 30).max(1);
        let interest = underpayment * self.config.monthly_interest * months_late as f64;
        let total = underpayment + interest;

        next.status = InspectionStatus::FraudFound;
        next.fraud_found = true;
        self.store.update_inspection(&next, record.version).await?;
        next.version = record.version + 1;

        let deduction = self.warnings.deduct(&next.identity, Domain::Water).await?;
        if deduction.blacklisted_now {
            if let Err(e) = self.penalty.blacklist(&next.identity, Domain::Water).await {
                warn!(
                    identity = %next.identity.short(),
                    error = %e,
                    "On-chain blacklist mirror failed"
                );
            }
        }

        let outcome = self.call_penalty(&next.identity, total).await;

        self.store
            .append_fraud_record(&FraudRecord {
                identity: next.identity.clone(),
                domain: Domain::Water,
                detection_method: "inspection".to_string(),
                penalty_amount: total,
                reported_value: Some(record.reported_value),
                actual_value: Some(actual_value),
                underpayment,
                interest,
                reference: match &outcome {
                    DependencyOutcome::Confirmed { reference } => Some(reference.clone()),
                    DependencyOutcome::Failed { .. } => None,
                },
                detected_by: inspector.clone(),
                created_at: now,
            })
            .await?;

        next.penalty = Some(outcome);
        self.store.update_inspection(&next, next.version).await?;
        next.version += 1;

        self.notifier
            .notify(
                NotifyTarget::Citizen(next.identity.clone()),
                NotificationKind::ConsumptionWarning,
                "Meter under-reporting found",
                &format!(
                    "Inspection of meter {} found under-reporting; a penalty of {:.2} applies and {} warning(s) remain",
                    next.meter_ref,
                    total,
                    deduction.record.remaining(Domain::Water)
                ),
            )
            .await;

        warn!(
            inspection_id = %inspection_id,
            identity = %next.identity.short(),
            difference,
            underpayment,
            interest,
            months_late,
            "🚨 Inspection found under-reporting"
        );
        Ok(next)
    }

    /// Cancel a pending inspection, reopening the identity's pending slot.
    /// A cancelled check never counts toward the inspection interval.
    pub async fn cancel(
        &self,
        inspection_id: &InspectionId,
        by: &Identity,
        reason: Option<&str>,
    ) -> Result<InspectionRecord> {
        let record = self
            .store
            .get_inspection(inspection_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("inspection {}", inspection_id)))?;
        if record.status != InspectionStatus::Pending {
            return Err(CivicError::Conflict(format!(
                "inspection {} is not pending",
                inspection_id
            )));
        }

        let mut next = record.clone();
        next.status = InspectionStatus::Cancelled;
        next.notes = reason.map(str::to_string);
        self.store.update_inspection(&next, record.version).await?;
        next.version = record.version + 1;

        info!(
            inspection_id = %inspection_id,
            identity = %next.identity.short(),
            by = %by.short(),
            "Inspection cancelled"
        );
        Ok(next)
    }

    async fn call_penalty(&self, identity: &Identity, amount: f64) -> DependencyOutcome {
        let call = self
            .penalty
            .apply_penalty(identity, Domain::Water, amount, "meter under-reporting");
        match tokio::time::timeout(self.config.penalty_timeout, call).await {
            Ok(Ok(reference)) => DependencyOutcome::Confirmed { reference },
            Ok(Err(e)) => {
                warn!(identity = %identity.short(), error = %e, "Penalty call failed");
                DependencyOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(_) => DependencyOutcome::Failed {
                error: "penalty call timed out".to_string(),
            },
        }
    }

    /// Whether `identity` is past its inspection interval, and at what
    /// priority. `None` means not due.
    pub async fn due_for(
        &self,
        identity: &Identity,
        has_open_signal: bool,
    ) -> Result<Option<u8>> {
        if self.store.pending_inspection_for(identity).await?.is_some() {
            return Ok(None);
        }
        let now = Utc::now();
        let last = self.store.last_completed_inspection(identity).await?;
        let interval = if has_open_signal {
            self.config.expedited_interval_days
        } else {
            self.config.regular_interval_days
        };
        let due = match &last {
            None => true,
            Some(last) => {
                let completed = last.completed_at.unwrap_or(last.scheduled_at);
                (now - completed).num_days() > interval
            }
        };
        if due {
            Ok(Some(self.priority(last.as_ref(), has_open_signal, now)))
        } else {
            Ok(None)
        }
    }

    /// Re-entrant due scan over candidate identities.
    pub async fn due_scan(
        &self,
        candidates: &[(Identity, bool)],
    ) -> Result<Vec<(Identity, u8)>> {
        let mut due = Vec::new();
        for (identity, has_open_signal) in candidates {
            if let Some(priority) = self.due_for(identity, *has_open_signal).await? {
                due.push((identity.clone(), priority));
            }
        }
        due.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(due)
    }

    pub async fn get(&self, inspection_id: &InspectionId) -> Result<InspectionRecord> {
        self.store
            .get_inspection(inspection_id)
            .await?
            .ok_or_else(|| CivicError::NotFound(format!("inspection {}", inspection_id)))
    }

    pub async fn pending(&self) -> Result<Vec<InspectionRecord>> {
        self.store
            .inspections_by_status(InspectionStatus::Pending)
            .await
            .map_err(Into::into)
    }

    pub async fn authorize_inspector(&self, identity: &Identity) -> Result<()> {
        self.store.add_inspector(identity).await?;
        info!(inspector = %identity.short(), "Inspector authorized");
        Ok(())
    }

    pub async fn revoke_inspector(&self, identity: &Identity) -> Result<bool> {
        let removed = self.store.remove_inspector(identity).await?;
        if removed {
            info!(inspector = %identity.short(), "Inspector revoked");
        }
        Ok(removed)
    }

    async fn require_inspector(&self, identity: &Identity) -> Result<()> {
        if !self.store.is_inspector(identity).await? {
            return Err(CivicError::Validation(format!(
                "{} is not an authorized inspector",
                identity.short()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use civic_storage::MemoryBackend;
    use civic_types::ErrorKind;
    use std::sync::Mutex;

    struct RecordingPenalty {
        calls: Mutex<Vec<f64>>,
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
            Ok("pen-1".to_string())
        }

        async fn blacklist(&self, _identity: &Identity, _domain: Domain) -> anyhow::Result<String> {
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
        reconciler: InspectionReconciler,
        store: Arc<MemoryBackend>,
        warnings: Arc<WarningTracker>,
        penalty: Arc<RecordingPenalty>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryBackend::new());
        let warnings = Arc::new(WarningTracker::new(store.clone()));
        let penalty = Arc::new(RecordingPenalty {
            calls: Mutex::new(Vec::new()),
        });
        let reconciler = InspectionReconciler::new(
            store.clone(),
            warnings.clone(),
            penalty.clone(),
            Arc::new(SilentSink),
            InspectionConfig::default(),
        );
        Fixture {
            reconciler,
            store,
            warnings,
            penalty,
        }
    }

    fn citizen() -> Identity {
        Identity::parse("0x8888888888888888888888888888888888888888").unwrap()
    }

    fn inspector() -> Identity {
        Identity::parse("0x9999999999999999999999999999999999999999").unwrap()
    }

    async fn authorized_fixture() -> Fixture {
        let f = fixture();
        f.reconciler.authorize_inspector(&inspector()).await.unwrap();
        f
    }

    #[tokio::test]
    async fn only_one_pending_per_identity() {
        let f = authorized_fixture().await;
        f.reconciler
            .schedule(&citizen(), "WM-1", 2114, None, false)
            .await
            .unwrap();
        let err = f
            .reconciler
            .schedule(&citizen(), "WM-1", 2114, None, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn never_inspected_gets_priority_four() {
        let f = authorized_fixture().await;
        let record = f
            .reconciler
            .schedule(&citizen(), "WM-1", 2114, None, false)
            .await
            .unwrap();
        assert_eq!(record.priority, 4);
    }

    #[tokio::test]
    async fn unauthorized_inspector_cannot_complete() {
        let f = authorized_fixture().await;
        let record = f
            .reconciler
            .schedule(&citizen(), "WM-1", 2114, None, false)
            .await
            .unwrap();
        let outsider = Identity::parse("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let err = f
            .reconciler
            .complete(&record.id, &outsider, 2114, false, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn within_tolerance_overrides_fraud_flag() {
        let f = authorized_fixture().await;
        let record = f
            .reconciler
            .schedule(&citizen(), "WM-1", 2114, None, false)
            .await
            .unwrap();
        // 2% over, inside the 5% band, inspector flag ignored.
        let done = f
            .reconciler
            .complete(&record.id, &inspector(), 2156, true, None)
            .await
            .unwrap();
        assert_eq!(done.status, InspectionStatus::Completed);
        assert!(!done.fraud_found);
        assert!(f.penalty.calls.lock().unwrap().is_empty());
        assert_eq!(
            f.warnings
                .status(&citizen())
                .await
                .unwrap()
                .remaining(Domain::Water),
            2
        );
    }

    #[tokio::test]
    async fn worked_fraud_example() {
        // reported 2114, actual 3120: difference 1006, far past 5%.
        let f = authorized_fixture().await;
        let record = f
            .reconciler
            .schedule(&citizen(), "WM-1", 2114, None, false)
            .await
            .unwrap();
        let done = f
            .reconciler
            .complete(&record.id, &inspector(), 3120, true, Some("seal broken"))
            .await
            .unwrap();
        assert_eq!(done.status, InspectionStatus::FraudFound);
        assert!(done.fraud_found);
        assert!(matches!(
            done.penalty,
            Some(DependencyOutcome::Confirmed { .. })
        ));

        // underpayment 1006 * 10, one month of 5% interest.
        let expected = 10060.0 + 10060.0 * 0.05;
        assert_eq!(*f.penalty.calls.lock().unwrap(), vec![expected]);

        let warnings = f.warnings.status(&citizen()).await.unwrap();
        assert_eq!(warnings.remaining(Domain::Water), 1);

        let frauds = f.store.fraud_records(&citizen()).await.unwrap();
        assert_eq!(frauds.len(), 1);
        assert_eq!(frauds[0].underpayment, 10060.0);
        assert_eq!(frauds[0].detection_method, "inspection");
    }

    #[tokio::test]
    async fn over_reporting_is_not_fraud() {
        let f = authorized_fixture().await;
        let record = f
            .reconciler
            .schedule(&citizen(), "WM-1", 2114, None, false)
            .await
            .unwrap();
        // Actual below reported: citizen over-paid, never penalized.
        let done = f
            .reconciler
            .complete(&record.id, &inspector(), 1800, true, None)
            .await
            .unwrap();
        assert_eq!(done.status, InspectionStatus::Completed);
        assert!(!done.fraud_found);
    }

    #[tokio::test]
    async fn completing_twice_is_a_conflict() {
        let f = authorized_fixture().await;
        let record = f
            .reconciler
            .schedule(&citizen(), "WM-1", 2114, None, false)
            .await
            .unwrap();
        f.reconciler
            .complete(&record.id, &inspector(), 2114, false, None)
            .await
            .unwrap();
        let err = f
            .reconciler
            .complete(&record.id, &inspector(), 3120, true, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn due_scan_covers_fresh_identities() {
        let f = authorized_fixture().await;
        let never_seen = citizen();
        let covered = inspector();

        let due = f
            .reconciler
            .due_scan(&[(never_seen.clone(), false), (covered.clone(), false)])
            .await
            .unwrap();
        assert!(due.iter().any(|(id, p)| *id == never_seen && *p == 4));

        // Scheduling takes the identity out of the due set; running the
        // scan again changes nothing.
        f.reconciler
            .schedule(&never_seen, "WM-1", 2114, None, false)
            .await
            .unwrap();
        let due = f
            .reconciler
            .due_scan(&[(never_seen.clone(), false)])
            .await
            .unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn cancelling_reopens_the_pending_slot() {
        let f = authorized_fixture().await;
        let record = f
            .reconciler
            .schedule(&citizen(), "WM-1", 2114, None, false)
            .await
            .unwrap();
        let cancelled = f
            .reconciler
            .cancel(&record.id, &inspector(), Some("citizen moved out"))
            .await
            .unwrap();
        assert_eq!(cancelled.status, InspectionStatus::Cancelled);
        assert_eq!(cancelled.notes.as_deref(), Some("citizen moved out"));

        // The slot reopens and the history still reads never-inspected.
        let again = f
            .reconciler
            .schedule(&citizen(), "WM-1", 2114, None, false)
            .await
            .unwrap();
        assert_eq!(again.priority, 4);

        // A closed inspection can be neither cancelled nor completed.
        let err = f
            .reconciler
            .cancel(&record.id, &inspector(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = f
            .reconciler
            .complete(&record.id, &inspector(), 2114, false, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn zero_reported_value_has_no_band() {
        let f = authorized_fixture().await;
        let record = f
            .reconciler
            .schedule(&citizen(), "WM-1", 0, None, false)
            .await
            .unwrap();
        let done = f
            .reconciler
            .complete(&record.id, &inspector(), 5, true, None)
            .await
            .unwrap();
        assert_eq!(done.status, InspectionStatus::FraudFound);
    }
}
