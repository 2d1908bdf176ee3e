use civic_storage::AdjudicationStore;
use civic_types::{CivicError, Domain, Identity, Result, WarningRecord, WARNING_CAP};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Result of a warning deduction.
#[derive(Debug, Clone)]
pub struct Deduction {
    pub record: WarningRecord,
    /// True when this deduction exhausted the counter and blacklisted the
    /// domain.
    pub blacklisted_now: bool,
}

/// Per-identity warning counters with automatic blacklisting.
///
/// Identities start with [`WARNING_CAP`] warnings per domain. A confirmed
/// fraud deducts one; reaching zero blacklists the domain. An overturned
/// decision restores one warning and lifts the blacklist.
///
/// Counter updates are read-modify-write over the store, serialized through
/// an internal mutex so two concurrent deductions cannot both observe the
/// same starting value.
pub struct WarningTracker {
    store: Arc<dyn AdjudicationStore>,
    write_lock: Mutex<()>,
}

impl WarningTracker {
    pub fn new(store: Arc<dyn AdjudicationStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Current record, defaulting to a fresh full-cap record for unseen
    /// identities.
    pub async fn status(&self, identity: &Identity) -> Result<WarningRecord> {
        Ok(self
            .store
            .get_warnings(identity)
            .await?
            .unwrap_or_else(|| WarningRecord::new(identity.clone())))
    }

    pub async fn is_blacklisted(&self, identity: &Identity, domain: Domain) -> Result<bool> {
        Ok(self.status(identity).await?.is_blacklisted(domain))
    }

    /// Fail with `Blacklisted` when the identity may not act in `domain`.
    pub async fn ensure_allowed(&self, identity: &Identity, domain: Domain) -> Result<()> {
        if self.is_blacklisted(identity, domain).await? {
            return Err(CivicError::Blacklisted { domain });
        }
        Ok(())
    }

    /// Deduct one warning for a confirmed fraud.
    pub async fn deduct(&self, identity: &Identity, domain: Domain) -> Result<Deduction> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.status(identity).await?;
        let remaining = record.remaining(domain).saturating_sub(1);
        let blacklisted = remaining == 0;
        let blacklisted_now = blacklisted && !record.is_blacklisted(domain);
        record.set(domain, remaining, blacklisted);
        self.store.put_warnings(&record).await?;

        if blacklisted_now {
            warn!(
                identity = %identity.short(),
                domain = %domain,
                "🚫 Warnings exhausted, identity blacklisted"
            );
        } else {
            info!(
                identity = %identity.short(),
                domain = %domain,
                remaining,
                "⚠️ Warning deducted"
            );
        }
        Ok(Deduction {
            record,
            blacklisted_now,
        })
    }

    /// Restore one warning after an overturned decision. Lifts the
    /// blacklist since the counter leaves zero.
    pub async fn restore(&self, identity: &Identity, domain: Domain) -> Result<WarningRecord> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.status(identity).await?;
        let remaining = record.remaining(domain).saturating_add(1).min(WARNING_CAP);
        record.set(domain, remaining, false);
        self.store.put_warnings(&record).await?;
        info!(
            identity = %identity.short(),
            domain = %domain,
            remaining,
            "Warning restored"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_storage::MemoryBackend;
    use civic_types::ErrorKind;

    fn tracker() -> WarningTracker {
        WarningTracker::new(Arc::new(MemoryBackend::new()))
    }

    fn identity() -> Identity {
        Identity::parse("0x2222222222222222222222222222222222222222").unwrap()
    }

    #[tokio::test]
    async fn two_deductions_blacklist() {
        let tracker = tracker();
        let who = identity();

        let first = tracker.deduct(&who, Domain::Water).await.unwrap();
        assert_eq!(first.record.remaining(Domain::Water), 1);
        assert!(!first.blacklisted_now);

        let second = tracker.deduct(&who, Domain::Water).await.unwrap();
        assert_eq!(second.record.remaining(Domain::Water), 0);
        assert!(second.blacklisted_now);

        let err = tracker.ensure_allowed(&who, Domain::Water).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        // The other domain is untouched.
        tracker.ensure_allowed(&who, Domain::Recycling).await.unwrap();
    }

    #[tokio::test]
    async fn restore_lifts_blacklist() {
        let tracker = tracker();
        let who = identity();
        tracker.deduct(&who, Domain::Recycling).await.unwrap();
        tracker.deduct(&who, Domain::Recycling).await.unwrap();
        assert!(tracker
            .is_blacklisted(&who, Domain::Recycling)
            .await
            .unwrap());

        let record = tracker.restore(&who, Domain::Recycling).await.unwrap();
        assert_eq!(record.remaining(Domain::Recycling), 1);
        assert!(!record.is_blacklisted(Domain::Recycling));
    }

    #[tokio::test]
    async fn restore_caps_at_initial_allowance() {
        let tracker = tracker();
        let who = identity();
        let record = tracker.restore(&who, Domain::Water).await.unwrap();
        assert_eq!(record.remaining(Domain::Water), WARNING_CAP);
    }

    #[tokio::test]
    async fn repeated_deduction_at_zero_stays_blacklisted() {
        let tracker = tracker();
        let who = identity();
        tracker.deduct(&who, Domain::Water).await.unwrap();
        tracker.deduct(&who, Domain::Water).await.unwrap();
        let third = tracker.deduct(&who, Domain::Water).await.unwrap();
        assert_eq!(third.record.remaining(Domain::Water), 0);
        assert!(!third.blacklisted_now);
    }
}
