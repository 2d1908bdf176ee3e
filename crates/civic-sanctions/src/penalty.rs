use async_trait::async_trait;
use civic_types::{Domain, Identity};

/// External capability that levies a monetary penalty on an identity.
///
/// Called after the local sanction has committed; the outcome is recorded on
/// the triggering entity and never rolls the local decision back.
#[async_trait]
pub trait PenaltyClient: Send + Sync {
    /// Levy `amount` against `identity`, returning the external reference.
    async fn apply_penalty(
        &self,
        identity: &Identity,
        domain: Domain,
        amount: f64,
        reason: &str,
    ) -> anyhow::Result<String>;

    /// Mirror a local blacklist onto the external ledger.
    async fn blacklist(&self, identity: &Identity, domain: Domain) -> anyhow::Result<String>;
}
