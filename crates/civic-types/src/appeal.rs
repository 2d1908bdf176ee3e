use crate::error::DependencyOutcome;
use crate::id::{AppealId, ClaimId};
use crate::identity::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a fraud appeal. Terminal once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
}

/// Second-phase human review of a staff fraud mark.
///
/// A line-staff accusation is not itself proof; only an admin-resolved
/// appeal may credit rewards, decrement warnings, or apply a penalty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appeal {
    pub id: AppealId,
    pub claim_id: ClaimId,
    pub identity: Identity,
    pub staff_identity: Identity,
    pub reason: String,
    pub status: AppealStatus,
    pub admin_identity: Option<Identity>,
    pub decision_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Outcome of the post-commit penalty call on a rejected appeal.
    pub penalty: Option<DependencyOutcome>,
    pub version: u64,
}

impl Appeal {
    pub fn is_resolved(&self) -> bool {
        !matches!(self.status, AppealStatus::Pending)
    }
}
