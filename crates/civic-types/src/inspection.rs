use crate::error::DependencyOutcome;
use crate::id::InspectionId;
use crate::identity::Identity;
use crate::material::Domain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InspectionStatus {
    Pending,
    Completed,
    FraudFound,
    Cancelled,
}

/// Scheduled or completed physical meter check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub id: InspectionId,
    pub identity: Identity,
    pub meter_ref: String,
    pub scheduled_at: DateTime<Utc>,
    /// Scheduling priority, 1 (routine) to 5 (expedited fraud follow-up).
    pub priority: u8,
    pub inspector_identity: Option<Identity>,
    pub status: InspectionStatus,
    /// Ground-truth reading taken on site.
    pub actual_value: Option<u64>,
    /// Last reading the citizen reported before the check.
    pub reported_value: u64,
    pub fraud_found: bool,
    pub notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Outcome of the post-commit penalty call when fraud was found.
    pub penalty: Option<DependencyOutcome>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl InspectionRecord {
    pub fn is_active(&self) -> bool {
        matches!(self.status, InspectionStatus::Pending)
    }
}

/// Audit entry for a confirmed fraud outcome, from either an appeal
/// rejection or a physical inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudRecord {
    pub identity: Identity,
    pub domain: Domain,
    pub detection_method: String,
    pub penalty_amount: f64,
    pub reported_value: Option<u64>,
    pub actual_value: Option<u64>,
    pub underpayment: f64,
    pub interest: f64,
    pub reference: Option<String>,
    pub detected_by: Identity,
    pub created_at: DateTime<Utc>,
}
