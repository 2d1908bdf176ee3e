use crate::amount::{Quantity, RewardAmount};
use crate::id::ClaimId;
use crate::identity::Identity;
use crate::material::{Domain, MaterialType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a claim.
///
/// `Approved`, `Rejected` and `Expired` are terminal. `Fraud` is terminal
/// only once its appeal is resolved against the citizen; an approved appeal
/// rewrites the claim to `Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimState {
    Pending,
    Approved,
    Rejected,
    Expired,
    Fraud,
}

impl ClaimState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimState::Pending => "pending",
            ClaimState::Approved => "approved",
            ClaimState::Rejected => "rejected",
            ClaimState::Expired => "expired",
            ClaimState::Fraud => "fraud",
        }
    }
}

/// Single-use token binding a declaration to a physical drop-off window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrToken {
    pub token_id: String,
    pub hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl QrToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Domain-specific contents of a claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClaimBody {
    /// Multi-material recycling declaration with its QR token.
    Declaration {
        quantities: BTreeMap<MaterialType, Quantity>,
        token: QrToken,
    },
    /// Water meter reading.
    Reading {
        meter_ref: String,
        reading_index: u64,
        /// Consumption delta against the previous reading.
        consumption: f64,
        /// The submitter explicitly acknowledged an unusual consumption drop.
        confirmed_drop: bool,
    },
}

/// A citizen-submitted reading or declaration awaiting adjudication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub identity: Identity,
    pub body: ClaimBody,
    pub computed_reward: RewardAmount,
    pub state: ClaimState,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolver_identity: Option<Identity>,
    pub fraud_reason: Option<String>,
    /// Optimistic concurrency stamp, bumped on every stored mutation.
    pub version: u64,
}

impl Claim {
    pub fn domain(&self) -> Domain {
        match self.body {
            ClaimBody::Declaration { .. } => Domain::Recycling,
            ClaimBody::Reading { .. } => Domain::Water,
        }
    }

    pub fn token(&self) -> Option<&QrToken> {
        match &self.body {
            ClaimBody::Declaration { token, .. } => Some(token),
            ClaimBody::Reading { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, ClaimState::Pending)
    }
}
