use crate::id::ClaimId;
use crate::material::Domain;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error taxonomy surfaced by every adjudication operation.
///
/// `Validation` and `Conflict` are rejected synchronously with no mutation;
/// `Dependency` failures never roll back an already-committed local decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Dependency,
}

#[derive(Error, Debug)]
pub enum CivicError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Quantity over cap for {material}: max {max}")]
    QuantityOverCap { material: String, max: String },

    #[error("Identity is blacklisted in the {domain} domain")]
    Blacklisted { domain: Domain },

    #[error("State conflict: {0}")]
    Conflict(String),

    #[error("Concurrent update detected, entity version is stale")]
    StaleVersion,

    #[error("A pending appeal already exists for claim {0}")]
    DuplicateAppeal(ClaimId),

    #[error("Claim {0} was already credited")]
    AlreadyCredited(ClaimId),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External dependency failed: {0}")]
    Dependency(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CivicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CivicError::InvalidAddress(_)
            | CivicError::Validation(_)
            | CivicError::QuantityOverCap { .. }
            | CivicError::Blacklisted { .. } => ErrorKind::Validation,
            CivicError::Conflict(_)
            | CivicError::StaleVersion
            | CivicError::DuplicateAppeal(_)
            | CivicError::AlreadyCredited(_) => ErrorKind::Conflict,
            CivicError::NotFound(_) => ErrorKind::NotFound,
            CivicError::Dependency(_)
            | CivicError::Storage(_)
            | CivicError::Serialization(_) => ErrorKind::Dependency,
        }
    }
}

pub type Result<T> = std::result::Result<T, CivicError>;

/// Recorded outcome of a post-commit external capability call.
///
/// The local state transition is the source of truth; the external effect is
/// at-least-once and reconciled later from this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyOutcome {
    /// Call succeeded, reference returned by the external system.
    Confirmed { reference: String },
    /// Call failed after retries; eligible for reconciliation.
    Failed { error: String },
}

impl DependencyOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, DependencyOutcome::Confirmed { .. })
    }
}
