use crate::identity::Identity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    ClaimApproved,
    ClaimRejected,
    FraudMarked,
    FraudReviewRequired,
    AppealResolved,
    InspectionScheduled,
    RewardClaimed,
    ConsumptionWarning,
}

/// Delivery target for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyTarget {
    Citizen(Identity),
    /// Broadcast to all admin accounts.
    Admins,
}

/// Fire-and-forget notification delivery. Implementations absorb and log
/// their own failures; callers never block or fail on delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, target: NotifyTarget, kind: NotificationKind, title: &str, message: &str);
}
