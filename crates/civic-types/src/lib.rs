pub mod amount;
pub mod appeal;
pub mod claim;
pub mod error;
pub mod id;
pub mod identity;
pub mod inspection;
pub mod material;
pub mod notify;
pub mod warnings;

pub use amount::{Quantity, RewardAmount};
pub use appeal::{Appeal, AppealStatus};
pub use claim::{Claim, ClaimBody, ClaimState, QrToken};
pub use error::{CivicError, DependencyOutcome, ErrorKind, Result};
pub use id::{AppealId, ClaimId, InspectionId};
pub use identity::Identity;
pub use inspection::{FraudRecord, InspectionRecord, InspectionStatus};
pub use material::{Domain, MaterialType, RewardRates};
pub use notify::{NotificationKind, NotificationSink, NotifyTarget};
pub use warnings::{WarningRecord, WARNING_CAP};
