//! Claim lifecycle: recycling declarations with QR tokens, water readings
//! guarded by the consumption check, and the pending-state transitions.

pub mod manager;
pub mod token;

pub use manager::{ClaimManager, ClaimManagerConfig, ReadingOutcome, ReadingRequest};
pub use token::issue_token;
