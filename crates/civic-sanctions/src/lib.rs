//! Warning counters, blacklisting and external penalty dispatch.

pub mod penalty;
pub mod tracker;

pub use penalty::PenaltyClient;
pub use tracker::{Deduction, WarningTracker};
