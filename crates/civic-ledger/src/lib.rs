//! Reward ledger: accrues adjudicated rewards per identity and settles the
//! accumulated balance through an external transfer client in one shot.

pub mod ledger;
pub mod settlement;

pub use ledger::{LedgerConfig, RewardLedger, SettlementReceipt};
pub use settlement::SettlementClient;
