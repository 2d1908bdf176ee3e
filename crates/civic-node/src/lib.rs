pub mod clients;
pub mod config;
pub mod logging;
pub mod service;

pub use clients::{LoggingPenalty, LoggingSettlement, LoggingSink, StoreHistory};
pub use config::NodeConfig;
pub use service::{AdjudicationService, FraudStatus};
