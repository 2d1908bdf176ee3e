pub mod engine;
pub mod guard;
pub mod history;
pub mod stats;

pub use engine::{
    CaptureMetadata, ScoredSignal, SignalConfig, SignalDetails, SignalEngine, SignalFlag,
    SignalLevel, SignalReport,
};
pub use guard::{ConsumptionGuard, GuardConfig, GuardOutcome};
pub use history::HistoryProvider;
