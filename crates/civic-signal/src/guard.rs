use crate::stats;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// How many recent consumption deltas to average.
    pub max_history: usize,
    /// Drop percentage at which explicit confirmation is required.
    pub drop_threshold_percent: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_history: 6,
            drop_threshold_percent: 50.0,
        }
    }
}

/// Outcome of the pre-acceptance consumption check.
///
/// `NeedsConfirmation` is a soft rejection, not a failure: the caller
/// re-submits with the confirmation flag to proceed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GuardOutcome {
    Allow {
        /// The submitter explicitly acknowledged an unusual drop.
        acknowledged_drop: bool,
    },
    NeedsConfirmation {
        current: f64,
        average: f64,
        drop_percent: f64,
    },
}

/// Blocks unusually low readings until the submitter confirms them, so a
/// typo or a gamed photo cannot slip into the pending queue unnoticed.
#[derive(Debug, Clone, Default)]
pub struct ConsumptionGuard {
    config: GuardConfig,
}

impl ConsumptionGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Evaluate a new consumption value against recent history
    /// (chronological, oldest first). Fewer than two usable deltas means
    /// there is no baseline and the value is allowed unconditionally.
    pub fn evaluate(&self, current: f64, history: &[f64], confirmed: bool) -> GuardOutcome {
        let recent: Vec<f64> = history
            .iter()
            .rev()
            .take(self.config.max_history)
            .copied()
            .filter(|v| *v > 0.0)
            .collect();

        if recent.len() < 2 {
            return GuardOutcome::Allow {
                acknowledged_drop: false,
            };
        }

        let average = match stats::mean(&recent) {
            Some(avg) if avg > 0.0 => avg,
            _ => {
                return GuardOutcome::Allow {
                    acknowledged_drop: false,
                }
            }
        };

        let drop_percent = (average - current) / average * 100.0;
        if drop_percent >= self.config.drop_threshold_percent {
            if confirmed {
                debug!(current, average, drop_percent, "Drop acknowledged by submitter");
                return GuardOutcome::Allow {
                    acknowledged_drop: true,
                };
            }
            return GuardOutcome::NeedsConfirmation {
                current,
                average,
                drop_percent,
            };
        }

        GuardOutcome::Allow {
            acknowledged_drop: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_baseline_allows() {
        let guard = ConsumptionGuard::default();
        assert_eq!(
            guard.evaluate(1.0, &[], false),
            GuardOutcome::Allow {
                acknowledged_drop: false
            }
        );
        assert_eq!(
            guard.evaluate(1.0, &[80.0], false),
            GuardOutcome::Allow {
                acknowledged_drop: false
            }
        );
    }

    #[test]
    fn test_big_drop_needs_confirmation() {
        let guard = ConsumptionGuard::default();
        let outcome = guard.evaluate(10.0, &[100.0, 90.0, 110.0], false);
        match outcome {
            GuardOutcome::NeedsConfirmation {
                current,
                average,
                drop_percent,
            } => {
                assert_eq!(current, 10.0);
                assert_eq!(average, 100.0);
                assert!((drop_percent - 90.0).abs() < 1e-9);
            }
            GuardOutcome::Allow { .. } => panic!("90% drop must be soft-rejected"),
        }
    }

    #[test]
    fn test_confirmed_drop_is_tagged() {
        let guard = ConsumptionGuard::default();
        assert_eq!(
            guard.evaluate(10.0, &[100.0, 90.0, 110.0], true),
            GuardOutcome::Allow {
                acknowledged_drop: true
            }
        );
    }

    #[test]
    fn test_normal_consumption_passes() {
        let guard = ConsumptionGuard::default();
        assert_eq!(
            guard.evaluate(95.0, &[100.0, 90.0, 110.0], false),
            GuardOutcome::Allow {
                acknowledged_drop: false
            }
        );
    }

    #[test]
    fn test_only_recent_history_counts() {
        let guard = ConsumptionGuard::default();
        // Ancient high values beyond the window must not drag the average up.
        let history = [1000.0, 1000.0, 10.0, 11.0, 9.0, 10.0, 10.0, 10.0];
        assert_eq!(
            guard.evaluate(9.0, &history, false),
            GuardOutcome::Allow {
                acknowledged_drop: false
            }
        );
    }

    #[test]
    fn test_zero_entries_ignored() {
        let guard = ConsumptionGuard::default();
        let outcome = guard.evaluate(10.0, &[0.0, 100.0, 0.0, 100.0], false);
        assert!(matches!(outcome, GuardOutcome::NeedsConfirmation { .. }));
    }
}
