use crate::stats;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Capture metadata extracted from a submitted photo.
///
/// Absent metadata means "unknown, low trust": the engine still runs but
/// applies no metadata penalties, it never rejects on a missing extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub capture_age_seconds: u64,
    pub has_location: bool,
    pub was_edited: bool,
    /// Extractor confidence in 0..1.
    pub confidence: f64,
}

/// Advisory signal level. Never itself authorizes a penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Individual anomaly contribution to the combined score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalFlag {
    /// Consumption fell below the drop threshold against the history mean.
    ConsumptionDrop { change_percent: f64 },
    /// Consumption rose above the spike threshold.
    ConsumptionSpike { change_percent: f64 },
    /// |z| above the dispersion threshold.
    Dispersion { z_score: f64 },
    /// Persistent negative trend that the current value continues.
    DecliningTrend { slope: f64 },
    /// Photo older than the allowed capture window.
    StaleCapture { age_seconds: u64 },
    MissingLocation,
    EditingDetected,
    /// Meter index below the previous reading, which is physically impossible.
    IndexDecreased { previous: u64, current: u64 },
    /// Consumption more than five times the previous period.
    ExcessiveConsumption { current: f64, previous: f64 },
}

/// Thresholds and point weights for the combined score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Percent change at or below which a drop is flagged (negative).
    pub drop_threshold_percent: f64,
    /// Percent change at or above which a spike is flagged.
    pub spike_threshold_percent: f64,
    pub z_threshold: f64,
    /// OLS slope below which a declining trend is flagged.
    pub slope_threshold: f64,
    /// Minimum history length for a scored report.
    pub min_history: usize,
    pub max_capture_age_seconds: u64,
    pub drop_weight: u8,
    pub spike_weight: u8,
    pub dispersion_weight: u8,
    pub trend_weight: u8,
    pub stale_capture_weight: u8,
    pub missing_location_weight: u8,
    pub edited_weight: u8,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            drop_threshold_percent: -50.0,
            spike_threshold_percent: 200.0,
            z_threshold: 2.5,
            slope_threshold: -2.0,
            min_history: 3,
            max_capture_age_seconds: 300,
            drop_weight: 40,
            spike_weight: 20,
            dispersion_weight: 25,
            trend_weight: 15,
            stale_capture_weight: 10,
            missing_location_weight: 5,
            edited_weight: 20,
        }
    }
}

/// Statistical inputs behind a scored report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDetails {
    pub current: f64,
    pub mean: f64,
    pub stdev: Option<f64>,
    pub change_percent: f64,
    pub slope: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSignal {
    /// Combined score, clamped to 0..=100.
    pub score: u8,
    pub level: SignalLevel,
    pub flags: Vec<SignalFlag>,
    pub details: SignalDetails,
}

/// Engine output. `InsufficientHistory` carries score 0 and no flags but is
/// distinguishable from a clean result — callers must not treat it as such.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignalReport {
    InsufficientHistory { observations: usize },
    Scored(ScoredSignal),
}

impl SignalReport {
    pub fn score(&self) -> u8 {
        match self {
            SignalReport::InsufficientHistory { .. } => 0,
            SignalReport::Scored(s) => s.score,
        }
    }
}

/// Pure anomaly scorer over a consumption series and capture metadata.
///
/// The output is a recommendation consumed by staff or by the consumption
/// guard; nothing here mutates state or invokes a capability.
#[derive(Debug, Clone, Default)]
pub struct SignalEngine {
    config: SignalConfig,
}

impl SignalEngine {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Score a current value against its chronological history (oldest first).
    pub fn score(
        &self,
        current: f64,
        history: &[f64],
        metadata: Option<&CaptureMetadata>,
    ) -> SignalReport {
        if history.len() < self.config.min_history {
            return SignalReport::InsufficientHistory {
                observations: history.len(),
            };
        }

        let mut score: u32 = 0;
        let mut flags = Vec::new();

        // Mean is defined here: min_history >= 1 was checked above.
        let mean = stats::mean(history).unwrap_or(0.0);
        let stdev = stats::sample_stdev(history);
        let slope = stats::ols_slope(history);

        let change_percent = if mean > 0.0 {
            (current - mean) / mean * 100.0
        } else {
            0.0
        };

        if mean > 0.0 && change_percent <= self.config.drop_threshold_percent {
            score += self.config.drop_weight as u32;
            flags.push(SignalFlag::ConsumptionDrop { change_percent });
        }
        if mean > 0.0 && change_percent >= self.config.spike_threshold_percent {
            score += self.config.spike_weight as u32;
            flags.push(SignalFlag::ConsumptionSpike { change_percent });
        }

        if let Some(z) = stats::z_score(current, history) {
            if z.abs() > self.config.z_threshold {
                score += self.config.dispersion_weight as u32;
                flags.push(SignalFlag::Dispersion { z_score: z });
            }
        }

        if let Some(slope) = slope {
            let last = history[history.len() - 1];
            if slope < self.config.slope_threshold && current < last {
                score += self.config.trend_weight as u32;
                flags.push(SignalFlag::DecliningTrend { slope });
            }
        }

        if let Some(meta) = metadata {
            if meta.capture_age_seconds > self.config.max_capture_age_seconds {
                score += self.config.stale_capture_weight as u32;
                flags.push(SignalFlag::StaleCapture {
                    age_seconds: meta.capture_age_seconds,
                });
            }
            if !meta.has_location {
                score += self.config.missing_location_weight as u32;
                flags.push(SignalFlag::MissingLocation);
            }
            if meta.was_edited {
                score += self.config.edited_weight as u32;
                flags.push(SignalFlag::EditingDetected);
            }
        }

        let score = score.min(100) as u8;
        let level = classify(score);

        debug!(
            score,
            level = ?level,
            flags = flags.len(),
            current,
            mean,
            "Anomaly signal computed"
        );

        SignalReport::Scored(ScoredSignal {
            score,
            level,
            flags,
            details: SignalDetails {
                current,
                mean,
                stdev,
                change_percent,
                slope,
            },
        })
    }

    /// Plausibility flags over raw meter indices, independent of the score.
    /// An index can never decrease, and a consumption jump past five times
    /// the previous period is suspect on its own.
    pub fn reading_flags(
        &self,
        current_index: u64,
        previous_index: u64,
        previous_consumption: f64,
    ) -> Vec<SignalFlag> {
        let mut flags = Vec::new();

        if current_index < previous_index {
            flags.push(SignalFlag::IndexDecreased {
                previous: previous_index,
                current: current_index,
            });
            return flags;
        }

        let consumption = (current_index - previous_index) as f64;
        if previous_consumption > 0.0 && consumption > previous_consumption * 5.0 {
            flags.push(SignalFlag::ExcessiveConsumption {
                current: consumption,
                previous: previous_consumption,
            });
        }

        flags
    }
}

fn classify(score: u8) -> SignalLevel {
    match score {
        0..=29 => SignalLevel::Low,
        30..=49 => SignalLevel::Medium,
        50..=69 => SignalLevel::High,
        _ => SignalLevel::Critical,
    }
}
