use crate::config::QualityThresholds;
use crate::preprocessing::{first_difference, moving_average_same, std_dev, variance};
use crate::QualityMetrics;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityScore {
    High,
    Medium,
    Low,
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityScore::High => "high",
            QualityScore::Medium => "medium",
            QualityScore::Low => "low",
        };
        f.write_str(label)
    }
}

/// Signal-to-noise and baseline wander estimates for a single channel.
///
/// Noise is approximated by the first difference of the signal, which is dominated by
/// high-frequency content. Baseline wander is the spread left after subtracting a
/// one-second moving average.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityEstimator {
    thresholds: QualityThresholds,
}

impl QualityEstimator {
    pub fn new(thresholds: QualityThresholds) -> Self {
        QualityEstimator { thresholds }
    }

    pub fn estimate(&self, signal: &[f64], sample_rate: u32) -> QualityMetrics {
        let snr_estimate_db = self.estimate_snr(signal);
        let baseline_wander = self.baseline_wander(signal, sample_rate);
        let quality_score = self.classify(snr_estimate_db);
        let has_artifacts = baseline_wander > self.thresholds.wander_artifact_threshold;

        debug!(
            "quality: snr {:.2} dB ({}), wander {:.4}, artifacts {}",
            snr_estimate_db, quality_score, baseline_wander, has_artifacts
        );

        QualityMetrics {
            snr_estimate_db,
            baseline_wander,
            quality_score,
            signal_length: signal.len(),
            has_artifacts,
        }
    }

    /// SNR in dB, never negative. Signals whose first difference has no variance
    /// (flat, linear, or shorter than two samples) get the configured ceiling.
    pub fn estimate_snr(&self, signal: &[f64]) -> f64 {
        let signal_power = variance(signal);
        let noise_estimate = variance(&first_difference(signal));
        self.snr_from_power(signal_power, noise_estimate)
    }

    pub fn snr_from_power(&self, signal_power: f64, noise_power: f64) -> f64 {
        if noise_power == 0.0 {
            return self.thresholds.snr_ceiling_db;
        }
        (10.0 * (signal_power / noise_power).log10()).max(0.0)
    }

    /// Standard deviation of the signal minus its moving average, with a window of one
    /// second of samples.
    pub fn baseline_wander(&self, signal: &[f64], sample_rate: u32) -> f64 {
        let trend = moving_average_same(signal, sample_rate as usize);
        let residual: Vec<f64> = signal
            .iter()
            .zip(trend.iter())
            .map(|(x, t)| x - t)
            .collect();
        std_dev(&residual)
    }

    pub fn classify(&self, snr_db: f64) -> QualityScore {
        if snr_db > self.thresholds.snr_high_db {
            QualityScore::High
        } else if snr_db > self.thresholds.snr_medium_db {
            QualityScore::Medium
        } else {
            QualityScore::Low
        }
    }
}
