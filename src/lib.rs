pub mod config;
pub mod context;
pub mod data_loading;
pub mod heart_analysis;
pub mod preprocessing;
pub mod signal_quality;

use serde::{Deserialize, Serialize};
use signal_quality::QualityScore;

/// One beat-to-beat interval whose instantaneous heart rate fell inside the bradycardia window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BradycardiaEpisode {
    pub time_seconds: f64, // Time of the closing beat, 2 decimals
    pub time_minutes: f64, // Same instant in minutes, 2 decimals
    pub heart_rate_bpm: f64,
    pub rr_interval_ms: f64,
    pub annotation_type: char,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub snr_estimate_db: f64,
    pub baseline_wander: f64,
    pub quality_score: QualityScore,
    pub signal_length: usize,
    pub has_artifacts: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub record_name: String,
    pub comments: Vec<String>,
    pub duration_minutes: f64,
    pub sampling_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub channels: Vec<String>,
    pub units: Vec<String>,
    pub baseline: f64,
    pub signal_range: [f64; 2],
}

/// Everything downstream classifiers and explainers get to see about a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientContext {
    pub record_id: String,
    pub patient_info: PatientInfo,
    pub signal_info: SignalInfo,
    pub bradycardia_events: Vec<BradycardiaEpisode>,
    pub quality_metrics: QualityMetrics,
    pub total_beats: usize,
    pub has_bradycardia: bool,
}

impl PatientContext {
    pub fn episodes(&self) -> &[BradycardiaEpisode] {
        &self.bradycardia_events
    }
}

/// Raw signal window returned for visualisation requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcgSegment {
    pub time: Vec<f64>,
    pub signal: Vec<f64>,
    pub sampling_rate: u32,
    pub start_time: f64,
    pub duration: f64,
}

impl EcgSegment {
    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }
}
