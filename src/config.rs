use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,   // <id>.json records as written by the MIT-BIH converter (default)
    CsvDir, // <id>.csv signal + <id>.ann.csv beats, sampling rate from --fs
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(SourceFormat::Json),
            "csv" | "csv-dir" => Ok(SourceFormat::CsvDir),
            _ => Err(format!(
                "Invalid source format: {}. Use json (default) or csv-dir",
                s
            )),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("threshold {name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f64 },

    #[error("low_bpm ({low}) must be below high_bpm ({high})")]
    InvertedHeartRateWindow { low: f64, high: f64 },

    #[error("snr_medium_db ({medium}) must not exceed snr_high_db ({high})")]
    InvertedSnrCutoffs { medium: f64, high: f64 },

    #[error("wander_artifact_threshold must be non-negative, got {0}")]
    NegativeWanderThreshold(f64),
}

/// Heart rate window used by the episode detector. Both bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeThresholds {
    pub low_bpm: f64,
    pub high_bpm: f64,
    /// Symbol reported when the annotation symbol list is shorter than the sample list
    pub default_symbol: char,
}

impl Default for EpisodeThresholds {
    fn default() -> Self {
        Self {
            low_bpm: 30.0,
            high_bpm: 60.0,
            default_symbol: 'N',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub snr_high_db: f64,
    pub snr_medium_db: f64,
    pub wander_artifact_threshold: f64,
    /// Reported SNR when the first difference has zero variance
    pub snr_ceiling_db: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            snr_high_db: 20.0,
            snr_medium_db: 10.0,
            wander_artifact_threshold: 0.1,
            snr_ceiling_db: 60.0,
        }
    }
}

/// Everything the context extractor needs besides a record source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    pub episodes: EpisodeThresholds,
    pub quality: QualityThresholds,
    /// Channel fed to the quality estimator and signal statistics (MLII on MIT-BIH)
    pub analysis_channel: usize,
}

impl ContextConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("low_bpm", self.episodes.low_bpm),
            ("high_bpm", self.episodes.high_bpm),
            ("snr_high_db", self.quality.snr_high_db),
            ("snr_medium_db", self.quality.snr_medium_db),
            (
                "wander_artifact_threshold",
                self.quality.wander_artifact_threshold,
            ),
            ("snr_ceiling_db", self.quality.snr_ceiling_db),
        ];
        for (name, value) in checks {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { name, value });
            }
        }

        if self.episodes.low_bpm >= self.episodes.high_bpm {
            return Err(ConfigError::InvertedHeartRateWindow {
                low: self.episodes.low_bpm,
                high: self.episodes.high_bpm,
            });
        }
        if self.quality.snr_medium_db > self.quality.snr_high_db {
            return Err(ConfigError::InvertedSnrCutoffs {
                medium: self.quality.snr_medium_db,
                high: self.quality.snr_high_db,
            });
        }
        if self.quality.wander_artifact_threshold < 0.0 {
            return Err(ConfigError::NegativeWanderThreshold(
                self.quality.wander_artifact_threshold,
            ));
        }
        Ok(())
    }
}

/// Extract bradycardia context from annotated ECG records
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing the ECG records
    #[arg(help = "Directory containing the ECG records")]
    pub data_dir: PathBuf,

    /// Record layout inside the data directory (json [default] or csv-dir)
    #[arg(long, default_value = "json")]
    pub format: SourceFormat,

    /// Sampling rate in Hz for csv-dir records (json records carry their own)
    #[arg(long, default_value = "360")]
    pub fs: u32,

    /// Lower heart rate bound (exclusive) for a bradycardia interval
    #[arg(long, env = "ECG_LOW_BPM", default_value = "30.0")]
    pub low_bpm: f64,

    /// Upper heart rate bound (exclusive) for a bradycardia interval
    #[arg(long, env = "ECG_HIGH_BPM", default_value = "60.0")]
    pub high_bpm: f64,

    /// SNR above which signal quality is "high" (dB)
    #[arg(long, env = "ECG_SNR_HIGH_DB", default_value = "20.0")]
    pub snr_high_db: f64,

    /// SNR above which signal quality is "medium" (dB)
    #[arg(long, env = "ECG_SNR_MEDIUM_DB", default_value = "10.0")]
    pub snr_medium_db: f64,

    /// Baseline wander above which a record is flagged as having artifacts
    #[arg(long, env = "ECG_WANDER_THRESHOLD", default_value = "0.1")]
    pub wander_threshold: f64,

    /// Channel used for quality metrics and signal statistics
    #[arg(long, default_value = "0")]
    pub channel: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Full patient context for one record
    Context { record_id: String },

    /// Bradycardia episodes for one record
    Episodes {
        record_id: String,

        /// Also report runs of episodes separated by at most this many seconds
        #[arg(long)]
        run_gap: Option<f64>,
    },

    /// Raw signal window for visualisation
    Segment {
        record_id: String,

        /// Start time in seconds
        #[arg(long)]
        start: f64,

        /// Window length in seconds
        #[arg(long, default_value = "10.0")]
        duration: f64,
    },

    /// Patient context for several records
    Batch { record_ids: Vec<String> },

    /// Known bradycardia records and the records present in the data directory
    Records,
}

impl Args {
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            episodes: EpisodeThresholds {
                low_bpm: self.low_bpm,
                high_bpm: self.high_bpm,
                ..EpisodeThresholds::default()
            },
            quality: QualityThresholds {
                snr_high_db: self.snr_high_db,
                snr_medium_db: self.snr_medium_db,
                wander_artifact_threshold: self.wander_threshold,
                ..QualityThresholds::default()
            },
            analysis_channel: self.channel,
        }
    }
}
