use crate::config::{ConfigError, ContextConfig};
use crate::data_loading::{Annotations, RecordSource, Recording, SourceError};
use crate::heart_analysis::{self, EpisodeDetector, EpisodeSummary};
use crate::preprocessing::{mean, min_max, round_to};
use crate::signal_quality::QualityEstimator;
use crate::{BradycardiaEpisode, EcgSegment, PatientContext, PatientInfo, SignalInfo};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// MIT-BIH records with prominent bradycardia
pub const BRADYCARDIA_RECORDS: [&str; 5] = ["107", "117", "118", "207", "217"];

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid segment request: {reason}")]
    InvalidSegment { reason: String },

    #[error("channel {channel} requested but record has {available} channels")]
    ChannelOutOfRange { channel: usize, available: usize },
}

impl ContextError {
    /// True when the record could not be resolved at all
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, ContextError::Source(e) if e.is_unavailable())
    }
}

/// Episodes of one record, the payload downstream consumers ask for most
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub record_id: String,
    pub total_episodes: usize,
    pub episodes: Vec<BradycardiaEpisode>,
    pub summary: Option<EpisodeSummary>,
}

/// Turns record identifiers into patient contexts using an injected record source.
pub struct ContextExtractor<S> {
    source: S,
    config: ContextConfig,
    detector: EpisodeDetector,
    estimator: QualityEstimator,
}

impl<S: RecordSource> ContextExtractor<S> {
    pub fn new(source: S, config: ContextConfig) -> Result<Self, ContextError> {
        config.validate()?;
        Ok(ContextExtractor {
            source,
            detector: EpisodeDetector::new(config.episodes),
            estimator: QualityEstimator::new(config.quality),
            config,
        })
    }

    pub fn with_defaults(source: S) -> Self {
        let config = ContextConfig::default();
        ContextExtractor {
            source,
            detector: EpisodeDetector::new(config.episodes),
            estimator: QualityEstimator::new(config.quality),
            config,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn extract_patient_context(&self, record_id: &str) -> Result<PatientContext, ContextError> {
        info!("Extracting context for record {}", record_id);
        let (recording, annotations) = self.source.load(record_id)?;
        self.assemble(record_id, &recording, &annotations)
    }

    /// Build a context from an already loaded record. Episode detection and quality
    /// estimation run side by side.
    pub fn assemble(
        &self,
        record_id: &str,
        recording: &Recording,
        annotations: &Annotations,
    ) -> Result<PatientContext, ContextError> {
        let channel = self.config.analysis_channel;
        let signal = recording
            .channel_samples(channel)
            .ok_or(ContextError::ChannelOutOfRange {
                channel,
                available: recording.num_channels(),
            })?;
        let fs = recording.sampling_rate;

        let (bradycardia_events, quality_metrics) = rayon::join(
            || self.detector.detect(annotations, fs),
            || self.estimator.estimate(&signal, fs),
        );

        let (min, max) = min_max(&signal);
        let has_bradycardia = !bradycardia_events.is_empty();
        info!(
            "record {}: {} beats, {} bradycardia intervals, {} quality",
            record_id,
            annotations.len(),
            bradycardia_events.len(),
            quality_metrics.quality_score
        );

        Ok(PatientContext {
            record_id: record_id.to_string(),
            patient_info: PatientInfo {
                record_name: recording.record_name.clone(),
                comments: recording.comments.clone(),
                duration_minutes: round_to(recording.duration_seconds() / 60.0, 2),
                sampling_rate: fs,
            },
            signal_info: SignalInfo {
                channels: recording.channel_names.clone(),
                units: recording.units.clone(),
                baseline: mean(&signal),
                signal_range: [min, max],
            },
            bradycardia_events,
            quality_metrics,
            total_beats: annotations.len(),
            has_bradycardia,
        })
    }

    pub fn episodes(&self, record_id: &str) -> Result<EpisodeReport, ContextError> {
        let (recording, annotations) = self.source.load(record_id)?;
        let episodes = self.detector.detect(&annotations, recording.sampling_rate);
        Ok(EpisodeReport {
            record_id: record_id.to_string(),
            total_episodes: episodes.len(),
            summary: heart_analysis::summarize(&episodes),
            episodes,
        })
    }

    /// Raw window of the analysis channel starting at `start_time` seconds.
    ///
    /// A window reaching past the end of the signal is clipped, so the segment may be
    /// shorter than requested or empty. Negative or non-finite start times and
    /// non-positive durations are rejected.
    pub fn extract_ecg_segment(
        &self,
        record_id: &str,
        start_time: f64,
        duration: f64,
    ) -> Result<EcgSegment, ContextError> {
        if !start_time.is_finite() || start_time < 0.0 {
            return Err(ContextError::InvalidSegment {
                reason: format!("start time must be a non-negative number, got {}", start_time),
            });
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(ContextError::InvalidSegment {
                reason: format!("duration must be positive, got {}", duration),
            });
        }

        let (recording, _) = self.source.load(record_id)?;
        let channel = self.config.analysis_channel;
        let row = recording
            .channel(channel)
            .ok_or(ContextError::ChannelOutOfRange {
                channel,
                available: recording.num_channels(),
            })?;

        let fs = recording.sampling_rate;
        let total = row.len();
        let start_sample = ((start_time * fs as f64).floor() as usize).min(total);
        let end_sample = (((start_time + duration) * fs as f64).floor() as usize).min(total);
        let requested = ((start_time + duration) * fs as f64).floor() as usize
            - (start_time * fs as f64).floor() as usize;

        let signal: Vec<f64> = row
            .iter()
            .skip(start_sample)
            .take(end_sample - start_sample)
            .copied()
            .collect();
        if signal.len() < requested {
            warn!(
                "segment of record {} clipped to {} of {} samples (signal has {})",
                record_id,
                signal.len(),
                requested,
                total
            );
        }
        let time = (0..signal.len())
            .map(|i| i as f64 / fs as f64 + start_time)
            .collect();
        debug!(
            "segment {}: samples {}..{} at {} Hz",
            record_id, start_sample, end_sample, fs
        );

        Ok(EcgSegment {
            time,
            signal,
            sampling_rate: fs,
            start_time,
            duration,
        })
    }

    /// Contexts for many records in parallel. Results keep the input order and a failing
    /// record does not stop the others.
    pub fn batch_extract(
        &self,
        record_ids: &[String],
    ) -> Vec<(String, Result<PatientContext, ContextError>)> {
        let results: Vec<_> = record_ids
            .par_iter()
            .map(|id| (id.clone(), self.extract_patient_context(id)))
            .collect();

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            warn!("{} of {} records failed", failed, results.len());
        }
        results
    }

    pub fn bradycardia_records(&self) -> Vec<String> {
        BRADYCARDIA_RECORDS.iter().map(|id| id.to_string()).collect()
    }

    pub fn available_records(&self) -> Result<Vec<String>, ContextError> {
        Ok(self.source.available_records()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loading::MemorySource;
    use crate::signal_quality::QualityScore;

    fn recording(samples: Vec<f64>) -> Recording {
        Recording::from_channels("100", 360, vec![("MLII".to_string(), samples)])
            .with_units(vec!["mV".to_string()])
    }

    fn extractor(samples: Vec<f64>, beats: Vec<u64>) -> ContextExtractor<MemorySource> {
        let symbols = vec!['N'; beats.len()];
        let source =
            MemorySource::new().with_record("100", recording(samples), Annotations::new(beats, symbols));
        ContextExtractor::with_defaults(source)
    }

    #[test]
    fn context_for_slow_record() {
        let ramp: Vec<f64> = (0..3600).map(|i| (i % 360) as f64 / 360.0).collect();
        let extractor = extractor(ramp, vec![0, 500, 1000]);
        let context = extractor.extract_patient_context("100").expect("context");

        assert_eq!(context.record_id, "100");
        assert_eq!(context.total_beats, 3);
        assert_eq!(context.bradycardia_events.len(), 2);
        assert!(context.has_bradycardia);
        assert_eq!(context.patient_info.sampling_rate, 360);
        assert_eq!(context.patient_info.duration_minutes, 0.17);
        assert!(context.patient_info.comments.is_empty());
        assert_eq!(context.signal_info.channels, vec!["MLII"]);
        assert_eq!(context.signal_info.units, vec!["mV"]);
        assert_eq!(context.signal_info.signal_range[0], 0.0);
        assert!(context.signal_info.signal_range[1] < 1.0);
        assert_eq!(context.quality_metrics.signal_length, 3600);
    }

    #[test]
    fn context_for_normal_record() {
        let extractor = extractor(vec![0.5; 720], vec![0, 200, 400]);
        let context = extractor.extract_patient_context("100").expect("context");
        assert!(context.bradycardia_events.is_empty());
        assert!(!context.has_bradycardia);
        assert_eq!(context.signal_info.baseline, 0.5);
        assert_eq!(context.quality_metrics.snr_estimate_db, 60.0);
        assert_eq!(context.quality_metrics.quality_score, QualityScore::High);
    }

    #[test]
    fn unknown_record_is_source_unavailable() {
        let extractor = extractor(vec![0.0; 10], vec![]);
        let err = extractor.extract_patient_context("999").unwrap_err();
        assert!(err.is_source_unavailable());
    }

    #[test]
    fn missing_analysis_channel_is_reported() {
        let source = MemorySource::new().with_record(
            "100",
            recording(vec![0.0; 10]),
            Annotations::default(),
        );
        let config = ContextConfig {
            analysis_channel: 3,
            ..ContextConfig::default()
        };
        let extractor = ContextExtractor::new(source, config).expect("valid config");
        let err = extractor.extract_patient_context("100").unwrap_err();
        assert!(matches!(
            err,
            ContextError::ChannelOutOfRange {
                channel: 3,
                available: 1
            }
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ContextConfig::default();
        config.quality.snr_medium_db = 30.0;
        assert!(matches!(
            ContextExtractor::new(MemorySource::new(), config),
            Err(ContextError::Config(_))
        ));
    }

    #[test]
    fn segment_has_requested_length() {
        let signal: Vec<f64> = (0..20 * 360).map(|i| i as f64).collect();
        let extractor = extractor(signal, vec![]);
        let segment = extractor.extract_ecg_segment("100", 10.0, 5.0).expect("segment");

        assert_eq!(segment.len(), 1800);
        assert_eq!(segment.time.len(), 1800);
        assert_eq!(segment.time[0], 10.0);
        assert!((segment.time[1799] - (10.0 + 1799.0 / 360.0)).abs() < 1e-9);
        assert_eq!(segment.signal[0], 3600.0);
        assert_eq!(segment.sampling_rate, 360);
        assert_eq!(segment.duration, 5.0);
    }

    #[test]
    fn segment_past_the_end_is_clipped() {
        let extractor = extractor(vec![1.0; 12 * 360], vec![]);
        let segment = extractor.extract_ecg_segment("100", 10.0, 5.0).expect("segment");
        assert_eq!(segment.len(), 720);

        let beyond = extractor.extract_ecg_segment("100", 30.0, 5.0).expect("segment");
        assert!(beyond.is_empty());
        assert!(beyond.time.is_empty());
    }

    #[test]
    fn segment_rejects_bad_windows() {
        let extractor = extractor(vec![1.0; 360], vec![]);
        for (start, duration) in [(-1.0, 5.0), (f64::NAN, 5.0), (0.0, 0.0), (0.0, -2.0)] {
            assert!(matches!(
                extractor.extract_ecg_segment("100", start, duration),
                Err(ContextError::InvalidSegment { .. })
            ));
        }
    }

    #[test]
    fn episode_report_counts_episodes() {
        let extractor = extractor(vec![0.0; 1200], vec![0, 500, 1000]);
        let report = extractor.episodes("100").expect("report");
        assert_eq!(report.total_episodes, 2);
        assert_eq!(report.episodes.len(), 2);
        assert_eq!(report.summary.map(|s| s.total_episodes), Some(2));
    }

    #[test]
    fn batch_keeps_order_and_isolates_failures() {
        let extractor = extractor(vec![0.0; 1200], vec![0, 500, 1000]);
        let ids = vec!["100".to_string(), "missing".to_string(), "100".to_string()];
        let results = extractor.batch_extract(&ids);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "100");
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert_eq!(results[2].1.as_ref().ok(), results[0].1.as_ref().ok());
    }

    #[test]
    fn known_bradycardia_records() {
        let extractor = extractor(vec![], vec![]);
        assert_eq!(
            extractor.bradycardia_records(),
            vec!["107", "117", "118", "207", "217"]
        );
        assert_eq!(extractor.available_records().expect("list"), vec!["100"]);
    }
}
