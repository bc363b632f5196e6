use std::fs;
use std::path::Path;

use ecg_context::config::{ContextConfig, EpisodeThresholds};
use ecg_context::context::ContextExtractor;
use ecg_context::data_loading::{JsonDirSource, SourceError};
use ecg_context::signal_quality::QualityScore;
use serde_json::json;

const FS: u32 = 360;

/// Writes a record in the converter's JSON layout with a slow sine on MLII
fn write_record(dir: &Path, record_id: &str, seconds: usize, beats: &[(u64, &str)]) {
    let n = seconds * FS as usize;
    let mlii: Vec<f64> = (0..n)
        .map(|i| (2.0 * std::f64::consts::PI * 1.1 * i as f64 / FS as f64).sin())
        .collect();
    let annotations: Vec<_> = beats
        .iter()
        .map(|(sample, symbol)| json!({ "sample": sample, "type": symbol }))
        .collect();
    let record = json!({
        "recordName": record_id,
        "fs": FS,
        "length": n,
        "channels": 2,
        "channelNames": ["MLII", "V1"],
        "units": ["mV", "mV"],
        "comments": ["75 F 1011 654 x1"],
        "signals": { "MLII": mlii, "V1": null },
        "annotations": annotations,
    });
    fs::write(
        dir.join(format!("{}.json", record_id)),
        serde_json::to_string(&record).expect("serialize record"),
    )
    .expect("write record");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        // 43.2 bpm for two beats, then 108 bpm
        write_record(
            dir.path(),
            "117",
            20,
            &[(0, "N"), (500, "N"), (1000, "A"), (1200, "N"), (1400, "N")],
        );
        write_record(dir.path(), "100", 20, &[(0, "N"), (200, "N"), (400, "N")]);
        dir
    }

    #[test]
    fn test_bradycardia_record_context() {
        let dir = fixture();
        let extractor = ContextExtractor::with_defaults(JsonDirSource::new(dir.path()));
        let context = extractor
            .extract_patient_context("117")
            .expect("Failed to extract context");

        assert_eq!(context.total_beats, 5);
        assert_eq!(context.bradycardia_events.len(), 2);
        assert!(context.has_bradycardia);
        assert_eq!(context.bradycardia_events[1].annotation_type, 'A');
        for episode in &context.bradycardia_events {
            assert!((episode.heart_rate_bpm - 43.2).abs() < 1e-9);
            assert_eq!(episode.rr_interval_ms.round(), 1389.0);
        }
        assert_eq!(context.patient_info.duration_minutes, 0.33);
        assert_eq!(context.patient_info.comments, vec!["75 F 1011 654 x1"]);
        assert_eq!(context.signal_info.channels, vec!["MLII"]);
        assert_eq!(context.quality_metrics.signal_length, 20 * FS as usize);
        assert_eq!(context.quality_metrics.quality_score, QualityScore::High);
    }

    #[test]
    fn test_normal_record_context() {
        let dir = fixture();
        let extractor = ContextExtractor::with_defaults(JsonDirSource::new(dir.path()));
        let context = extractor
            .extract_patient_context("100")
            .expect("Failed to extract context");
        assert!(context.bradycardia_events.is_empty());
        assert!(!context.has_bradycardia);
    }

    #[test]
    fn test_extraction_is_repeatable() {
        let dir = fixture();
        let extractor = ContextExtractor::with_defaults(JsonDirSource::new(dir.path()));
        let first = extractor.extract_patient_context("117").expect("first run");
        let second = extractor.extract_patient_context("117").expect("second run");
        assert_eq!(first, second);
    }

    #[test]
    fn test_context_json_shape() {
        let dir = fixture();
        let extractor = ContextExtractor::with_defaults(JsonDirSource::new(dir.path()));
        let context = extractor.extract_patient_context("117").expect("context");
        let value = serde_json::to_value(&context).expect("serialize context");

        assert_eq!(value["record_id"], "117");
        assert_eq!(value["patient_info"]["sampling_rate"], 360);
        assert_eq!(value["quality_metrics"]["quality_score"], "high");
        assert_eq!(value["bradycardia_events"][0]["annotation_type"], "N");
        assert_eq!(value["bradycardia_events"][0]["time_seconds"], 1.39);
        assert_eq!(value["has_bradycardia"], true);
        assert!(value["signal_info"]["signal_range"].is_array());
    }

    #[test]
    fn test_missing_record_is_distinct_failure() {
        let dir = fixture();
        let extractor = ContextExtractor::with_defaults(JsonDirSource::new(dir.path()));
        let err = extractor
            .extract_patient_context("999")
            .expect_err("record should be missing");
        assert!(err.is_source_unavailable());
        assert!(matches!(
            err,
            ecg_context::context::ContextError::Source(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_segment_window() {
        let dir = fixture();
        let extractor = ContextExtractor::with_defaults(JsonDirSource::new(dir.path()));
        let segment = extractor
            .extract_ecg_segment("117", 10.0, 5.0)
            .expect("Failed to extract segment");
        assert_eq!(segment.signal.len(), 1800);
        assert_eq!(segment.time[0], 10.0);
        assert!((segment.time[1799] - (10.0 + 1799.0 / 360.0)).abs() < 1e-9);

        let clipped = extractor
            .extract_ecg_segment("117", 18.0, 5.0)
            .expect("Failed to extract segment");
        assert_eq!(clipped.signal.len(), 720);
    }

    #[test]
    fn test_custom_thresholds() {
        let dir = fixture();
        let config = ContextConfig {
            episodes: EpisodeThresholds {
                low_bpm: 30.0,
                high_bpm: 40.0,
                ..EpisodeThresholds::default()
            },
            ..ContextConfig::default()
        };
        let extractor =
            ContextExtractor::new(JsonDirSource::new(dir.path()), config).expect("valid config");
        let context = extractor.extract_patient_context("117").expect("context");
        assert!(!context.has_bradycardia);
    }

    #[test]
    fn test_batch_and_listing() {
        let dir = fixture();
        let extractor = ContextExtractor::with_defaults(JsonDirSource::new(dir.path()));
        let ids: Vec<String> = ["117", "404", "100"].iter().map(|s| s.to_string()).collect();
        let results = extractor.batch_extract(&ids);

        let has_bradycardia: Vec<Option<bool>> = results
            .iter()
            .map(|(_, r)| r.as_ref().ok().map(|c| c.has_bradycardia))
            .collect();
        assert_eq!(has_bradycardia, vec![Some(true), None, Some(false)]);

        assert_eq!(
            extractor.available_records().expect("list records"),
            vec!["100", "117"]
        );
    }
}
