use crate::config::EpisodeThresholds;
use crate::data_loading::Annotations;
use crate::preprocessing::round_to;
use crate::BradycardiaEpisode;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Instantaneous heart rate for every adjacent beat pair, in beats per minute.
///
/// A pair whose sample index does not increase yields 0.0 rather than an error.
pub fn instantaneous_heart_rates(annotations: &Annotations, sample_rate: u32) -> Vec<f64> {
    annotations
        .samples
        .windows(2)
        .map(|pair| heart_rate_between(pair[0], pair[1], sample_rate))
        .collect()
}

fn heart_rate_between(previous: u64, current: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    let rr_interval_sec = (current as f64 - previous as f64) / sample_rate as f64;
    if rr_interval_sec > 0.0 {
        60.0 / rr_interval_sec
    } else {
        0.0
    }
}

/// Flags every beat-to-beat interval whose heart rate lies strictly inside the
/// configured window. Intervals are reported one by one, never merged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpisodeDetector {
    thresholds: EpisodeThresholds,
}

impl EpisodeDetector {
    pub fn new(thresholds: EpisodeThresholds) -> Self {
        EpisodeDetector { thresholds }
    }

    pub fn thresholds(&self) -> &EpisodeThresholds {
        &self.thresholds
    }

    pub fn is_bradycardic(&self, heart_rate_bpm: f64) -> bool {
        heart_rate_bpm > self.thresholds.low_bpm && heart_rate_bpm < self.thresholds.high_bpm
    }

    pub fn detect(&self, annotations: &Annotations, sample_rate: u32) -> Vec<BradycardiaEpisode> {
        let samples = &annotations.samples;
        let mut episodes = Vec::new();
        let mut malformed_pairs = 0usize;

        for i in 1..samples.len() {
            if samples[i] <= samples[i - 1] {
                malformed_pairs += 1;
            }
            let heart_rate = heart_rate_between(samples[i - 1], samples[i], sample_rate);
            if !self.is_bradycardic(heart_rate) {
                continue;
            }

            let time_sec = samples[i] as f64 / sample_rate as f64;
            let annotation_type = annotations
                .symbol_at(i)
                .unwrap_or(self.thresholds.default_symbol);
            trace!(
                "beat {} at {:.2}s: {:.1} bpm ({})",
                i,
                time_sec,
                heart_rate,
                annotation_type
            );

            episodes.push(BradycardiaEpisode {
                time_seconds: round_to(time_sec, 2),
                time_minutes: round_to(time_sec / 60.0, 2),
                heart_rate_bpm: heart_rate,
                rr_interval_ms: 60_000.0 / heart_rate,
                annotation_type,
            });
        }

        if malformed_pairs > 0 {
            debug!(
                "{} beat pairs with non-increasing sample index were skipped",
                malformed_pairs
            );
        }
        let missing_symbols = annotations.missing_symbols();
        if missing_symbols > 0 {
            debug!(
                "{} of {} beats have no symbol, defaulting to '{}'",
                missing_symbols,
                samples.len(),
                self.thresholds.default_symbol
            );
        }
        debug!(
            "{} of {} intervals inside ({}, {}) bpm",
            episodes.len(),
            samples.len().saturating_sub(1),
            self.thresholds.low_bpm,
            self.thresholds.high_bpm
        );

        episodes
    }
}

/// Aggregate view of a record's episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub total_episodes: usize,
    pub min_heart_rate_bpm: f64,
    pub mean_heart_rate_bpm: f64,
    pub first_time_seconds: f64,
    pub last_time_seconds: f64,
}

pub fn summarize(episodes: &[BradycardiaEpisode]) -> Option<EpisodeSummary> {
    let first = episodes.first()?;
    let last = episodes.last()?;
    let rates: Vec<f64> = episodes.iter().map(|e| e.heart_rate_bpm).collect();

    Some(EpisodeSummary {
        total_episodes: episodes.len(),
        min_heart_rate_bpm: rates.iter().copied().fold(f64::INFINITY, f64::min),
        mean_heart_rate_bpm: crate::preprocessing::mean(&rates),
        first_time_seconds: first.time_seconds,
        last_time_seconds: last.time_seconds,
    })
}

/// Consecutive episodes whose closing beats are no further apart than a gap.
///
/// This is a separate reading of the episode list; `EpisodeDetector::detect` never
/// produces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BradycardiaRun {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub intervals: usize,
    pub min_heart_rate_bpm: f64,
    pub mean_heart_rate_bpm: f64,
}

pub fn coalesce_runs(episodes: &[BradycardiaEpisode], max_gap_seconds: f64) -> Vec<BradycardiaRun> {
    let mut runs: Vec<BradycardiaRun> = Vec::new();
    let mut rate_sum = 0.0;

    for episode in episodes {
        match runs.last_mut() {
            Some(run) if episode.time_seconds - run.end_seconds <= max_gap_seconds => {
                run.end_seconds = episode.time_seconds;
                run.intervals += 1;
                run.min_heart_rate_bpm = run.min_heart_rate_bpm.min(episode.heart_rate_bpm);
                rate_sum += episode.heart_rate_bpm;
                run.mean_heart_rate_bpm = rate_sum / run.intervals as f64;
            }
            _ => {
                rate_sum = episode.heart_rate_bpm;
                runs.push(BradycardiaRun {
                    start_seconds: episode.time_seconds,
                    end_seconds: episode.time_seconds,
                    intervals: 1,
                    min_heart_rate_bpm: episode.heart_rate_bpm,
                    mean_heart_rate_bpm: episode.heart_rate_bpm,
                });
            }
        }
    }

    runs
}
