use log::{debug, info, warn};
use ndarray::{Array2, ArrayView1};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Signal slots written by the MIT-BIH JSON converter, in channel order
const CONVERTER_SLOTS: [&str; 2] = ["MLII", "V1"];

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("record {0} not found")]
    NotFound(String),

    #[error("failed to read record {record_id}: {source}")]
    Io {
        record_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("record {record_id} is malformed: {reason}")]
    Malformed { record_id: String, reason: String },

    #[error("record {record_id} has invalid sampling rate {fs}")]
    InvalidSamplingRate { record_id: String, fs: u32 },
}

impl SourceError {
    /// True when the identifier could not be resolved to any data at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SourceError::NotFound(_) | SourceError::Io { .. })
    }

    fn malformed(record_id: &str, reason: impl ToString) -> Self {
        SourceError::Malformed {
            record_id: record_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A multi-channel recording, channels × samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub record_name: String,
    pub sampling_rate: u32,
    pub signals: Array2<f64>,
    pub channel_names: Vec<String>,
    pub units: Vec<String>,
    pub comments: Vec<String>,
}

impl Recording {
    /// Build a recording from named channels. Channels of unequal length are truncated
    /// to the shortest one.
    pub fn from_channels(
        record_name: impl Into<String>,
        sampling_rate: u32,
        channels: Vec<(String, Vec<f64>)>,
    ) -> Self {
        let num_samples = channels.iter().map(|(_, s)| s.len()).min().unwrap_or(0);
        let signals = Array2::from_shape_fn((channels.len(), num_samples), |(c, i)| {
            channels[c].1[i]
        });

        Recording {
            record_name: record_name.into(),
            sampling_rate,
            signals,
            channel_names: channels.into_iter().map(|(name, _)| name).collect(),
            units: Vec::new(),
            comments: Vec::new(),
        }
    }

    pub fn with_units(mut self, units: Vec<String>) -> Self {
        self.units = units;
        self
    }

    pub fn with_comments(mut self, comments: Vec<String>) -> Self {
        self.comments = comments;
        self
    }

    pub fn num_channels(&self) -> usize {
        self.signals.nrows()
    }

    pub fn num_samples(&self) -> usize {
        self.signals.ncols()
    }

    pub fn channel(&self, index: usize) -> Option<ArrayView1<'_, f64>> {
        (index < self.num_channels()).then(|| self.signals.row(index))
    }

    pub fn channel_samples(&self, index: usize) -> Option<Vec<f64>> {
        self.channel(index).map(|row| row.to_vec())
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sampling_rate == 0 {
            return 0.0;
        }
        self.num_samples() as f64 / self.sampling_rate as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatAnnotation {
    pub sample: u64,
    pub symbol: char,
}

/// Beat sample indices with their symbols.
///
/// Kept as two parallel lists indexed by beat. A beat may have no symbol, and the symbol
/// list may be shorter than the sample list; consumers decide what a missing symbol means.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub samples: Vec<u64>,
    pub symbols: Vec<Option<char>>,
}

impl Annotations {
    pub fn new(samples: Vec<u64>, symbols: Vec<char>) -> Self {
        Annotations {
            samples,
            symbols: symbols.into_iter().map(Some).collect(),
        }
    }

    pub fn push(&mut self, sample: u64, symbol: Option<char>) {
        self.samples.push(sample);
        self.symbols.push(symbol);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn symbol_at(&self, index: usize) -> Option<char> {
        self.symbols.get(index).copied().flatten()
    }

    /// Number of beats that carry no symbol.
    pub fn missing_symbols(&self) -> usize {
        (0..self.samples.len())
            .filter(|&i| self.symbol_at(i).is_none())
            .count()
    }
}

impl FromIterator<BeatAnnotation> for Annotations {
    fn from_iter<I: IntoIterator<Item = BeatAnnotation>>(iter: I) -> Self {
        let (samples, symbols) = iter.into_iter().map(|b| (b.sample, Some(b.symbol))).unzip();
        Annotations { samples, symbols }
    }
}

/// Resolves record identifiers to a recording and its beat annotations.
pub trait RecordSource: Send + Sync {
    fn load(&self, record_id: &str) -> Result<(Recording, Annotations), SourceError>;

    fn available_records(&self) -> Result<Vec<String>, SourceError>;
}

impl<T: RecordSource + ?Sized> RecordSource for Box<T> {
    fn load(&self, record_id: &str) -> Result<(Recording, Annotations), SourceError> {
        (**self).load(record_id)
    }

    fn available_records(&self) -> Result<Vec<String>, SourceError> {
        (**self).available_records()
    }
}

/// In-memory records, mostly for synthetic fixtures.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    records: HashMap<String, (Recording, Annotations)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        record_id: impl Into<String>,
        recording: Recording,
        annotations: Annotations,
    ) {
        self.records.insert(record_id.into(), (recording, annotations));
    }

    pub fn with_record(
        mut self,
        record_id: impl Into<String>,
        recording: Recording,
        annotations: Annotations,
    ) -> Self {
        self.insert(record_id, recording, annotations);
        self
    }
}

impl RecordSource for MemorySource {
    fn load(&self, record_id: &str) -> Result<(Recording, Annotations), SourceError> {
        self.records
            .get(record_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(record_id.to_string()))
    }

    fn available_records(&self) -> Result<Vec<String>, SourceError> {
        let mut ids: Vec<String> = self.records.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonRecord {
    record_name: Option<String>,
    fs: u32,
    channel_names: Vec<String>,
    #[serde(default)]
    units: Vec<String>,
    #[serde(default)]
    comments: Vec<String>,
    signals: HashMap<String, Option<Vec<f64>>>,
    #[serde(default)]
    annotations: Vec<JsonAnnotation>,
}

#[derive(Debug, Deserialize)]
struct JsonAnnotation {
    sample: u64,
    #[serde(rename = "type")]
    symbol: String,
}

/// Directory of `<record_id>.json` files in the MIT-BIH converter layout.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
}

impl JsonDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonDirSource { root: root.into() }
    }

    fn record_path(&self, record_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", record_id))
    }

    fn decode(record_id: &str, raw: JsonRecord) -> Result<(Recording, Annotations), SourceError> {
        if raw.fs == 0 {
            return Err(SourceError::InvalidSamplingRate {
                record_id: record_id.to_string(),
                fs: raw.fs,
            });
        }

        let mut signals = raw.signals;
        let mut channels = Vec::new();
        let mut units = Vec::new();
        for (i, name) in raw.channel_names.iter().enumerate() {
            // The converter keys its first two channels by position as MLII/V1, whatever
            // their real names, so the slot wins over the name
            let samples = CONVERTER_SLOTS
                .get(i)
                .and_then(|slot| signals.remove(*slot).flatten())
                .or_else(|| signals.remove(name.as_str()).flatten());
            match samples {
                Some(samples) => {
                    channels.push((name.clone(), samples));
                    units.push(raw.units.get(i).cloned().unwrap_or_default());
                }
                None => debug!("record {}: channel {} has no samples", record_id, name),
            }
        }

        if channels.is_empty() {
            return Err(SourceError::malformed(record_id, "no signal channels"));
        }

        let (samples, symbols): (Vec<u64>, Vec<char>) = raw
            .annotations
            .into_iter()
            .map(|a| {
                a.symbol
                    .chars()
                    .next()
                    .map(|symbol| (a.sample, symbol))
                    .ok_or_else(|| {
                        SourceError::malformed(
                            record_id,
                            format!("annotation at sample {} has no symbol", a.sample),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unzip();

        let recording = Recording::from_channels(
            raw.record_name.unwrap_or_else(|| record_id.to_string()),
            raw.fs,
            channels,
        )
        .with_units(units)
        .with_comments(raw.comments);

        Ok((recording, Annotations::new(samples, symbols)))
    }
}

impl RecordSource for JsonDirSource {
    fn load(&self, record_id: &str) -> Result<(Recording, Annotations), SourceError> {
        let path = self.record_path(record_id);
        let file = open_record_file(record_id, &path)?;
        info!("Loading record {} from {}", record_id, path.display());

        let raw: JsonRecord = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SourceError::malformed(record_id, e))?;
        let (recording, annotations) = Self::decode(record_id, raw)?;
        debug!(
            "record {}: {} channels, {} samples at {} Hz, {} beats",
            record_id,
            recording.num_channels(),
            recording.num_samples(),
            recording.sampling_rate,
            annotations.len()
        );
        Ok((recording, annotations))
    }

    fn available_records(&self) -> Result<Vec<String>, SourceError> {
        list_records(&self.root, |name| name.strip_suffix(".json"))
    }
}

#[derive(Debug, Deserialize)]
struct CsvBeat {
    sample: u64,
    symbol: String,
}

/// Directory of `<record_id>.csv` signals (header row holds channel names) with beats in
/// `<record_id>.ann.csv` (`sample,symbol`). CSV carries no sampling rate, so it is fixed
/// per source.
#[derive(Debug, Clone)]
pub struct CsvDirSource {
    root: PathBuf,
    sampling_rate: u32,
}

impl CsvDirSource {
    pub fn new(root: impl Into<PathBuf>, sampling_rate: u32) -> Self {
        CsvDirSource {
            root: root.into(),
            sampling_rate,
        }
    }

    fn read_signals(&self, record_id: &str, path: &Path) -> Result<Vec<(String, Vec<f64>)>, SourceError> {
        let file = open_record_file(record_id, path)?;
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

        let headers = rdr
            .headers()
            .map_err(|e| SourceError::malformed(record_id, e))?
            .clone();
        let mut channels: Vec<(String, Vec<f64>)> =
            headers.iter().map(|h| (h.to_string(), Vec::new())).collect();

        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| SourceError::malformed(record_id, e))?;
            for (channel, field) in channels.iter_mut().zip(record.iter()) {
                let value = field.parse::<f64>().map_err(|e| {
                    SourceError::malformed(record_id, format!("row {}: {}", row + 1, e))
                })?;
                channel.1.push(value);
            }
        }
        Ok(channels)
    }

    fn read_annotations(&self, record_id: &str, path: &Path) -> Result<Annotations, SourceError> {
        let file = open_record_file(record_id, path)?;
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

        let mut annotations = Annotations::default();
        for result in rdr.deserialize() {
            let beat: CsvBeat = result.map_err(|e| SourceError::malformed(record_id, e))?;
            // An empty symbol stays empty for this beat only
            annotations.push(beat.sample, beat.symbol.chars().next());
        }
        Ok(annotations)
    }
}

impl RecordSource for CsvDirSource {
    fn load(&self, record_id: &str) -> Result<(Recording, Annotations), SourceError> {
        if self.sampling_rate == 0 {
            return Err(SourceError::InvalidSamplingRate {
                record_id: record_id.to_string(),
                fs: self.sampling_rate,
            });
        }

        let signal_path = self.root.join(format!("{}.csv", record_id));
        let ann_path = self.root.join(format!("{}.ann.csv", record_id));
        info!("Loading record {} from {}", record_id, signal_path.display());

        let channels = self.read_signals(record_id, &signal_path)?;
        if channels.is_empty() {
            return Err(SourceError::malformed(record_id, "no signal channels"));
        }
        let annotations = self.read_annotations(record_id, &ann_path)?;

        Ok((
            Recording::from_channels(record_id, self.sampling_rate, channels),
            annotations,
        ))
    }

    fn available_records(&self) -> Result<Vec<String>, SourceError> {
        list_records(&self.root, |name| {
            if name.ends_with(".ann.csv") {
                None
            } else {
                name.strip_suffix(".csv")
            }
        })
    }
}

fn open_record_file(record_id: &str, path: &Path) -> Result<File, SourceError> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SourceError::NotFound(record_id.to_string())
        } else {
            SourceError::Io {
                record_id: record_id.to_string(),
                source: e,
            }
        }
    })
}

fn list_records<F>(root: &Path, record_id: F) -> Result<Vec<String>, SourceError>
where
    F: Fn(&str) -> Option<&str>,
{
    let mut ids = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                return Err(SourceError::Io {
                    record_id: root.display().to_string(),
                    source,
                });
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.file_name().to_str().and_then(&record_id) {
            Some(id) => ids.push(id.to_string()),
            None => warn_skipped(entry.path()),
        }
    }
    ids.sort();
    Ok(ids)
}

fn warn_skipped(path: &Path) {
    if path.extension().and_then(|s| s.to_str()) == Some("json") {
        warn!("Skipping unreadable record file name: {}", path.display());
    } else {
        debug!("Skipping non-record file: {}", path.display());
    }
}
