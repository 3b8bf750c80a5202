//! Public data model shared by the planner, scheduler and sifter.

use std::path::PathBuf;

/// One observation file and the header values the pipeline needs. Built once, never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub file: PathBuf,
    pub source_name: String,
    pub num_samples: u64,
    /// Sample interval in seconds.
    pub sample_time_s: f64,
    pub num_channels: u32,
    pub channel_width_mhz: f64,
    pub bandwidth_mhz: f64,
    pub centre_freq_mhz: f64,
    pub mjd_start: f64,
}

impl Observation {
    /// Total duration in seconds (samples × sample interval).
    pub fn duration_s(&self) -> f64 {
        self.num_samples as f64 * self.sample_time_s
    }

    /// File name without directory or extension; used as the prefix of every product.
    pub fn basename(&self) -> String {
        self.file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "observation".to_string())
    }
}

/// A time slice of a segment. `start_s` and `length_s` are seconds from the start of the observation.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub label: String,
    pub start_s: f64,
    pub length_s: f64,
}

/// A segment length and the chunks it was split into. The full-length segment has one chunk `ck00`.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub label: String,
    /// `None` for the full-length segment.
    pub length_s: Option<f64>,
    pub chunks: Vec<Chunk>,
}

impl Segment {
    pub fn is_full(&self) -> bool {
        self.length_s.is_none()
    }
}

/// (segment, chunk) pair scoping one independent search.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchUnit {
    pub segment: String,
    pub chunk: String,
}

impl SearchUnit {
    pub fn new(segment: impl Into<String>, chunk: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            chunk: chunk.into(),
        }
    }

    /// `<segment>_<chunk>`, the tag used in product file names and marker keys.
    pub fn tag(&self) -> String {
        format!("{}_{}", self.segment, self.chunk)
    }
}

/// One batch of DM trials for one dedispersion invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct DedispersionScheme {
    pub lo_dm: f64,
    pub high_dm: f64,
    pub d_dm: f64,
    pub downsamp: u32,
    pub num_dms: usize,
}

impl DedispersionScheme {
    /// Trial DM values of this batch: `lo_dm + i * d_dm` for `i` in `0..num_dms`.
    pub fn dm_values(&self) -> Vec<f64> {
        (0..self.num_dms)
            .map(|i| self.lo_dm + i as f64 * self.d_dm)
            .collect()
    }
}

/// One detection of a candidate at a given DM trial.
#[derive(Clone, Debug, PartialEq)]
pub struct DmHit {
    pub dm: f64,
    pub snr: f64,
    pub sigma: f64,
}

/// A periodicity candidate read from an acceleration-search result file.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    /// Result file the candidate came from (file name only).
    pub file: String,
    /// 1-based candidate number inside that file.
    pub candnum: usize,
    pub dm: f64,
    pub snr: f64,
    pub sigma: f64,
    pub numharm: u32,
    pub ipow: f64,
    pub cpow: f64,
    pub period_s: f64,
    pub freq_hz: f64,
    /// Fourier bin and drift (in bins) at detection.
    pub r: f64,
    pub z: f64,
    /// Every DM trial this signal was detected at; starts with its own.
    pub hits: Vec<DmHit>,
    /// Position in discovery order (files ordered by DM, then candidate number). Breaks sigma ties.
    pub ordinal: usize,
}

impl Candidate {
    /// DM of the strongest hit; falls back to the candidate's own DM.
    pub fn peak_dm(&self) -> f64 {
        self.hits
            .iter()
            .max_by(|a, b| a.sigma.total_cmp(&b.sigma))
            .map(|h| h.dm)
            .unwrap_or(self.dm)
    }

    /// Number of distinct DM trials (to 2 decimals, as in file names) this candidate was seen at.
    pub fn distinct_dm_count(&self) -> usize {
        let mut keys: Vec<i64> = self
            .hits
            .iter()
            .map(|h| (h.dm * 100.0).round() as i64)
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys.len()
    }

    /// `file:candnum`, the identifier written to the candidate list.
    pub fn id(&self) -> String {
        format!("{}:{}", self.file, self.candnum)
    }
}

/// Catalog entry used to flag candidates that are already-known pulsars.
#[derive(Clone, Debug, PartialEq)]
pub struct KnownPulsar {
    pub name: String,
    pub period_s: f64,
    /// Fractional period tolerance from Doppler motion, computed once at load time.
    pub doppler_fraction: f64,
}

/// Outcome of one Task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Marker already present; nothing was launched.
    Skipped,
    Succeeded,
    /// Ran and produced no output; the empty sentinel was written.
    SucceededEmpty,
    Failed(String),
    /// Never started because the run was interrupted.
    Cancelled,
}

impl TaskStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskStatus::Failed(_))
    }
}

/// One Task's outcome, returned by the pool in submission order.
#[derive(Clone, Debug)]
pub struct TaskReport {
    pub key: String,
    pub status: TaskStatus,
}
