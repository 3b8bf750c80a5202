//! Application constants.
//! Thresholds, directory names and file suffixes in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    summary_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!("{pkg}.toml"),
                summary_filename: format!("{pkg}_run.json"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Default configuration file looked up in the current directory.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Machine-readable run summary written to the work directory.
    pub fn summary_filename(&self) -> &str {
        &self.summary_filename
    }
}

// ---- Work directory layout ----

/// Directory names under the root work directory.
pub struct WorkDirs;

impl WorkDirs {
    pub const MARKERS: &'static str = "00_IFOK";
    pub const LOGS: &'static str = "LOG";
    pub const RFIFIND: &'static str = "01_RFIFIND";
    pub const BIRDIES: &'static str = "02_BIRDIES";
    pub const DEDISPERSION: &'static str = "03_DEDISPERSION";
    pub const SIFTING: &'static str = "04_SIFTING";
    pub const FOLDING: &'static str = "05_FOLDING";
    pub const SINGLEPULSE: &'static str = "06_SINGLEPULSE";
    pub const KNOWN_PULSARS: &'static str = "known_pulsars";
}

/// File names and suffixes shared by the stage builders and the sifter.
pub struct FileNames;

impl FileNames {
    pub const MARKER_EXT: &'static str = "ifok";
    pub const EMPTY_EXT: &'static str = "empty";
    pub const CANDLIST: &'static str = "best_candidates.siftedcands";
    /// Suffix of the per-mask info cache: `<mask stem>_mask_info.json`.
    pub const MASK_INFO_SUFFIX: &'static str = "_mask_info.json";
    pub const SIFT_STAGE: &'static str = "sifting";
}

// ---- Worker pool ----

/// Pool size bounds. Use [`WorkerLimits::current()`] to fill `all_threads` from rayon.
#[derive(Clone, Copy, Debug)]
pub struct WorkerLimits {
    pub all_threads: usize,
    pub floor: usize,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            all_threads: 0,
            floor: Self::FLOOR_THREADS,
        }
    }
}

impl WorkerLimits {
    pub const FLOOR_THREADS: usize = 1;

    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Requested size, or every available thread when unset; never below the floor.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.all_threads).max(self.floor)
    }
}

// ---- Search structure ----

/// Leftover-fraction thresholds for splitting a segment into chunks.
pub struct ChunkThresholds;

impl ChunkThresholds {
    /// A trailing piece at least this fraction of a chunk is kept as one more chunk.
    pub const KEEP_FRACTION: f64 = 0.80;
    /// Trailing pieces above this (and below KEEP) are dropped with a warning; below it, silently.
    pub const WARN_FRACTION: f64 = 0.10;
    /// A segment at least this fraction of the observation is redundant with "full".
    pub const REDUNDANT_SEGMENT_FRACTION: f64 = 0.80;
}

// ---- Disk budget ----

pub struct BudgetConsts;

impl BudgetConsts {
    /// Bytes per sample of a dedispersed time series (32-bit float).
    pub const BYTES_PER_SAMPLE: u64 = 4;
    /// Safety margin applied to the estimate.
    pub const MARGIN: f64 = 1.10;
}

// ---- RFI mask ----

pub struct MaskThresholds;

impl MaskThresholds {
    pub const WARN_FRACTION: f64 = 0.5;
    pub const FATAL_FRACTION: f64 = 0.95;
}

// ---- Sifting ----

/// Tolerances for duplicate and harmonic removal.
pub struct SiftTolerances;

impl SiftTolerances {
    /// Two frequencies within this many Fourier bins are the same signal.
    pub const DUPLICATE_BINS: f64 = 1.1;
    /// Harmonic ratio tolerance in Fourier bins.
    pub const HARMONIC_BINS: f64 = 2.0;
    /// DMs closer than this (pc cm^-3) count as similar for harmonic removal.
    pub const HARMONIC_DM_ABS: f64 = 1.0;
    /// Or closer than this fraction of the larger DM.
    pub const HARMONIC_DM_FRAC: f64 = 0.05;
}

// ---- Known pulsars ----

pub struct KnownPulsarConsts;

impl KnownPulsarConsts {
    /// Speed of light in m/s.
    pub const C: f64 = 299_792_458.0;
    /// Doppler tolerance for isolated pulsars (Earth's orbital motion).
    pub const ISOLATED_DOPPLER: f64 = 1e-4;
    /// Largest integer numerator in the harmonic sweep.
    pub const MAX_NUMERATOR: u32 = 16;
}

/// Log phrases that mark an rfifind run as broken even with a zero exit status.
pub const RFIFIND_FAILURE_PHRASES: &[&str] = &["problem with clipping", " inf "];
