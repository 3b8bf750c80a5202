//! Error types. Fatal precondition failures stop the run; task errors stay at the Task
//! boundary; parse errors are decided per record.

use std::path::PathBuf;
use thiserror::Error;

/// Preconditions that abort the run before any expensive work. Each carries a remedy hint.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("no input file matches '{0}'")]
    NoInputs(String),

    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("input file is empty: {0}")]
    EmptyInput(PathBuf),

    #[error(
        "not enough disk space in {dir}: need {required_gb:.2} GB (incl. margin), {available_gb:.2} GB free"
    )]
    InsufficientDisk {
        dir: PathBuf,
        required_gb: f64,
        available_gb: f64,
    },

    #[error("coherent dedispersion DM is negative ({0})")]
    NegativeCoherentDm(f64),

    #[error("RFI mask zaps {:.1}% of the channels", .0 * 100.0)]
    MaskedFractionTooHigh(f64),

    #[error("RFI mask not found: {0}")]
    MissingMask(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FatalError {
    /// One-line remediation shown before exiting.
    pub fn remedy(&self) -> &'static str {
        match self {
            FatalError::NoInputs(_) | FatalError::MissingInput(_) => {
                "check the observation path or glob passed on the command line"
            }
            FatalError::EmptyInput(_) => "the file has zero bytes; re-copy or re-download it",
            FatalError::InsufficientDisk { .. } => {
                "free some space, or set remove_fft_files / remove_segment_dat_files under [resources]"
            }
            FatalError::NegativeCoherentDm(_) => {
                "set [dedispersion] coherent_dm to 0 (disabled) or a positive value"
            }
            FatalError::MaskedFractionTooHigh(_) => {
                "the data is dominated by RFI; inspect the rfifind plots or adjust the mask parameters"
            }
            FatalError::MissingMask(_) => "set [resources] rfi_mask to an existing mask or leave it empty",
            FatalError::InvalidConfig(_) => "fix the configuration file and rerun",
        }
    }
}

/// Failure of one Task. Recoverable: the marker is not written so a later run retries.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("command exited with status {0}")]
    NonZeroExit(i32),

    #[error("command was terminated by a signal")]
    Killed,

    #[error("expected output missing: {0}")]
    MissingOutput(PathBuf),

    #[error("expected output is empty: {0}")]
    EmptyOutput(PathBuf),

    #[error("log reports a known failure: '{0}'")]
    KnownFailure(String),
}

impl TaskError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TaskError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Parsing of result files and the candidate list.
#[derive(Debug, Error)]
pub enum ParseError {
    /// One bad record; the caller skips it and keeps going.
    #[error("{file}:{line}: malformed record: {reason}")]
    MalformedRecord {
        file: String,
        line: usize,
        reason: String,
    },

    /// The file itself could not be read; the whole stage is aborted.
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}: no header row")]
    MissingHeader(String),

    #[error("{file}: missing column '{column}'")]
    MissingColumn { file: String, column: String },

    #[error("{file}: missing key '{key}'")]
    MissingKey { file: String, key: String },
}

/// Dedispersion planning.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("coherent dedispersion DM is negative ({0})")]
    NegativeCoherentDm(f64),

    #[error("planner report has no scheme table")]
    MissingTable,

    #[error("planner row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("invalid DM step [{lo}, {hi}, {step}]")]
    InvalidStep { lo: f64, hi: f64, step: f64 },

    #[error("maximum DMs per call must be positive")]
    ZeroCap,
}

impl From<PlanError> for FatalError {
    fn from(e: PlanError) -> Self {
        match e {
            PlanError::NegativeCoherentDm(dm) => FatalError::NegativeCoherentDm(dm),
            other => FatalError::InvalidConfig(other.to_string()),
        }
    }
}
