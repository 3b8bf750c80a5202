//! Resumable Task: one external command, its completion marker and its log.
//!
//! Pending → Skipped when the marker exists (nothing launched); otherwise Running →
//! Succeeded (marker written), SucceededEmpty (empty sentinel written) or Failed (nothing
//! written, so the next run retries).

pub mod log_scan;
pub mod marker;
pub mod runner;

pub use marker::{FsMarkerStore, MarkerKey, MarkerState, MarkerStore, MemoryMarkerStore};
pub use runner::{CommandRunner, ShellRunner, tool_env};

use log::debug;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::TaskError;
use crate::types::TaskStatus;

/// What must exist after a zero exit for the Task to count as done.
#[derive(Clone, Debug, Default)]
pub enum OutputPolicy {
    #[default]
    None,
    /// Every path must exist with non-zero length.
    Required(Vec<PathBuf>),
    /// Missing or empty outputs are a valid "nothing found" result: `sentinel` is written and
    /// the Task is marked done-empty.
    EmptyAllowed {
        outputs: Vec<PathBuf>,
        sentinel: PathBuf,
    },
}

#[derive(Clone, Debug)]
pub struct Task {
    pub key: MarkerKey,
    pub command: String,
    pub workdir: PathBuf,
    pub log: PathBuf,
    pub outputs: OutputPolicy,
    /// Phrases that mark the run failed when found in its log output.
    pub failure_phrases: Vec<String>,
}

impl Task {
    pub fn new(
        key: MarkerKey,
        command: impl Into<String>,
        workdir: impl Into<PathBuf>,
        log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            key,
            command: command.into(),
            workdir: workdir.into(),
            log: log.into(),
            outputs: OutputPolicy::None,
            failure_phrases: Vec::new(),
        }
    }

    pub fn with_outputs(mut self, outputs: OutputPolicy) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_failure_phrases<S: AsRef<str>>(mut self, phrases: &[S]) -> Self {
        self.failure_phrases = phrases.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }
}

/// Length of `path`, or `None` when it does not exist.
fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

pub const EMPTY_SENTINEL_TEXT: &str = "Ran successfully but produced no output.\n";

/// Run `task` unless its marker exists. Task-level errors are turned into
/// [`TaskStatus::Failed`] here and never propagate further.
pub fn execute_task(
    task: &Task,
    markers: &dyn MarkerStore,
    runner: &dyn CommandRunner,
    env: &[(String, String)],
) -> TaskStatus {
    if markers.exists(&task.key) {
        debug!("{}: marker present, skipping", task.key);
        return TaskStatus::Skipped;
    }
    match run_unmarked(task, markers, runner, env) {
        Ok(status) => status,
        Err(e) => {
            debug!("{}: {} (log: {})", task.key, e, task.log.display());
            TaskStatus::Failed(e.to_string())
        }
    }
}

fn run_unmarked(
    task: &Task,
    markers: &dyn MarkerStore,
    runner: &dyn CommandRunner,
    env: &[(String, String)],
) -> Result<TaskStatus, TaskError> {
    let mut log = log_scan::open_log(&task.log)?;
    let log_io = |e| TaskError::io(&task.log, e);
    let from = log.metadata().map_err(log_io)?.len();
    log_scan::write_header(&mut log, &task.command, &task.workdir).map_err(log_io)?;

    let started = Instant::now();
    let result = runner.run(&task.command, &task.workdir, env, &log);
    let exit_text = match &result {
        Ok(code) => code.to_string(),
        Err(e) => e.to_string(),
    };
    log_scan::write_footer(&mut log, started.elapsed(), &exit_text).map_err(log_io)?;
    drop(log);

    let code = result?;
    if code != 0 {
        return Err(TaskError::NonZeroExit(code));
    }
    if let Some(phrase) = log_scan::find_failure_phrase(&task.log, &task.failure_phrases, from)? {
        return Err(TaskError::KnownFailure(phrase));
    }

    match &task.outputs {
        OutputPolicy::None => {}
        OutputPolicy::Required(paths) => {
            for path in paths {
                match file_len(path) {
                    None => return Err(TaskError::MissingOutput(path.clone())),
                    Some(0) => return Err(TaskError::EmptyOutput(path.clone())),
                    Some(_) => {}
                }
            }
        }
        OutputPolicy::EmptyAllowed { outputs, sentinel } => {
            if outputs.iter().any(|p| file_len(p).unwrap_or(0) == 0) {
                std::fs::write(sentinel, EMPTY_SENTINEL_TEXT)
                    .map_err(|e| TaskError::io(sentinel, e))?;
                markers.mark_empty(&task.key, &task.command)?;
                return Ok(TaskStatus::SucceededEmpty);
            }
        }
    }

    markers.mark_done(&task.key, &task.command)?;
    Ok(TaskStatus::Succeeded)
}
