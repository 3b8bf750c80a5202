//! Execution context shared by every worker of a batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::task::{CommandRunner, MarkerStore};

/// Marker store, process runner, tool environment and the cancel flag.
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct ExecContext {
    pub markers: Arc<dyn MarkerStore>,
    pub runner: Arc<dyn CommandRunner>,
    pub env: Arc<Vec<(String, String)>>,
    pub cancel: Arc<AtomicBool>,
    /// Show a progress bar per batch.
    pub progress: bool,
    /// Log every failed Task, not only the batch summary.
    pub verbose: bool,
}

impl ExecContext {
    pub fn new(markers: Arc<dyn MarkerStore>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            markers,
            runner,
            env: Arc::new(Vec::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: false,
            verbose: false,
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = Arc::new(env);
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}
