//! Progress bars for batches of Tasks.

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: String,
    pub animation: Animation,
}

impl ProgressBarConfig {
    pub fn new(total: usize, desc: impl Into<String>, animation: Animation) -> Self {
        Self {
            total,
            desc: desc.into(),
            animation,
        }
    }
}

pub fn create_progress_bar(config: ProgressBarConfig) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation,
        unit = " tasks"
    )))
}

/// Advance the bar by `n`. Skips the update when another thread holds the lock.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.update(n);
    }
}

/// Bring the bar to `done` of its total and print the final state.
pub fn finish_progress_bar(pb: &ProgressBar, done: usize) {
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.update_to(done);
        let _ = bar.refresh();
        eprintln!();
    }
}

/// Bar for a batch, only when progress display is on.
pub fn batch_bar(enabled: bool, total: usize, desc: &str) -> Option<ProgressBar> {
    (enabled && total > 0)
        .then(|| create_progress_bar(ProgressBarConfig::new(total, desc, Animation::Classic)))
}
