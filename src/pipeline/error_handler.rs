use anyhow::Result;
use log::{info, warn};

use crate::pipeline::context::ExecContext;
use crate::types::{TaskReport, TaskStatus};

/// Counts of one batch's outcomes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub skipped: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn from_reports(reports: &[TaskReport]) -> Self {
        let mut s = Self::default();
        for r in reports {
            match r.status {
                TaskStatus::Skipped => s.skipped += 1,
                TaskStatus::Succeeded => s.succeeded += 1,
                TaskStatus::SucceededEmpty => s.empty += 1,
                TaskStatus::Failed(_) => s.failed += 1,
                TaskStatus::Cancelled => s.cancelled += 1,
            }
        }
        s
    }

    /// Tasks that actually launched a process.
    pub fn executed(&self) -> usize {
        self.succeeded + self.empty + self.failed
    }
}

/// Log the batch outcome. Failures are listed individually only when verbose; their details
/// are in the per-task logs.
pub fn report_batch(name: &str, reports: &[TaskReport], verbose: bool) -> BatchSummary {
    let s = BatchSummary::from_reports(reports);
    if s.executed() > 0 || s.skipped > 0 {
        info!(
            "{name}: {} done, {} empty, {} already done, {} failed",
            s.succeeded, s.empty, s.skipped, s.failed
        );
    }
    if s.failed > 0 {
        warn!(
            "{name}: {} task(s) failed and will be retried on the next run",
            s.failed
        );
        if verbose {
            for r in reports {
                if let TaskStatus::Failed(msg) = &r.status {
                    eprintln!("  failed: {} ({msg})", r.key);
                }
            }
        }
    }
    s
}

/// Stop between stages once Ctrl+C was pressed. Completed work keeps its markers.
pub fn check_for_cancel(ctx: &ExecContext) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(anyhow::anyhow!(
            "Search interrupted by user; rerun the same command to resume"
        ));
    }
    Ok(())
}
