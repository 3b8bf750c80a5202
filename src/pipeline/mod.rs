//! Pipeline components: execution context, worker pool, stage Tasks, orchestration.

pub mod context;
pub mod error_handler;
pub mod mask;
pub mod orchestrator;
pub mod pool;
pub mod stages;

pub use context::ExecContext;
pub use error_handler::{BatchSummary, check_for_cancel, report_batch};
pub use orchestrator::{ObservationSummary, RunSummary, UnitSummary, run_search};
pub use pool::run_batch;
pub use stages::{StageBuilder, WorkLayout, header_task};
