use psrsieve::TaskError;
use psrsieve::TaskStatus;
use psrsieve::pipeline::{BatchSummary, ExecContext, check_for_cancel, report_batch, run_batch};
use psrsieve::task::{CommandRunner, MarkerKey, MarkerState, MemoryMarkerStore, Task};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Fails every command containing "bad"; tracks how many run at once.
#[derive(Default)]
struct CountingRunner {
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl CommandRunner for CountingRunner {
    fn run(
        &self,
        command: &str,
        _workdir: &Path,
        _env: &[(String, String)],
        _log: &File,
    ) -> Result<i32, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(if command.contains("bad") { 1 } else { 0 })
    }
}

fn tasks(dir: &Path, names: &[&str]) -> Vec<Task> {
    names
        .iter()
        .map(|n| {
            Task::new(
                MarkerKey::new("stage", *n),
                format!("run {n}"),
                dir,
                dir.join(format!("{n}.log")),
            )
        })
        .collect()
}

fn context(markers: Arc<MemoryMarkerStore>, runner: Arc<CountingRunner>) -> ExecContext {
    ExecContext::new(markers, runner)
}

// --- run_batch ---

#[test]
fn test_batch_reports_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let names = ["a", "b", "c", "d", "e", "f"];
    let list = tasks(dir.path(), &names);
    let markers = Arc::new(MemoryMarkerStore::new());
    let runner = Arc::new(CountingRunner::default());
    let ctx = context(markers.clone(), runner.clone());

    let reports = run_batch("test", &list, 3, &ctx, |_, _| {});
    let keys: Vec<String> = reports.iter().map(|r| r.key.clone()).collect();
    let expected: Vec<String> = names.iter().map(|n| format!("stage/{n}")).collect();
    assert_eq!(keys, expected);
    assert!(reports.iter().all(|r| r.status == TaskStatus::Succeeded));
    assert_eq!(markers.len(), names.len());
}

#[test]
fn test_concurrency_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let names: Vec<String> = (0..12).map(|i| format!("t{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let list = tasks(dir.path(), &refs);
    let runner = Arc::new(CountingRunner::default());
    let ctx = context(Arc::new(MemoryMarkerStore::new()), runner.clone());

    run_batch("bounded", &list, 3, &ctx, |_, _| {});
    assert!(runner.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 12);
}

#[test]
fn test_single_worker_runs_one_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let list = tasks(dir.path(), &["a", "b", "c"]);
    let runner = Arc::new(CountingRunner::default());
    let ctx = context(Arc::new(MemoryMarkerStore::new()), runner.clone());
    run_batch("serial", &list, 1, &ctx, |_, _| {});
    assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failures_do_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let list = tasks(dir.path(), &["good1", "bad1", "good2", "bad2", "good3"]);
    let markers = Arc::new(MemoryMarkerStore::new());
    let runner = Arc::new(CountingRunner::default());
    let ctx = context(markers.clone(), runner.clone());

    let mut failed = Vec::new();
    let reports = run_batch("mixed", &list, 2, &ctx, |task, _msg| {
        failed.push(task.key.unit.clone());
    });
    failed.sort();
    assert_eq!(failed, vec!["bad1", "bad2"]);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 5);

    let summary = BatchSummary::from_reports(&reports);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.cancelled, 0);
    assert_eq!(markers.len(), 3);
}

#[test]
fn test_second_run_executes_only_what_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let list = tasks(dir.path(), &["a", "b", "c", "d"]);
    let markers = Arc::new(MemoryMarkerStore::new());
    markers.insert(MarkerKey::new("stage", "b"), MarkerState::Done);
    let runner = Arc::new(CountingRunner::default());
    let ctx = context(markers.clone(), runner.clone());

    let first = run_batch("first", &list, 4, &ctx, |_, _| {});
    assert_eq!(first[1].status, TaskStatus::Skipped);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 3);

    let second = run_batch("second", &list, 4, &ctx, |_, _| {});
    assert!(second.iter().all(|r| r.status == TaskStatus::Skipped));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
    let summary = report_batch("second", &second, false);
    assert_eq!(summary.executed(), 0);
    assert_eq!(summary.skipped, 4);
}

#[test]
fn test_empty_batch() {
    let ctx = context(
        Arc::new(MemoryMarkerStore::new()),
        Arc::new(CountingRunner::default()),
    );
    assert!(run_batch("none", &[], 4, &ctx, |_, _| {}).is_empty());
}

struct PanickingRunner;

impl CommandRunner for PanickingRunner {
    fn run(
        &self,
        _command: &str,
        _workdir: &Path,
        _env: &[(String, String)],
        _log: &File,
    ) -> Result<i32, TaskError> {
        panic!("runner blew up");
    }
}

#[test]
#[should_panic]
fn test_worker_panic_propagates_out_of_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let list = tasks(dir.path(), &["a"]);
    let ctx = ExecContext::new(Arc::new(MemoryMarkerStore::new()), Arc::new(PanickingRunner));
    run_batch("panics", &list, 1, &ctx, |_, _| {});
}

// --- cancellation ---

#[test]
fn test_cancelled_batch_starts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let list = tasks(dir.path(), &["a", "b", "c"]);
    let markers = Arc::new(MemoryMarkerStore::new());
    let runner = Arc::new(CountingRunner::default());
    let ctx = context(markers.clone(), runner.clone());
    ctx.request_cancel();

    let reports = run_batch("cancelled", &list, 2, &ctx, |_, _| {});
    assert!(reports.iter().all(|r| r.status == TaskStatus::Cancelled));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    assert!(markers.is_empty());
    assert!(check_for_cancel(&ctx).is_err());
}

#[test]
fn test_check_for_cancel_passes_when_not_requested() {
    let ctx = context(
        Arc::new(MemoryMarkerStore::new()),
        Arc::new(CountingRunner::default()),
    );
    assert!(check_for_cancel(&ctx).is_ok());
}
