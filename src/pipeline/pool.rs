//! Bounded worker pool over a list of Tasks.
//!
//! K workers pull task indices from one queue and block on their child process. Completion
//! order is not dispatch order. A batch never aborts on a failed Task: the failure goes to
//! `on_error` and dispatch continues. Stages that must follow each other are separate calls.

use crossbeam_channel::{bounded, unbounded};
use log::debug;
use std::thread;

use crate::engine::progress::{batch_bar, finish_progress_bar, update_progress_bar};
use crate::pipeline::context::ExecContext;
use crate::task::{Task, execute_task};
use crate::types::{TaskReport, TaskStatus};

/// Run `tasks` with at most `concurrency` at a time and return one report per Task, in
/// submission order.
///
/// Once the cancel flag is set, Tasks not yet started report [`TaskStatus::Cancelled`];
/// children already running are left to finish.
pub fn run_batch<F>(
    name: &str,
    tasks: &[Task],
    concurrency: usize,
    ctx: &ExecContext,
    mut on_error: F,
) -> Vec<TaskReport>
where
    F: FnMut(&Task, &str),
{
    if tasks.is_empty() {
        return Vec::new();
    }
    let workers = concurrency.clamp(1, tasks.len());
    debug!("{name}: {} task(s) on {workers} worker(s)", tasks.len());

    let (job_tx, job_rx) = bounded::<usize>(tasks.len());
    let (done_tx, done_rx) = unbounded::<(usize, TaskStatus)>();
    for i in 0..tasks.len() {
        // Capacity equals the task count, so this never blocks.
        let _ = job_tx.send(i);
    }
    drop(job_tx);

    let bar = batch_bar(ctx.progress, tasks.len(), name);
    let mut statuses: Vec<Option<TaskStatus>> = vec![None; tasks.len()];

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                while let Ok(i) = job_rx.recv() {
                    let status = if ctx.is_cancelled() {
                        TaskStatus::Cancelled
                    } else {
                        execute_task(
                            &tasks[i],
                            ctx.markers.as_ref(),
                            ctx.runner.as_ref(),
                            &ctx.env,
                        )
                    };
                    if done_tx.send((i, status)).is_err() {
                        break;
                    }
                }
            });
        }
        // Workers hold the remaining senders; the loop below ends when they all exit.
        drop(done_tx);

        let mut finished = 0;
        while let Ok((i, status)) = done_rx.recv() {
            if let TaskStatus::Failed(msg) = &status {
                on_error(&tasks[i], msg);
            }
            statuses[i] = Some(status);
            finished += 1;
            if let Some(bar) = &bar {
                update_progress_bar(bar, 1);
            }
        }
        if let Some(bar) = &bar {
            finish_progress_bar(bar, finished);
        }
    });

    tasks
        .iter()
        .zip(statuses)
        .map(|(task, status)| TaskReport {
            key: task.key.to_string(),
            // A panicking worker re-panics out of the scope, so every slot is filled here.
            status: status.expect("every dispatched task reports a status"),
        })
        .collect()
}
