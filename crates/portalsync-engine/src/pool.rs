//! Fixed-size blocking worker pools.
//!
//! Workers run on the blocking thread pool since every collaborator call is
//! synchronous I/O. The pool returns only after every worker has joined,
//! which is the barrier between the extraction and rewiring phases.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::result::{PoolReport, WorkerReport};

/// Run `task(worker)` for every worker index in `0..workers` and wait for all
/// of them. A panicking worker is counted, never propagated.
pub(crate) async fn run_pool<F>(phase: &'static str, workers: usize, task: F) -> PoolReport
where
    F: Fn(usize) -> WorkerReport + Send + Sync + 'static,
{
    let workers = workers.max(1);
    let task = Arc::new(task);
    let mut join_set: JoinSet<WorkerReport> = JoinSet::new();
    for worker in 0..workers {
        let task = Arc::clone(&task);
        join_set.spawn_blocking(move || task(worker));
    }
    collect_worker_reports(phase, join_set).await
}

async fn collect_worker_reports(
    phase: &'static str,
    mut join_set: JoinSet<WorkerReport>,
) -> PoolReport {
    let mut report = PoolReport::default();

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(worker) => {
                if worker.failed() {
                    tracing::warn!(
                        phase,
                        worker = worker.worker,
                        failures = worker.failures,
                        "Worker finished with failures"
                    );
                }
                report.workers.push(worker);
            }
            Err(join_err) => {
                tracing::error!(phase, "Worker task panicked: {join_err}");
                report.panicked += 1;
            }
        }
    }

    report.workers.sort_by_key(|w| w.worker);
    tracing::info!(
        phase,
        workers = report.workers.len() + report.panicked,
        handled = report.handled(),
        skipped = report.skipped(),
        failures = report.failures(),
        "Worker pool complete"
    );
    report
}
