//! Pool and batch result types.

use std::path::PathBuf;
use std::time::Duration;

use portalsync_types::{ResultCode, ServiceRun};

/// Counts from one worker of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub handled: usize,
    pub skipped: usize,
    pub failures: usize,
}

impl WorkerReport {
    #[must_use]
    pub fn new(worker: usize) -> Self {
        Self {
            worker,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        self.failures > 0
    }
}

/// Outcome of one pool run. Available only after every worker has joined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub workers: Vec<WorkerReport>,
    /// Workers that panicked and produced no report.
    pub panicked: usize,
}

impl PoolReport {
    #[must_use]
    pub fn failed(&self) -> bool {
        self.panicked > 0 || self.workers.iter().any(WorkerReport::failed)
    }

    #[must_use]
    pub fn handled(&self) -> usize {
        self.workers.iter().map(|w| w.handled).sum()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.workers.iter().map(|w| w.skipped).sum()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.workers.iter().map(|w| w.failures).sum::<usize>() + self.panicked
    }

    /// Any worker failure downgrades the pass to [`ResultCode::Partial`].
    #[must_use]
    pub fn result_code(&self) -> ResultCode {
        if self.failed() {
            ResultCode::Partial
        } else {
            ResultCode::Success
        }
    }
}

/// A finished service run and where its diagnostic log lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub run: ServiceRun,
    pub log: PathBuf,
}

/// A service definition that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDefinition {
    pub path: PathBuf,
    pub error: String,
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    /// Succeeded runs in execution order.
    pub succeeded: Vec<RecordedRun>,
    pub failed: Vec<RecordedRun>,
    pub invalid_definitions: Vec<InvalidDefinition>,
    pub elapsed: Duration,
}

impl PipelineResult {
    pub fn record(&mut self, recorded: RecordedRun) {
        if recorded.run.succeeded() {
            self.succeeded.push(recorded);
        } else {
            self.failed.push(recorded);
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.invalid_definitions.is_empty()
    }

    #[must_use]
    pub fn total_runs(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}
