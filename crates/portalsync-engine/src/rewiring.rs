//! Parallel rewiring of project layers onto their local replicas.
//!
//! The registry snapshot is split into contiguous slices, one per worker.
//! Every layer update opens the working copy fresh, rewrites one binding,
//! saves and closes, all under the [`ProjectGate`] so no two workers ever
//! hold the project at once.

use std::path::PathBuf;
use std::sync::Arc;

use portalsync_types::{ConnectionDescriptor, LayerId};

use crate::partition::contiguous_range;
use crate::pool::run_pool;
use crate::project::{ProjectError, ProjectGate, ProjectHandle, ProjectResource};
use crate::registry::RegistryEntry;
use crate::result::{PoolReport, WorkerReport};

pub struct RewiringContext {
    pub project_path: PathBuf,
    pub projects: Arc<dyn ProjectResource>,
    /// Layer ids of the working copy, read before partitioning.
    pub layer_ids: Vec<LayerId>,
    /// Registry snapshot, ordered by key.
    pub entries: Vec<(String, RegistryEntry)>,
}

/// What happened to one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewireOutcome {
    Repointed,
    /// Rewritten, but the layer does not resolve to the expected dataset.
    Mismatch { expected: String, actual: Option<String> },
    /// The fresh layer is not a credentialed remote binding; left untouched.
    NotRemote,
}

/// Repoint every registry entry using `workers` workers.
///
/// Returns once all workers have finished.
pub async fn run_rewiring(ctx: RewiringContext, workers: usize) -> PoolReport {
    let workers = workers.max(1);
    tracing::info!(
        project = %ctx.project_path.display(),
        entries = ctx.entries.len(),
        workers,
        "Starting rewiring"
    );
    let gate = ProjectGate::new(Arc::clone(&ctx.projects), ctx.project_path.clone(), workers);
    let shared = Arc::new((ctx, gate));
    run_pool("rewiring", workers, move |worker| {
        let (ctx, gate) = shared.as_ref();
        rewire_slice(ctx, gate, workers, worker)
    })
    .await
}

fn rewire_slice(
    ctx: &RewiringContext,
    gate: &ProjectGate,
    workers: usize,
    worker: usize,
) -> WorkerReport {
    let mut report = WorkerReport::new(worker);

    for (key, entry) in &ctx.entries[contiguous_range(ctx.entries.len(), workers, worker)] {
        let Some(index) = ctx.layer_ids.iter().position(|id| *id == entry.layer) else {
            tracing::warn!(layer = %entry.layer, table = key, "Layer is invalid, not in project");
            report.skipped += 1;
            continue;
        };

        let old = ConnectionDescriptor::Remote(entry.old.clone());
        let new = ConnectionDescriptor::Local(entry.new.clone());
        match gate.with_exclusive(|handle| rewire_layer(handle, index, &old, &new)) {
            Ok(RewireOutcome::Repointed) => {
                tracing::info!(layer = %entry.layer, table = key, "Layer repointed to local replica");
                report.handled += 1;
            }
            Ok(RewireOutcome::Mismatch { expected, actual }) => {
                tracing::warn!(
                    layer = %entry.layer,
                    expected,
                    actual = actual.as_deref().unwrap_or("<none>"),
                    "POTENTIAL ERROR: layer does not resolve to its replica"
                );
                report.handled += 1;
            }
            Ok(RewireOutcome::NotRemote) => {
                tracing::info!(layer = %entry.layer, "Skipped repoint, layer has no account binding");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::error!(layer = %entry.layer, table = key, error = %e, "Rewiring failed");
                report.failures += 1;
            }
        }
    }

    tracing::info!(
        worker,
        handled = report.handled,
        skipped = report.skipped,
        failures = report.failures,
        "Rewiring worker finished"
    );
    report
}

/// Rewrite one layer of an open project and save it.
///
/// # Errors
///
/// Returns [`ProjectError`] if the layer is gone or the project cannot be saved.
pub fn rewire_layer(
    handle: &mut dyn ProjectHandle,
    index: usize,
    old: &ConnectionDescriptor,
    new: &ConnectionDescriptor,
) -> Result<RewireOutcome, ProjectError> {
    let len = handle.list_layers().len();
    let layer = handle
        .list_layers()
        .get(index)
        .ok_or(ProjectError::LayerIndex { index, len })?;
    let has_account = layer
        .connection
        .as_ref()
        .and_then(ConnectionDescriptor::as_remote)
        .is_some_and(|r| r.account.is_some());

    let outcome = if has_account {
        handle.rewrite_binding(index, old, new)?;
        handle.clear_row_filter(index)?;
        let actual = handle
            .list_layers()
            .get(index)
            .and_then(|l| l.connection.as_ref())
            .map(|c| c.dataset_name().to_string());
        let expected = new.dataset_name().to_string();
        if actual.as_deref() == Some(expected.as_str()) {
            RewireOutcome::Repointed
        } else {
            RewireOutcome::Mismatch { expected, actual }
        }
    } else {
        RewireOutcome::NotRemote
    };

    handle.save()?;
    Ok(outcome)
}
