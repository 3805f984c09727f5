//! Parallel extraction of remote layer data into local replicas.
//!
//! Layers are striped across workers. Each worker owns one replica container
//! (`<service>_<worker>`) for its whole lifetime, so workers never write to
//! the same container. Every successful extraction is recorded in the shared
//! [`ConnectionRegistry`] for the rewiring phase.

use std::path::PathBuf;
use std::sync::Arc;

use portalsync_replica::{ReplicaContainer, ReplicaStore, SourceTable};
use portalsync_types::{Layer, LocalDescriptor};

use crate::credentials::CredentialTable;
use crate::partition::stripe_indices;
use crate::pool::run_pool;
use crate::registry::{ConnectionRegistry, RegistryEntry};
use crate::result::{PoolReport, WorkerReport};

/// Everything the extraction workers share.
#[derive(Clone)]
pub struct ExtractionContext {
    pub service_name: String,
    /// Directory holding the per-worker containers.
    pub container_dir: PathBuf,
    pub layers: Arc<Vec<Layer>>,
    pub credentials: Arc<CredentialTable>,
    pub replicas: Arc<dyn ReplicaStore>,
    pub registry: Arc<ConnectionRegistry>,
}

/// Extract every eligible layer using `workers` workers.
///
/// Returns once all workers have finished. Failures are counted per worker;
/// a failed layer is never left in the registry.
pub async fn run_extraction(ctx: ExtractionContext, workers: usize) -> PoolReport {
    let workers = workers.max(1);
    tracing::info!(
        service = ctx.service_name,
        layers = ctx.layers.len(),
        workers,
        "Starting extraction"
    );
    let ctx = Arc::new(ctx);
    run_pool("extraction", workers, move |worker| {
        extract_shard(&ctx, workers, worker)
    })
    .await
}

fn extract_shard(ctx: &ExtractionContext, workers: usize, worker: usize) -> WorkerReport {
    let mut report = WorkerReport::new(worker);
    let container_name = format!("{}_{worker}", ctx.service_name);

    let container = match ctx
        .replicas
        .create_container(&ctx.container_dir, &container_name)
    {
        Ok(container) => container,
        Err(e) => {
            tracing::error!(
                service = ctx.service_name,
                worker,
                container = container_name,
                error = %e,
                "Failed to create replica container"
            );
            report.failures += 1;
            return report;
        }
    };

    for index in stripe_indices(ctx.layers.len(), workers, worker) {
        let layer = &ctx.layers[index];
        match extract_layer(ctx, layer, &container) {
            LayerOutcome::Extracted => report.handled += 1,
            LayerOutcome::Skipped => report.skipped += 1,
            LayerOutcome::Failed => report.failures += 1,
        }
    }

    tracing::info!(
        service = ctx.service_name,
        worker,
        handled = report.handled,
        skipped = report.skipped,
        failures = report.failures,
        "Extraction worker finished"
    );
    report
}

enum LayerOutcome {
    Extracted,
    Skipped,
    Failed,
}

fn extract_layer(ctx: &ExtractionContext, layer: &Layer, container: &ReplicaContainer) -> LayerOutcome {
    if let Err(reason) = layer.eligibility() {
        tracing::info!(layer = layer.name, "Skipping layer: {reason}");
        return LayerOutcome::Skipped;
    }
    let Some(remote) = layer.connection.as_ref().and_then(|c| c.as_remote()) else {
        return LayerOutcome::Skipped;
    };
    let Some(credential) = ctx.credentials.resolve(remote) else {
        tracing::warn!(
            layer = layer.name,
            dataset = remote.dataset,
            account = remote.account.as_deref().unwrap_or_default(),
            "No credential for layer source, skipping"
        );
        return LayerOutcome::Skipped;
    };

    let entry = RegistryEntry {
        old: remote.clone(),
        new: LocalDescriptor {
            database: container.path.clone(),
            dataset: String::new(),
        },
        layer: layer.id.clone(),
    };
    let key = ctx.registry.register(remote.leaf_name(), entry);

    let source = SourceTable {
        credential: credential.clone(),
        dataset: remote.dataset.clone(),
    };
    match ctx
        .replicas
        .extract_rows(&source, container, &key, layer.active_row_filter())
    {
        Ok(rows) => {
            tracing::info!(
                layer = layer.name,
                dataset = remote.dataset,
                table = key,
                container = container.name,
                rows,
                "Layer extracted to local replica"
            );
            LayerOutcome::Extracted
        }
        Err(e) => {
            ctx.registry.withdraw(&key);
            tracing::error!(
                layer = layer.name,
                dataset = remote.dataset,
                error = %e,
                "Layer extraction failed"
            );
            LayerOutcome::Failed
        }
    }
}
