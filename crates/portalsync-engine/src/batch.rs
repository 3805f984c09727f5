//! Batch entry point: one target directory, one deployment config, every
//! service definition under `list/`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use portalsync_replica::SqliteReplicaStore;

use crate::artifact::SnapshotArtifactBuilder;
use crate::config::types::DeploymentConfig;
use crate::config::validator::validate_deployment;
use crate::credentials::CredentialTable;
use crate::errors::BatchError;
use crate::orchestrator::{Collaborators, OrchestratorSettings, ServicePublishOrchestrator};
use crate::portal::{LocalPortal, LocalPortalConnector};
use crate::project::JsonProjectResource;
use crate::report::{today_stamp, Notifier, ReportLabels, RunReporter};
use crate::result::PipelineResult;
use crate::workspace::BatchWorkspace;

const DEFAULT_CATALOGUE: &str = "portal.json";

/// Credentials directory from `config`, relative paths resolved against
/// `target`.
#[must_use]
pub fn credentials_dir(target: &Path, config: &DeploymentConfig) -> PathBuf {
    let dir = &config.credentials.directory;
    if dir.is_relative() {
        target.join(dir)
    } else {
        dir.clone()
    }
}

/// File-backed collaborators: JSON projects, SQLite replicas, snapshot
/// artifacts and a local portal catalogue.
///
/// # Errors
///
/// Returns [`BatchError::FatalConfiguration`] if the portal catalogue cannot
/// be opened.
pub fn local_collaborators(
    target: &Path,
    config: &DeploymentConfig,
) -> Result<Collaborators, BatchError> {
    let projects = Arc::new(JsonProjectResource::new());
    let catalogue = config
        .portal
        .catalogue
        .as_ref()
        .map_or_else(|| target.join(DEFAULT_CATALOGUE), |p| target.join(p));
    let portal = LocalPortal::open(&catalogue, format!("file://{}", catalogue.display()))
        .with_context(|| format!("cannot open portal catalogue {}", catalogue.display()))
        .map_err(BatchError::FatalConfiguration)?;

    Ok(Collaborators {
        projects: projects.clone(),
        replicas: Arc::new(SqliteReplicaStore::new(credentials_dir(target, config))),
        artifacts: Arc::new(SnapshotArtifactBuilder::new(projects)),
        portals: Arc::new(LocalPortalConnector::new(Arc::new(portal))),
    })
}

/// Run every service definition under `target/list` and report the outcome.
///
/// Services run one at a time. A failing service never stops the batch;
/// only a fatal configuration problem does, before any service starts.
///
/// # Errors
///
/// Returns [`BatchError::FatalConfiguration`] if the target, deployment
/// config or workspace layout is unusable.
pub async fn run_batch(
    target: &Path,
    config: &DeploymentConfig,
    collaborators: Collaborators,
    notifier: Arc<dyn Notifier>,
) -> Result<PipelineResult, BatchError> {
    if !target.is_dir() {
        return Err(BatchError::fatal(format!(
            "target {} is not a directory",
            target.display()
        )));
    }
    validate_deployment(config).map_err(BatchError::FatalConfiguration)?;

    let credentials = credentials_dir(target, config);
    if !credentials.is_dir() {
        return Err(BatchError::fatal(format!(
            "credentials directory {} does not exist",
            credentials.display()
        )));
    }

    let workspace = BatchWorkspace::new(target);
    workspace
        .prepare(config.rebuild_data)
        .with_context(|| format!("cannot prepare workspace {}", target.display()))
        .map_err(BatchError::FatalConfiguration)?;
    let definitions = workspace
        .service_definitions()
        .with_context(|| format!("cannot list {}", workspace.list_dir().display()))
        .map_err(BatchError::FatalConfiguration)?;

    let labels = ReportLabels {
        portal: config
            .portal
            .name
            .clone()
            .unwrap_or_else(|| workspace.portal_label()),
        folder: config
            .portal
            .folder
            .clone()
            .unwrap_or_else(|| workspace.folder_label()),
    };
    let date_stamp = today_stamp();
    let reporter = RunReporter::new(
        labels,
        date_stamp.clone(),
        &workspace.log_dir(),
        workspace.temp_dir(),
        config.notifications.clone(),
        notifier,
    );

    let workers = config.resources.parallelism.worker_count();
    tracing::info!(
        batch = %target.display(),
        definitions = definitions.len(),
        workers,
        rebuild_data = config.rebuild_data,
        "Starting batch"
    );
    reporter.summary(format!(
        "Starting batch for {} with {} definition(s), {workers} worker(s)",
        target.display(),
        definitions.len()
    ));

    let orchestrator = ServicePublishOrchestrator::new(
        collaborators,
        OrchestratorSettings {
            workers,
            retry: config.resources.retry.policy(),
            rebuild_data: config.rebuild_data,
            data_dir: workspace.data_dir(),
            date_stamp,
            credentials: Arc::new(CredentialTable::new(config.credentials.rules.clone())),
        },
    );
    let result = orchestrator.run_definitions(&definitions, &reporter).await;

    let sent = reporter.notify(&result);
    reporter.finish(&result);
    if let Err(e) = workspace.cleanup() {
        tracing::warn!(error = %e, "Failed to remove temporary logs");
    }

    tracing::info!(
        succeeded = result.succeeded.len(),
        failed = result.failed.len(),
        invalid = result.invalid_definitions.len(),
        notifications = sent,
        elapsed_secs = result.elapsed.as_secs_f64(),
        "Batch finished"
    );
    Ok(result)
}
