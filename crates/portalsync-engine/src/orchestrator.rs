//! Per-service orchestration.
//!
//! A service pass walks a fixed phase plan. Feature services with data
//! rebuild go Extracting, Rewiring, Publishing; everything else only
//! publishes. Extraction fully completes before rewiring starts. Worker
//! failures downgrade the pass to partial; any phase error is a hard
//! failure. A vector tile service gets exactly one more pass after a hard
//! failure. Feature services never re-run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use portalsync_replica::ReplicaStore;
use portalsync_types::{ActiveRun, ResultCode, ServiceKind, ServiceRun};

use crate::artifact::ArtifactBuilder;
use crate::config::parser::parse_service;
use crate::config::types::ServiceDefinition;
use crate::config::validator::validate_service;
use crate::credentials::CredentialTable;
use crate::errors::ServiceError;
use crate::extraction::{run_extraction, ExtractionContext};
use crate::portal::PortalConnector;
use crate::project::{layer_ids, read_layers, ProjectResource};
use crate::publish::{PublishRequest, Publisher};
use crate::registry::ConnectionRegistry;
use crate::report::{RunReporter, ServiceLog};
use crate::result::{InvalidDefinition, PipelineResult, RecordedRun};
use crate::retry::RetryPolicy;
use crate::rewiring::{run_rewiring, RewiringContext};

const WORKING_COPY_SUFFIX: &str = ".project.json";
const CONTAINER_DIR_SUFFIX: &str = "_data";

/// External systems the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub projects: Arc<dyn ProjectResource>,
    pub replicas: Arc<dyn ReplicaStore>,
    pub artifacts: Arc<dyn ArtifactBuilder>,
    pub portals: Arc<dyn PortalConnector>,
}

/// Batch-wide settings every service pass uses.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub rebuild_data: bool,
    /// Working copies, replica containers and artifacts live here.
    pub data_dir: PathBuf,
    /// `MM_DD_YYYY`, stamped into artifact and log names.
    pub date_stamp: String,
    pub credentials: Arc<CredentialTable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    Extracting,
    Rewiring,
    Publishing,
}

impl ServicePhase {
    /// Phases a pass of a `kind` service walks through, in order.
    #[must_use]
    pub fn plan(kind: ServiceKind, rebuild_data: bool) -> &'static [ServicePhase] {
        match (kind, rebuild_data) {
            (ServiceKind::Feature, true) => &[Self::Extracting, Self::Rewiring, Self::Publishing],
            (ServiceKind::Feature, false) | (ServiceKind::VectorTile, _) => &[Self::Publishing],
        }
    }
}

impl std::fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Extracting => "extracting",
            Self::Rewiring => "rewiring",
            Self::Publishing => "publishing",
        })
    }
}

/// Whether a pass that ended with `code` is run a second time. Only tile
/// services re-run, and only after a hard failure.
#[must_use]
pub fn reruns_after(kind: ServiceKind, code: ResultCode) -> bool {
    kind == ServiceKind::VectorTile && code.is_hard_failure()
}

/// Load and validate one service definition. A relative `project` path is
/// resolved against the definition file's directory.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or fails validation.
pub fn load_definition(path: &Path) -> anyhow::Result<ServiceDefinition> {
    let mut definition = parse_service(path)?;
    validate_service(&definition)?;
    if definition.project.is_relative() {
        if let Some(dir) = path.parent() {
            definition.project = dir.join(&definition.project);
        }
    }
    Ok(definition)
}

pub struct ServicePublishOrchestrator {
    collaborators: Collaborators,
    settings: OrchestratorSettings,
    publisher: Arc<Publisher>,
}

impl ServicePublishOrchestrator {
    #[must_use]
    pub fn new(collaborators: Collaborators, settings: OrchestratorSettings) -> Self {
        let publisher = Arc::new(Publisher::new(
            Arc::clone(&collaborators.artifacts),
            Arc::clone(&collaborators.portals),
            settings.retry,
        ));
        Self {
            collaborators,
            settings,
            publisher,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Rewired copy of the service's project.
    #[must_use]
    pub fn working_copy(&self, def: &ServiceDefinition) -> PathBuf {
        self.settings
            .data_dir
            .join(format!("{}{WORKING_COPY_SUFFIX}", def.service_name))
    }

    /// Directory holding the service's replica containers.
    #[must_use]
    pub fn container_dir(&self, def: &ServiceDefinition) -> PathBuf {
        self.settings
            .data_dir
            .join(format!("{}{CONTAINER_DIR_SUFFIX}", def.service_name))
    }

    /// Run every definition in `paths` in order, one service at a time.
    pub async fn run_definitions(&self, paths: &[PathBuf], reporter: &RunReporter) -> PipelineResult {
        let started = std::time::Instant::now();
        let mut result = PipelineResult::default();

        for path in paths {
            let definition = match load_definition(path) {
                Ok(definition) => definition,
                Err(e) => {
                    tracing::error!(definition = %path.display(), error = format!("{e:#}"), "Invalid service definition");
                    reporter.summary(format!("ERROR: invalid definition {}: {e:#}", path.display()));
                    result.invalid_definitions.push(InvalidDefinition {
                        path: path.clone(),
                        error: format!("{e:#}"),
                    });
                    continue;
                }
            };

            let log = reporter.service_log(&definition.service_name);
            reporter.summary(format!(
                "Starting {} ({})",
                definition.service_name, definition.service_kind
            ));
            let run = self.run_service(&definition, &log).await;
            let recorded = RecordedRun {
                run,
                log: log.path().to_path_buf(),
            };
            reporter.record_run(&recorded);
            result.record(recorded);
        }

        result.elapsed = started.elapsed();
        result
    }

    /// Run one service under its kind's re-run policy. The returned run is
    /// finished exactly once.
    pub async fn run_service(&self, def: &ServiceDefinition, log: &ServiceLog) -> ServiceRun {
        let active = ActiveRun::start(&def.service_name, def.service_kind);
        let mut code = self.run_pass(def, log).await;

        if reruns_after(def.service_kind, code) {
            tracing::warn!(service = def.service_name, "Hard failure, re-running tile service once");
            log.line("Retrying due to failed run.");
            code = self.run_pass(def, log).await;
        }

        let run = active.finish(code);
        tracing::info!(
            service = run.name,
            kind = %run.kind,
            code = run.code.as_i32(),
            elapsed_secs = run.elapsed.as_secs_f64(),
            "Service run finished"
        );
        run
    }

    async fn run_pass(&self, def: &ServiceDefinition, log: &ServiceLog) -> ResultCode {
        match self.try_pass(def, log).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!(service = def.service_name, error = format!("{e:#}"), "Service pass failed");
                log.line(format!("ERROR: {e:#}"));
                ResultCode::HardFailure
            }
        }
    }

    async fn try_pass(
        &self,
        def: &ServiceDefinition,
        log: &ServiceLog,
    ) -> Result<ResultCode, ServiceError> {
        let mut code = ResultCode::Success;
        let mut registry: Option<Arc<ConnectionRegistry>> = None;
        let working = self.working_copy(def);

        for phase in ServicePhase::plan(def.service_kind, self.settings.rebuild_data) {
            tracing::info!(service = def.service_name, %phase, "Entering phase");
            log.line(format!("{} {}", capitalize(phase), def.service_name));

            match phase {
                ServicePhase::Extracting => {
                    self.prepare_working_copy(def, &working)?;
                    let layers = read_layers(self.collaborators.projects.as_ref(), &working)?;
                    let shared = Arc::new(ConnectionRegistry::new());
                    let report = run_extraction(
                        ExtractionContext {
                            service_name: def.service_name.clone(),
                            container_dir: self.container_dir(def),
                            layers: Arc::new(layers),
                            credentials: Arc::clone(&self.settings.credentials),
                            replicas: Arc::clone(&self.collaborators.replicas),
                            registry: Arc::clone(&shared),
                        },
                        self.settings.workers,
                    )
                    .await;
                    log.line(format!(
                        "Extraction: {} extracted, {} skipped, {} failed",
                        report.handled(),
                        report.skipped(),
                        report.failures()
                    ));
                    code = code.worst(report.result_code());
                    registry = Some(shared);
                }
                ServicePhase::Rewiring => {
                    let entries = registry
                        .as_ref()
                        .map(|r| r.snapshot())
                        .unwrap_or_default();
                    let ids = layer_ids(self.collaborators.projects.as_ref(), &working)?;
                    let report = run_rewiring(
                        RewiringContext {
                            project_path: working.clone(),
                            projects: Arc::clone(&self.collaborators.projects),
                            layer_ids: ids,
                            entries,
                        },
                        self.settings.workers,
                    )
                    .await;
                    log.line(format!(
                        "Rewiring: {} repointed, {} skipped, {} failed",
                        report.handled(),
                        report.skipped(),
                        report.failures()
                    ));
                    code = code.worst(report.result_code());
                }
                ServicePhase::Publishing => {
                    let request = PublishRequest {
                        definition: def.clone(),
                        project: self.publish_source(def, &working),
                        artifact_dir: self.settings.data_dir.clone(),
                        date_stamp: self.settings.date_stamp.clone(),
                        reuse_artifact: def.service_kind == ServiceKind::Feature
                            && !self.settings.rebuild_data,
                    };
                    let publisher = Arc::clone(&self.publisher);
                    let outcome = tokio::task::spawn_blocking(move || publisher.publish(&request))
                        .await
                        .map_err(|e| ServiceError::Join(e.to_string()))??;
                    log.line(format!(
                        "Published {} ({}) at {}",
                        outcome.service.title, outcome.service.item_type, outcome.service.url
                    ));
                    if let Some(style) = &outcome.style {
                        log.line(format!("Style resource {} at {}", style.title, style.url));
                    }
                }
            }
        }

        log.line(format!("Finished {} with result {code}", def.service_name));
        Ok(code)
    }

    /// Fresh working copy of the source project and an empty container
    /// directory.
    fn prepare_working_copy(&self, def: &ServiceDefinition, working: &Path) -> Result<(), ServiceError> {
        let prepare_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ServiceError::Prepare { path, source }
        };

        std::fs::create_dir_all(&self.settings.data_dir)
            .map_err(prepare_err(&self.settings.data_dir))?;
        std::fs::copy(&def.project, working).map_err(prepare_err(&def.project))?;

        let containers = self.container_dir(def);
        if containers.exists() {
            std::fs::remove_dir_all(&containers).map_err(prepare_err(&containers))?;
        }
        std::fs::create_dir_all(&containers).map_err(prepare_err(&containers))?;
        Ok(())
    }

    /// Project the artifact is built from.
    fn publish_source(&self, def: &ServiceDefinition, working: &Path) -> PathBuf {
        match def.service_kind {
            ServiceKind::VectorTile => def.project.clone(),
            ServiceKind::Feature if self.settings.rebuild_data || working.exists() => {
                working.to_path_buf()
            }
            ServiceKind::Feature => {
                tracing::warn!(
                    service = def.service_name,
                    working = %working.display(),
                    "No working copy, publishing from source project"
                );
                def.project.clone()
            }
        }
    }
}

fn capitalize(phase: &ServicePhase) -> String {
    let name = phase.to_string();
    let mut chars = name.chars();
    chars
        .next()
        .map(|first| first.to_ascii_uppercase().to_string() + chars.as_str())
        .unwrap_or_default()
}
