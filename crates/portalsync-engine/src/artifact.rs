//! Publishable artifact building.
//!
//! Feature services are packaged as service definitions (`.sd`), vector tile
//! services as tile packages (`.vtpk`). File names carry the batch date:
//! `<service>_<MM_DD_YYYY>.<ext>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use portalsync_types::{Layer, ServiceKind};
use serde::Serialize;

use crate::project::{read_layers, ProjectError, ProjectResource};

/// Packaging parameters shared by both artifact kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct PackagingOptions {
    pub kind: ServiceKind,
    pub service_name: String,
    /// Dated artifact title, also the file stem.
    pub title: String,
    pub tags: String,
    pub description: String,
    pub allow_exporting: bool,
    pub folder: Option<String>,
    pub max_cached_scale: Option<f64>,
}

/// A built artifact on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub title: String,
    pub kind: ServiceKind,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error("cannot write artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode artifact: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("project {} has no layers to package", .0.display())]
    EmptyProject(PathBuf),
}

/// File extension for an artifact of `kind`.
#[must_use]
pub fn artifact_extension(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Feature => "sd",
        ServiceKind::VectorTile => "vtpk",
    }
}

/// `<service>_<date>`, the title every artifact and staged item carries.
#[must_use]
pub fn artifact_title(service_name: &str, date_stamp: &str) -> String {
    format!("{service_name}_{date_stamp}")
}

/// Packages a project into a publishable artifact.
pub trait ArtifactBuilder: Send + Sync {
    /// Build an artifact from the project at `project` into `output`,
    /// replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the project cannot be read or the artifact
    /// cannot be written.
    fn build(
        &self,
        project: &Path,
        output: &Path,
        options: &PackagingOptions,
    ) -> Result<Artifact, BuildError>;
}

#[derive(Serialize)]
struct Snapshot<'a> {
    title: &'a str,
    service_name: &'a str,
    kind: ServiceKind,
    tags: Vec<&'a str>,
    description: &'a str,
    allow_exporting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_cached_scale: Option<f64>,
    layers: &'a [Layer],
}

/// Writes a JSON snapshot of the project's layers as the artifact body.
pub struct SnapshotArtifactBuilder {
    projects: Arc<dyn ProjectResource>,
}

impl SnapshotArtifactBuilder {
    #[must_use]
    pub fn new(projects: Arc<dyn ProjectResource>) -> Self {
        Self { projects }
    }
}

impl ArtifactBuilder for SnapshotArtifactBuilder {
    fn build(
        &self,
        project: &Path,
        output: &Path,
        options: &PackagingOptions,
    ) -> Result<Artifact, BuildError> {
        let layers = read_layers(self.projects.as_ref(), project)?;
        if layers.is_empty() {
            return Err(BuildError::EmptyProject(project.to_path_buf()));
        }

        let snapshot = Snapshot {
            title: &options.title,
            service_name: &options.service_name,
            kind: options.kind,
            tags: options
                .tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect(),
            description: &options.description,
            allow_exporting: options.allow_exporting,
            max_cached_scale: options.max_cached_scale,
            layers: &layers,
        };
        let body = serde_json::to_vec_pretty(&snapshot)?;

        let io_err = |source| BuildError::Io {
            path: output.to_path_buf(),
            source,
        };
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(output, body).map_err(io_err)?;

        tracing::info!(
            artifact = %output.display(),
            kind = %options.kind,
            layers = layers.len(),
            "Artifact built"
        );
        Ok(Artifact {
            path: output.to_path_buf(),
            title: options.title.clone(),
            kind: options.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::JsonProjectResource;

    fn options(kind: ServiceKind) -> PackagingOptions {
        PackagingOptions {
            kind,
            service_name: "Roads".into(),
            title: artifact_title("Roads", "10_19_2026"),
            tags: "roads, transport,".into(),
            description: "Road centrelines".into(),
            allow_exporting: false,
            folder: None,
            max_cached_scale: None,
        }
    }

    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn ArtifactBuilder) {}
    }

    #[test]
    fn names_follow_kind_and_date() {
        assert_eq!(artifact_title("Roads", "10_19_2026"), "Roads_10_19_2026");
        assert_eq!(artifact_extension(ServiceKind::Feature), "sd");
        assert_eq!(artifact_extension(ServiceKind::VectorTile), "vtpk");
    }

    #[test]
    fn builds_snapshot_of_project_layers() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("roads.project.json");
        std::fs::write(
            &project,
            r#"{"name": "Roads", "layers": [{"id": "a", "name": "Roads", "is_feature": true}]}"#,
        )
        .unwrap();
        let output = dir.path().join("out").join("Roads_10_19_2026.sd");

        let builder = SnapshotArtifactBuilder::new(Arc::new(JsonProjectResource));
        let artifact = builder
            .build(&project, &output, &options(ServiceKind::Feature))
            .unwrap();

        assert_eq!(artifact.title, "Roads_10_19_2026");
        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(body["kind"], "feature");
        assert_eq!(body["tags"], serde_json::json!(["roads", "transport"]));
        assert_eq!(body["layers"][0]["id"], "a");
    }

    #[test]
    fn empty_project_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("empty.project.json");
        std::fs::write(&project, r#"{"name": "Empty"}"#).unwrap();
        let builder = SnapshotArtifactBuilder::new(Arc::new(JsonProjectResource));
        let err = builder
            .build(&project, &dir.path().join("x.vtpk"), &options(ServiceKind::VectorTile))
            .unwrap_err();
        assert!(matches!(err, BuildError::EmptyProject(_)));
    }
}
