//! Project document access.
//!
//! A project is an ordered list of layers, each optionally bound to a data
//! source. [`ProjectResource`] opens a fresh [`ProjectHandle`] per use; the
//! handle is not shareable and must be closed after saving. [`ProjectGate`]
//! serializes every open-modify-save-close cycle when more than one worker
//! targets the same project file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use portalsync_types::{ConnectionDescriptor, Layer, LayerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("i/o error on project {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("project {} is not a valid project document: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("layer index {index} out of range ({len} layers)")]
    LayerIndex { index: usize, len: usize },

    /// The project is already open for writing elsewhere.
    #[error("project {} is locked by another writer", path.display())]
    Locked { path: PathBuf },
}

/// Opens project documents.
pub trait ProjectResource: Send + Sync {
    /// Open a fresh handle on the project at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError`] if the project cannot be read or parsed.
    fn open(&self, path: &Path) -> Result<Box<dyn ProjectHandle>, ProjectError>;
}

/// An open project. Changes are only persisted by [`ProjectHandle::save`].
pub trait ProjectHandle: Send {
    /// Layers in document order.
    fn list_layers(&self) -> &[Layer];

    /// Replace the binding of the layer at `index` if it currently equals
    /// `old`. Returns whether a replacement happened.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::LayerIndex`] for an unknown index.
    fn rewrite_binding(
        &mut self,
        index: usize,
        old: &ConnectionDescriptor,
        new: &ConnectionDescriptor,
    ) -> Result<bool, ProjectError>;

    /// # Errors
    ///
    /// Returns [`ProjectError::LayerIndex`] for an unknown index.
    fn clear_row_filter(&mut self, index: usize) -> Result<(), ProjectError>;

    /// # Errors
    ///
    /// Returns [`ProjectError`] if the document cannot be written.
    fn save(&mut self) -> Result<(), ProjectError>;

    /// Release the handle.
    fn close(self: Box<Self>);
}

/// Layer ids of the project at `path`, in document order.
///
/// # Errors
///
/// Returns [`ProjectError`] if the project cannot be opened.
pub fn layer_ids(resource: &dyn ProjectResource, path: &Path) -> Result<Vec<LayerId>, ProjectError> {
    let handle = resource.open(path)?;
    let ids = handle.list_layers().iter().map(|l| l.id.clone()).collect();
    handle.close();
    Ok(ids)
}

/// Layers of the project at `path`, in document order.
///
/// # Errors
///
/// Returns [`ProjectError`] if the project cannot be opened.
pub fn read_layers(resource: &dyn ProjectResource, path: &Path) -> Result<Vec<Layer>, ProjectError> {
    let handle = resource.open(path)?;
    let layers = handle.list_layers().to_vec();
    handle.close();
    Ok(layers)
}

/// Serializes open-modify-save-close cycles on one project file.
///
/// With a single worker there is nothing to serialize against, so no lock
/// is held.
pub struct ProjectGate {
    resource: Arc<dyn ProjectResource>,
    path: PathBuf,
    lock: Option<Mutex<()>>,
}

impl ProjectGate {
    #[must_use]
    pub fn new(resource: Arc<dyn ProjectResource>, path: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            resource,
            path: path.into(),
            lock: (workers > 1).then(|| Mutex::new(())),
        }
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.lock.is_some()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh handle, run `f` on it, and close it, all while holding
    /// the gate. The handle is closed whether or not `f` succeeds.
    ///
    /// # Errors
    ///
    /// Returns the open failure or whatever `f` returns.
    pub fn with_exclusive<R>(
        &self,
        f: impl FnOnce(&mut dyn ProjectHandle) -> Result<R, ProjectError>,
    ) -> Result<R, ProjectError> {
        // A panicking writer never saved, so the file on disk is still whole.
        let _guard = self
            .lock
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner));
        let mut handle = self.resource.open(&self.path)?;
        let result = f(handle.as_mut());
        handle.close();
        result
    }
}

// ---------------------------------------------------------------------------
// JSON project documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectDocument {
    name: String,
    #[serde(default)]
    layers: Vec<LayerRecord>,
}

/// On-disk layer. The data source stays a raw string so an unparseable
/// binding is carried through a save untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LayerRecord {
    id: LayerId,
    name: String,
    #[serde(default)]
    is_group: bool,
    #[serde(default)]
    is_feature: bool,
    #[serde(default)]
    is_basemap: bool,
    #[serde(default)]
    is_web: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    row_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_source: Option<String>,
}

impl LayerRecord {
    fn to_layer(&self, project: &Path) -> Layer {
        let connection = self.data_source.as_deref().and_then(|source| {
            ConnectionDescriptor::parse(source)
                .map_err(|e| {
                    tracing::warn!(
                        project = %project.display(),
                        layer = self.name,
                        error = %e,
                        "Ignoring malformed data source"
                    );
                })
                .ok()
        });
        Layer {
            id: self.id.clone(),
            name: self.name.clone(),
            is_group: self.is_group,
            is_feature: self.is_feature,
            is_basemap: self.is_basemap,
            is_web: self.is_web,
            row_filter: self.row_filter.clone(),
            connection,
        }
    }
}

/// Projects stored as JSON documents on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProjectResource;

impl JsonProjectResource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ProjectResource for JsonProjectResource {
    fn open(&self, path: &Path) -> Result<Box<dyn ProjectHandle>, ProjectError> {
        let content = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: ProjectDocument =
            serde_json::from_str(&content).map_err(|source| ProjectError::Format {
                path: path.to_path_buf(),
                source,
            })?;
        let layers = document.layers.iter().map(|r| r.to_layer(path)).collect();
        Ok(Box::new(JsonProjectHandle {
            path: path.to_path_buf(),
            document,
            layers,
        }))
    }
}

struct JsonProjectHandle {
    path: PathBuf,
    document: ProjectDocument,
    layers: Vec<Layer>,
}

impl JsonProjectHandle {
    fn check_index(&self, index: usize) -> Result<(), ProjectError> {
        if index < self.layers.len() {
            Ok(())
        } else {
            Err(ProjectError::LayerIndex {
                index,
                len: self.layers.len(),
            })
        }
    }

    fn io_error(&self, source: std::io::Error) -> ProjectError {
        ProjectError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ProjectHandle for JsonProjectHandle {
    fn list_layers(&self) -> &[Layer] {
        &self.layers
    }

    fn rewrite_binding(
        &mut self,
        index: usize,
        old: &ConnectionDescriptor,
        new: &ConnectionDescriptor,
    ) -> Result<bool, ProjectError> {
        self.check_index(index)?;
        if self.layers[index].connection.as_ref() != Some(old) {
            return Ok(false);
        }
        self.layers[index].connection = Some(new.clone());
        self.document.layers[index].data_source = Some(new.to_string());
        Ok(true)
    }

    fn clear_row_filter(&mut self, index: usize) -> Result<(), ProjectError> {
        self.check_index(index)?;
        self.layers[index].row_filter = None;
        self.document.layers[index].row_filter = None;
        Ok(())
    }

    fn save(&mut self) -> Result<(), ProjectError> {
        let body = serde_json::to_string_pretty(&self.document).map_err(|source| {
            ProjectError::Format {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn close(self: Box<Self>) {}
}
