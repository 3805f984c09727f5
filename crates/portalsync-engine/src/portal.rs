//! Portal content management.
//!
//! [`Portal`] is the publishing surface: find, delete and stage items,
//! publish staged artifacts as live services, share and retitle them.
//! [`LocalPortal`] is a catalogue-backed implementation kept in memory and
//! optionally persisted to a JSON file after every mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

pub use crate::config::types::SharingSettings;
use crate::artifact::Artifact;

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("item '{0}' not found")]
    NotFound(String),

    #[error("a {item_type} named '{title}' already exists")]
    Conflict { title: String, item_type: ItemType },

    #[error("{0} items cannot be published")]
    NotPublishable(ItemType),

    #[error("portal rejected the request: {0}")]
    Rejected(String),

    #[error("catalogue i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalogue format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("catalogue lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    ServiceDefinition,
    FeatureService,
    VectorTilePackage,
    VectorTileService,
}

impl ItemType {
    /// Type of the service a staged item of this type publishes to.
    #[must_use]
    pub fn published_type(self) -> Option<Self> {
        match self {
            Self::ServiceDefinition => Some(Self::FeatureService),
            Self::VectorTilePackage => Some(Self::VectorTileService),
            Self::FeatureService | Self::VectorTileService => None,
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ServiceDefinition => "Service Definition",
            Self::FeatureService => "Feature Service",
            Self::VectorTilePackage => "Vector Tile Package",
            Self::VectorTileService => "Vector Tile Service",
        };
        f.write_str(s)
    }
}

/// A portal content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalItem {
    pub id: String,
    pub title: String,
    pub owner: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub folder: Option<String>,
    /// Title of the service this item publishes to (staged items only).
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub sharing: SharingSettings,
    /// Bumped on every overwrite.
    #[serde(default)]
    pub revision: u32,
    pub url: String,
}

/// Metadata attached to a staged artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    pub title: String,
    pub owner: String,
    pub service_name: String,
    pub folder: Option<String>,
    pub tags: String,
    pub description: String,
}

/// Search criteria. `None` matches anything; titles match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    pub id: Option<String>,
    pub title: Option<String>,
    pub owner: Option<String>,
}

impl ItemQuery {
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn by_title(title: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: None,
            title: Some(title.into()),
            owner: Some(owner.into()),
        }
    }

    fn matches(&self, item: &PortalItem, item_type: ItemType) -> bool {
        item.item_type == item_type
            && self.id.as_deref().map_or(true, |id| item.id == id)
            && self.title.as_deref().map_or(true, |t| item.title == t)
            && self.owner.as_deref().map_or(true, |o| item.owner == o)
    }
}

/// A signed-in portal session.
pub trait Portal: Send + Sync {
    /// Items of `item_type` matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError`] if the search cannot be performed.
    fn find_items(&self, query: &ItemQuery, item_type: ItemType)
        -> Result<Vec<PortalItem>, PortalError>;

    /// # Errors
    ///
    /// Returns [`PortalError::NotFound`] if no item has `id`.
    fn delete_item(&self, id: &str) -> Result<(), PortalError>;

    /// Upload `artifact` as a staged item.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError`] if the upload is rejected.
    fn stage_item(&self, artifact: &Artifact, metadata: &ItemMetadata)
        -> Result<PortalItem, PortalError>;

    /// Publish a staged item. With an `overwrite` target, that live service
    /// is replaced in place and keeps its id; otherwise a new service is
    /// created.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Conflict`] when publishing new over an existing
    /// service and [`PortalError::NotFound`] when the overwrite target is gone.
    fn publish(
        &self,
        staged: &PortalItem,
        overwrite: Option<&PortalItem>,
    ) -> Result<PortalItem, PortalError>;

    /// # Errors
    ///
    /// Returns [`PortalError::NotFound`] if the item is gone.
    fn share(&self, item: &PortalItem, sharing: &SharingSettings) -> Result<(), PortalError>;

    /// # Errors
    ///
    /// Returns [`PortalError::NotFound`] if the item is gone.
    fn set_title(&self, item: &PortalItem, title: &str) -> Result<(), PortalError>;

    /// The style companion `style_title` of a tile service, created as a copy
    /// of `service` when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError`] if the companion cannot be created.
    fn ensure_style(&self, service: &PortalItem, style_title: &str)
        -> Result<PortalItem, PortalError>;
}

/// Signs in to a portal.
pub trait PortalConnector: Send + Sync {
    /// # Errors
    ///
    /// Returns [`PortalError`] if the session cannot be established.
    fn connect(&self, endpoint: &str, user: &str, password: &str)
        -> Result<Arc<dyn Portal>, PortalError>;
}

// ---------------------------------------------------------------------------
// Catalogue-backed portal
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalogue {
    next_id: u64,
    items: BTreeMap<String, PortalItem>,
}

impl Catalogue {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:032x}", self.next_id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut PortalItem, PortalError> {
        self.items
            .get_mut(id)
            .ok_or_else(|| PortalError::NotFound(id.to_string()))
    }
}

/// Portal whose content lives in a local catalogue.
pub struct LocalPortal {
    base_url: String,
    catalogue: Mutex<Catalogue>,
    file: Option<PathBuf>,
}

impl LocalPortal {
    /// Open (or create) a catalogue persisted at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError`] if an existing catalogue cannot be read.
    pub fn open(path: &Path, base_url: impl Into<String>) -> Result<Self, PortalError> {
        let catalogue = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(path)?)?
        } else {
            Catalogue::default()
        };
        Ok(Self {
            base_url: base_url.into(),
            catalogue: Mutex::new(catalogue),
            file: Some(path.to_path_buf()),
        })
    }

    /// A catalogue that lives only as long as this value.
    #[must_use]
    pub fn in_memory(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            catalogue: Mutex::new(Catalogue::default()),
            file: None,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Catalogue>, PortalError> {
        self.catalogue.lock().map_err(|_| PortalError::LockPoisoned)
    }

    fn persist(&self, catalogue: &Catalogue) -> Result<(), PortalError> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(catalogue)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/home/item.html?id={id}", self.base_url.trim_end_matches('/'))
    }

    /// Every item in the catalogue, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::LockPoisoned`] if the catalogue lock is poisoned.
    pub fn items(&self) -> Result<Vec<PortalItem>, PortalError> {
        Ok(self.lock()?.items.values().cloned().collect())
    }
}

impl Portal for LocalPortal {
    fn find_items(
        &self,
        query: &ItemQuery,
        item_type: ItemType,
    ) -> Result<Vec<PortalItem>, PortalError> {
        let catalogue = self.lock()?;
        Ok(catalogue
            .items
            .values()
            .filter(|item| query.matches(item, item_type))
            .cloned()
            .collect())
    }

    fn delete_item(&self, id: &str) -> Result<(), PortalError> {
        let mut catalogue = self.lock()?;
        catalogue
            .items
            .remove(id)
            .ok_or_else(|| PortalError::NotFound(id.to_string()))?;
        self.persist(&catalogue)?;
        tracing::debug!(item = id, "Deleted portal item");
        Ok(())
    }

    fn stage_item(
        &self,
        artifact: &Artifact,
        metadata: &ItemMetadata,
    ) -> Result<PortalItem, PortalError> {
        let item_type = match artifact.kind {
            portalsync_types::ServiceKind::Feature => ItemType::ServiceDefinition,
            portalsync_types::ServiceKind::VectorTile => ItemType::VectorTilePackage,
        };
        let mut catalogue = self.lock()?;
        let id = catalogue.allocate_id();
        let item = PortalItem {
            url: self.item_url(&id),
            id: id.clone(),
            title: metadata.title.clone(),
            owner: metadata.owner.clone(),
            item_type,
            folder: metadata.folder.clone(),
            service_name: Some(metadata.service_name.clone()),
            tags: metadata
                .tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
            description: metadata.description.clone(),
            source: Some(artifact.path.clone()),
            sharing: SharingSettings::default(),
            revision: 0,
        };
        catalogue.items.insert(id, item.clone());
        self.persist(&catalogue)?;
        Ok(item)
    }

    fn publish(
        &self,
        staged: &PortalItem,
        overwrite: Option<&PortalItem>,
    ) -> Result<PortalItem, PortalError> {
        let service_type = staged
            .item_type
            .published_type()
            .ok_or(PortalError::NotPublishable(staged.item_type))?;
        let service_title = staged
            .service_name
            .clone()
            .unwrap_or_else(|| staged.title.clone());

        let mut catalogue = self.lock()?;
        let published = if let Some(target) = overwrite {
            let item = catalogue.get_mut(&target.id)?;
            item.source.clone_from(&staged.source);
            item.tags.clone_from(&staged.tags);
            item.description.clone_from(&staged.description);
            item.revision += 1;
            item.clone()
        } else {
            let taken = catalogue.items.values().any(|item| {
                item.item_type == service_type
                    && item.owner == staged.owner
                    && item.title == service_title
            });
            if taken {
                return Err(PortalError::Conflict {
                    title: service_title,
                    item_type: service_type,
                });
            }
            let id = catalogue.allocate_id();
            let item = PortalItem {
                url: self.item_url(&id),
                id: id.clone(),
                title: service_title,
                owner: staged.owner.clone(),
                item_type: service_type,
                folder: staged.folder.clone(),
                service_name: None,
                tags: staged.tags.clone(),
                description: staged.description.clone(),
                source: staged.source.clone(),
                sharing: SharingSettings::default(),
                revision: 0,
            };
            catalogue.items.insert(id, item.clone());
            item
        };
        self.persist(&catalogue)?;
        Ok(published)
    }

    fn share(&self, item: &PortalItem, sharing: &SharingSettings) -> Result<(), PortalError> {
        let mut catalogue = self.lock()?;
        catalogue.get_mut(&item.id)?.sharing = sharing.clone();
        self.persist(&catalogue)
    }

    fn set_title(&self, item: &PortalItem, title: &str) -> Result<(), PortalError> {
        let mut catalogue = self.lock()?;
        title.clone_into(&mut catalogue.get_mut(&item.id)?.title);
        self.persist(&catalogue)
    }

    fn ensure_style(
        &self,
        service: &PortalItem,
        style_title: &str,
    ) -> Result<PortalItem, PortalError> {
        let mut catalogue = self.lock()?;
        if let Some(existing) = catalogue.items.values().find(|item| {
            item.item_type == service.item_type
                && item.owner == service.owner
                && item.title == style_title
        }) {
            return Ok(existing.clone());
        }
        let source = catalogue
            .items
            .get(&service.id)
            .cloned()
            .ok_or_else(|| PortalError::NotFound(service.id.clone()))?;
        let id = catalogue.allocate_id();
        let style = PortalItem {
            url: self.item_url(&id),
            id: id.clone(),
            title: style_title.to_string(),
            revision: 0,
            ..source
        };
        catalogue.items.insert(id, style.clone());
        self.persist(&catalogue)?;
        Ok(style)
    }
}

/// Connects every endpoint to one shared [`LocalPortal`].
pub struct LocalPortalConnector {
    portal: Arc<LocalPortal>,
}

impl LocalPortalConnector {
    #[must_use]
    pub fn new(portal: Arc<LocalPortal>) -> Self {
        Self { portal }
    }
}

impl PortalConnector for LocalPortalConnector {
    fn connect(
        &self,
        endpoint: &str,
        user: &str,
        _password: &str,
    ) -> Result<Arc<dyn Portal>, PortalError> {
        tracing::debug!(endpoint, user, "Signed in to portal");
        Ok(Arc::clone(&self.portal) as Arc<dyn Portal>)
    }
}
