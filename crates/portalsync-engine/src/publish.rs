//! Publish flows for feature and vector tile services.
//!
//! Both flows are sequences of idempotent portal calls, each wrapped in the
//! batch [`RetryPolicy`]. They block, so callers run them on the blocking
//! thread pool.

use std::path::PathBuf;
use std::sync::Arc;

use portalsync_types::ServiceKind;

use crate::artifact::{
    artifact_extension, artifact_title, Artifact, ArtifactBuilder, PackagingOptions,
};
use crate::config::types::ServiceDefinition;
use crate::portal::{
    ItemMetadata, ItemQuery, ItemType, Portal, PortalConnector, PortalError, PortalItem,
};
use crate::retry::{RetryError, RetryPolicy};

/// Suffix of the style companion every tile service gets.
pub const STYLE_SUFFIX: &str = "_Style";

/// One publish request.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub definition: ServiceDefinition,
    /// Project to package: the rewired working copy for feature services,
    /// the source project for tile services.
    pub project: PathBuf,
    /// Directory the artifact is written to.
    pub artifact_dir: PathBuf,
    /// `MM_DD_YYYY`.
    pub date_stamp: String,
    /// Reuse an artifact already on disk instead of rebuilding it.
    pub reuse_artifact: bool,
}

impl PublishRequest {
    #[must_use]
    pub fn artifact_title(&self) -> String {
        artifact_title(&self.definition.service_name, &self.date_stamp)
    }

    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.artifact_dir.join(format!(
            "{}.{}",
            self.artifact_title(),
            artifact_extension(self.definition.service_kind)
        ))
    }

    fn packaging_options(&self) -> PackagingOptions {
        let def = &self.definition;
        PackagingOptions {
            kind: def.service_kind,
            service_name: def.service_name.clone(),
            title: self.artifact_title(),
            tags: def.tags.clone(),
            description: def.description.clone(),
            allow_exporting: def.allow_exporting,
            folder: def.folder.clone(),
            max_cached_scale: def.max_cached_scale,
        }
    }

    fn metadata(&self, service_name: String) -> ItemMetadata {
        let def = &self.definition;
        ItemMetadata {
            title: self.artifact_title(),
            owner: def.admin_user.clone(),
            service_name,
            folder: def.folder.clone(),
            tags: def.tags.clone(),
            description: def.description.clone(),
        }
    }
}

/// A live service produced by a publish flow.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    pub service: PortalItem,
    pub staged: PortalItem,
    /// Set for tile services only.
    pub style: Option<PortalItem>,
    /// Whether an existing service was overwritten in place.
    pub overwritten: bool,
}

/// Runs publish flows against a portal.
pub struct Publisher {
    artifacts: Arc<dyn ArtifactBuilder>,
    portals: Arc<dyn PortalConnector>,
    retry: RetryPolicy,
}

impl Publisher {
    #[must_use]
    pub fn new(
        artifacts: Arc<dyn ArtifactBuilder>,
        portals: Arc<dyn PortalConnector>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            artifacts,
            portals,
            retry,
        }
    }

    /// Publish `request` with the flow its service kind calls for.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError`] for the first step that exhausted its retries.
    pub fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome, RetryError> {
        match request.definition.service_kind {
            ServiceKind::Feature => self.publish_feature(request),
            ServiceKind::VectorTile => self.publish_tile(request),
        }
    }

    fn connect(&self, def: &ServiceDefinition) -> Result<Arc<dyn Portal>, RetryError> {
        let endpoint = def.portal_endpoint();
        self.retry.execute("sign in", || {
            self.portals
                .connect(&endpoint, &def.admin_user, &def.admin_password)
        })
    }

    fn build_artifact(&self, request: &PublishRequest) -> Result<Artifact, RetryError> {
        let output = request.artifact_path();
        if request.reuse_artifact && output.exists() {
            tracing::info!(artifact = %output.display(), "Reusing existing artifact");
            return Ok(Artifact {
                path: output,
                title: request.artifact_title(),
                kind: request.definition.service_kind,
            });
        }
        let options = request.packaging_options();
        self.retry.execute("build artifact", || {
            self.artifacts.build(&request.project, &output, &options)
        })
    }

    fn delete_all(&self, portal: &dyn Portal, items: &[PortalItem]) -> Result<(), RetryError> {
        for item in items {
            tracing::info!(item = item.id, title = item.title, kind = %item.item_type, "Deleting existing item");
            self.retry
                .execute("delete item", || delete_if_exists(portal, &item.id))?;
        }
        Ok(())
    }

    fn find(
        &self,
        portal: &dyn Portal,
        query: &ItemQuery,
        item_type: ItemType,
    ) -> Result<Vec<PortalItem>, RetryError> {
        self.retry
            .execute("search items", || portal.find_items(query, item_type))
    }

    /// Stage `artifact`, first clearing every staged item with its title and
    /// owner. A repeat after a lost reply replaces the earlier upload.
    fn stage(
        &self,
        portal: &dyn Portal,
        artifact: &Artifact,
        metadata: &ItemMetadata,
    ) -> Result<PortalItem, RetryError> {
        let staged_type = staged_item_type(artifact.kind);
        let query = ItemQuery::by_title(metadata.title.clone(), metadata.owner.clone());
        self.retry.execute("stage artifact", || {
            for stale in portal.find_items(&query, staged_type)? {
                tracing::info!(item = stale.id, title = stale.title, "Clearing staged item");
                delete_if_exists(portal, &stale.id)?;
            }
            portal.stage_item(artifact, metadata)
        })
    }

    fn publish_feature(&self, request: &PublishRequest) -> Result<PublishOutcome, RetryError> {
        let def = &request.definition;
        let artifact = self.build_artifact(request)?;
        let portal = self.connect(def)?;
        let portal = portal.as_ref();

        let metadata = request.metadata(def.service_name.clone());
        let staged = self.stage(portal, &artifact, &metadata)?;

        // The live service is looked up on every attempt, so a repeat after
        // a lost create overwrites what the first attempt made.
        let mut overwritten = false;
        let service = self.retry.execute("publish service", || {
            let target = live_feature_service(portal, request)?;
            overwritten = target.is_some();
            portal.publish(&staged, target.as_ref())
        })?;

        self.retry
            .execute("share service", || portal.share(&service, &def.sharing))?;
        self.retry
            .execute("set title", || portal.set_title(&service, &def.service_name))?;

        tracing::info!(
            service = def.service_name,
            id = service.id,
            url = service.url,
            overwritten,
            "Feature service published"
        );
        Ok(PublishOutcome {
            service,
            staged,
            style: None,
            overwritten,
        })
    }

    fn publish_tile(&self, request: &PublishRequest) -> Result<PublishOutcome, RetryError> {
        let def = &request.definition;
        let artifact = self.build_artifact(request)?;
        let portal = self.connect(def)?;
        let portal = portal.as_ref();

        for title in [def.temporary_title(), artifact.title.clone()] {
            for item_type in [ItemType::VectorTilePackage, ItemType::VectorTileService] {
                let query = ItemQuery::by_title(title.clone(), def.admin_user.clone());
                let existing = self.find(portal, &query, item_type)?;
                self.delete_all(portal, &existing)?;
            }
        }

        let metadata = request.metadata(artifact.title.clone());
        let staged = self.stage(portal, &artifact, &metadata)?;

        // Same-title services were cleared above; one found here can only
        // come from an earlier attempt of this call.
        let published = ItemQuery::by_title(artifact.title.clone(), def.admin_user.clone());
        let service = self.retry.execute("publish service", || {
            let existing = portal
                .find_items(&published, ItemType::VectorTileService)?
                .into_iter()
                .next();
            portal.publish(&staged, existing.as_ref())
        })?;

        let style_title = format!("{}{STYLE_SUFFIX}", def.service_name);
        let style = self
            .retry
            .execute("ensure style", || portal.ensure_style(&service, &style_title))?;
        self.retry
            .execute("share service", || portal.share(&service, &def.sharing))?;

        tracing::info!(
            service = def.service_name,
            id = service.id,
            url = service.url,
            style = style.id,
            "Vector tile service published"
        );
        Ok(PublishOutcome {
            service,
            staged,
            style: Some(style),
            overwritten: false,
        })
    }
}

fn staged_item_type(kind: ServiceKind) -> ItemType {
    match kind {
        ServiceKind::Feature => ItemType::ServiceDefinition,
        ServiceKind::VectorTile => ItemType::VectorTilePackage,
    }
}

/// Delete `id`, treating an item that is already gone as deleted.
fn delete_if_exists(portal: &dyn Portal, id: &str) -> Result<(), PortalError> {
    match portal.delete_item(id) {
        Err(PortalError::NotFound(_)) => {
            tracing::debug!(item = id, "Item already deleted");
            Ok(())
        }
        other => other,
    }
}

/// Live feature service to overwrite: by configured id first, then by the
/// service name, then by the dated artifact title.
fn live_feature_service(
    portal: &dyn Portal,
    request: &PublishRequest,
) -> Result<Option<PortalItem>, PortalError> {
    let def = &request.definition;
    if let Some(id) = def.service_id.as_deref() {
        if let Some(hit) = portal
            .find_items(&ItemQuery::by_id(id), ItemType::FeatureService)?
            .into_iter()
            .next()
        {
            return Ok(Some(hit));
        }
        tracing::warn!(service = def.service_name, service_id = id, "Configured service id not found, matching by title");
    }
    for title in [def.service_name.clone(), request.artifact_title()] {
        let query = ItemQuery::by_title(title, def.admin_user.clone());
        if let Some(hit) = portal
            .find_items(&query, ItemType::FeatureService)?
            .into_iter()
            .next()
        {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::SnapshotArtifactBuilder;
    use crate::config::types::SharingSettings;
    use crate::portal::{LocalPortal, LocalPortalConnector};
    use crate::project::JsonProjectResource;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn definition(kind: ServiceKind, project: &Path) -> ServiceDefinition {
        ServiceDefinition {
            service_name: "Roads".into(),
            service_kind: kind,
            service_id: None,
            folder: Some("Transportation".into()),
            project: project.to_path_buf(),
            tags: "roads".into(),
            description: String::new(),
            allow_exporting: false,
            sharing: SharingSettings {
                everyone: false,
                org: true,
                groups: vec!["Public Works".into()],
            },
            portal_url: "gis.example.org".into(),
            admin_user: "publisher".into(),
            admin_password: "secret".into(),
            max_cached_scale: None,
        }
    }

    fn setup(kind: ServiceKind) -> (tempfile::TempDir, PublishRequest, Arc<LocalPortal>, Publisher) {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("Roads.project.json");
        std::fs::write(
            &project,
            r#"{"name": "Roads", "layers": [{"id": "a", "name": "Roads", "is_feature": true}]}"#,
        )
        .unwrap();
        let request = PublishRequest {
            definition: definition(kind, &project),
            project,
            artifact_dir: dir.path().join("data"),
            date_stamp: "10_19_2026".into(),
            reuse_artifact: false,
        };
        let portal = Arc::new(LocalPortal::in_memory("https://gis.example.org/portal"));
        let publisher = Publisher::new(
            Arc::new(SnapshotArtifactBuilder::new(Arc::new(JsonProjectResource))),
            Arc::new(LocalPortalConnector::new(Arc::clone(&portal))),
            RetryPolicy::new(1, Duration::ZERO),
        );
        (dir, request, portal, publisher)
    }

    fn count(portal: &LocalPortal, item_type: ItemType) -> usize {
        portal
            .items()
            .unwrap()
            .iter()
            .filter(|i| i.item_type == item_type)
            .count()
    }

    #[test]
    fn artifact_path_carries_kind_and_date() {
        let (_dir, request, _portal, _publisher) = setup(ServiceKind::VectorTile);
        assert!(request.artifact_path().ends_with("data/Roads_10_19_2026.vtpk"));
    }

    #[test]
    fn feature_publish_twice_overwrites_in_place() {
        let (_dir, request, portal, publisher) = setup(ServiceKind::Feature);

        let first = publisher.publish(&request).unwrap();
        assert!(!first.overwritten);
        let second = publisher.publish(&request).unwrap();
        assert!(second.overwritten);

        assert_eq!(first.service.id, second.service.id);
        assert_eq!(count(&portal, ItemType::FeatureService), 1);
        assert_eq!(count(&portal, ItemType::ServiceDefinition), 1);
        let live = portal
            .items()
            .unwrap()
            .into_iter()
            .find(|i| i.item_type == ItemType::FeatureService)
            .unwrap();
        assert_eq!(live.title, "Roads");
        assert!(live.sharing.org);
        assert_eq!(live.revision, 1);
    }

    #[test]
    fn configured_service_id_wins_over_title() {
        let (_dir, mut request, portal, publisher) = setup(ServiceKind::Feature);
        let first = publisher.publish(&request).unwrap();
        portal.set_title(&first.service, "Renamed by hand").unwrap();

        request.definition.service_id = Some(first.service.id.clone());
        let second = publisher.publish(&request).unwrap();
        assert!(second.overwritten);
        assert_eq!(second.service.id, first.service.id);
        assert_eq!(count(&portal, ItemType::FeatureService), 1);
    }

    #[test]
    fn tile_publish_replaces_same_day_package() {
        let (_dir, request, portal, publisher) = setup(ServiceKind::VectorTile);

        let first = publisher.publish(&request).unwrap();
        let second = publisher.publish(&request).unwrap();

        assert_ne!(first.service.id, second.service.id);
        assert_eq!(count(&portal, ItemType::VectorTilePackage), 1);
        // One service plus its style companion.
        assert_eq!(count(&portal, ItemType::VectorTileService), 2);
        assert_eq!(second.style.unwrap().title, "Roads_Style");
    }

    #[test]
    fn reuse_skips_rebuild_when_artifact_exists() {
        let (_dir, mut request, _portal, publisher) = setup(ServiceKind::Feature);
        publisher.publish(&request).unwrap();
        std::fs::remove_file(&request.project).unwrap();

        request.reuse_artifact = true;
        assert!(publisher.publish(&request).is_ok());
    }

    #[test]
    fn build_failure_surfaces_as_exhausted_retry() {
        let (_dir, mut request, _portal, publisher) = setup(ServiceKind::Feature);
        request.project = PathBuf::from("/nonexistent/Roads.project.json");
        let err = publisher.publish(&request).unwrap_err();
        assert!(err.to_string().contains("build artifact"));
    }

    /// Commits each call like [`LocalPortal`], but reports the first call of
    /// every armed operation as failed.
    struct LostReplyPortal {
        inner: Arc<LocalPortal>,
        lose_stage: AtomicBool,
        lose_publish: AtomicBool,
        lose_delete: AtomicBool,
    }

    impl LostReplyPortal {
        fn new(inner: Arc<LocalPortal>) -> Self {
            Self {
                inner,
                lose_stage: AtomicBool::new(false),
                lose_publish: AtomicBool::new(false),
                lose_delete: AtomicBool::new(false),
            }
        }

        fn reply<T>(flag: &AtomicBool, committed: Result<T, PortalError>) -> Result<T, PortalError> {
            let value = committed?;
            if flag.swap(false, Ordering::SeqCst) {
                return Err(PortalError::Rejected("connection reset".into()));
            }
            Ok(value)
        }
    }

    impl Portal for LostReplyPortal {
        fn find_items(
            &self,
            query: &ItemQuery,
            item_type: ItemType,
        ) -> Result<Vec<PortalItem>, PortalError> {
            self.inner.find_items(query, item_type)
        }

        fn delete_item(&self, id: &str) -> Result<(), PortalError> {
            Self::reply(&self.lose_delete, self.inner.delete_item(id))
        }

        fn stage_item(
            &self,
            artifact: &Artifact,
            metadata: &ItemMetadata,
        ) -> Result<PortalItem, PortalError> {
            Self::reply(&self.lose_stage, self.inner.stage_item(artifact, metadata))
        }

        fn publish(
            &self,
            staged: &PortalItem,
            overwrite: Option<&PortalItem>,
        ) -> Result<PortalItem, PortalError> {
            Self::reply(&self.lose_publish, self.inner.publish(staged, overwrite))
        }

        fn share(&self, item: &PortalItem, sharing: &SharingSettings) -> Result<(), PortalError> {
            self.inner.share(item, sharing)
        }

        fn set_title(&self, item: &PortalItem, title: &str) -> Result<(), PortalError> {
            self.inner.set_title(item, title)
        }

        fn ensure_style(
            &self,
            service: &PortalItem,
            style_title: &str,
        ) -> Result<PortalItem, PortalError> {
            self.inner.ensure_style(service, style_title)
        }
    }

    struct LostReplyConnector(Arc<LostReplyPortal>);

    impl PortalConnector for LostReplyConnector {
        fn connect(
            &self,
            _endpoint: &str,
            _user: &str,
            _password: &str,
        ) -> Result<Arc<dyn Portal>, PortalError> {
            Ok(Arc::clone(&self.0) as Arc<dyn Portal>)
        }
    }

    fn lossy_publisher(portal: &Arc<LocalPortal>) -> (Arc<LostReplyPortal>, Publisher) {
        let lossy = Arc::new(LostReplyPortal::new(Arc::clone(portal)));
        let publisher = Publisher::new(
            Arc::new(SnapshotArtifactBuilder::new(Arc::new(JsonProjectResource))),
            Arc::new(LostReplyConnector(Arc::clone(&lossy))),
            RetryPolicy::new(2, Duration::ZERO),
        );
        (lossy, publisher)
    }

    #[test]
    fn lost_replies_leave_one_feature_service() {
        let (_dir, request, portal, _publisher) = setup(ServiceKind::Feature);
        let (lossy, publisher) = lossy_publisher(&portal);
        lossy.lose_stage.store(true, Ordering::SeqCst);
        lossy.lose_publish.store(true, Ordering::SeqCst);

        let outcome = publisher.publish(&request).unwrap();

        assert_eq!(count(&portal, ItemType::ServiceDefinition), 1);
        assert_eq!(count(&portal, ItemType::FeatureService), 1);
        assert_eq!(outcome.service.title, "Roads");
        assert!(outcome.overwritten);
    }

    #[test]
    fn lost_replies_leave_one_tile_service() {
        let (_dir, request, portal, _publisher) = setup(ServiceKind::VectorTile);
        let (lossy, publisher) = lossy_publisher(&portal);
        lossy.lose_stage.store(true, Ordering::SeqCst);
        lossy.lose_publish.store(true, Ordering::SeqCst);

        let outcome = publisher.publish(&request).unwrap();

        assert_eq!(count(&portal, ItemType::VectorTilePackage), 1);
        // Service plus its style companion.
        assert_eq!(count(&portal, ItemType::VectorTileService), 2);
        assert_eq!(outcome.service.title, "Roads_10_19_2026");
        assert_eq!(outcome.style.unwrap().title, "Roads_Style");
    }

    #[test]
    fn lost_delete_reply_still_replaces_package() {
        let (_dir, request, portal, publisher) = setup(ServiceKind::VectorTile);
        publisher.publish(&request).unwrap();

        let (lossy, publisher) = lossy_publisher(&portal);
        lossy.lose_delete.store(true, Ordering::SeqCst);
        publisher.publish(&request).unwrap();

        assert!(!lossy.lose_delete.load(Ordering::SeqCst));
        assert_eq!(count(&portal, ItemType::VectorTilePackage), 1);
        assert_eq!(count(&portal, ItemType::VectorTileService), 2);
    }

    #[test]
    fn missing_item_counts_as_deleted() {
        let portal = LocalPortal::in_memory("https://gis.example.org/portal");
        delete_if_exists(&portal, "nope").unwrap();
    }
}
