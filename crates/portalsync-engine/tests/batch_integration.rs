//! End-to-end batch runs against file-backed collaborators.
//!
//! Sources are `SQLite` databases in a credentials directory, projects are
//! JSON documents, and the portal is a local catalogue file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use portalsync_engine::config::parser::parse_deployment_str;
use portalsync_engine::portal::{ItemType, LocalPortal};
use portalsync_engine::project::{read_layers, JsonProjectResource};
use portalsync_engine::report::OutboxNotifier;
use portalsync_engine::{local_collaborators, run_batch};
use portalsync_types::ConnectionDescriptor;

const PROJECT: &str = r#"{"name": "Roads", "layers": [
  {"id": "grp", "name": "Transport", "is_group": true},
  {"id": "roads", "name": "Roads", "is_feature": true, "row_filter": "status = 'ACTIVE'",
   "data_source": "SERVER=gisprod01,USER=gisuser,DATASET=GIS.ROADS"},
  {"id": "transit", "name": "Transit roads", "is_feature": true,
   "data_source": "SERVER=gisprod01,USER=gisuser,DATASET=TRANSIT.ROADS"},
  {"id": "bridges", "name": "Bridges", "is_feature": true,
   "data_source": "SERVER=gisprod01,USER=gisuser,DATASET=GIS.BRIDGES"},
  {"id": "parcels", "name": "Parcels", "is_feature": true,
   "data_source": "SERVER=gisprod01,USER=stranger,DATASET=CAD.PARCELS"},
  {"id": "imagery", "name": "Imagery", "is_basemap": true,
   "data_source": "SERVER=gisprod01,USER=gisuser,DATASET=GIS.IMAGERY"}
]}"#;

fn seed_source(creds: &Path) {
    let conn = rusqlite::Connection::open(creds.join("gisuser.sde")).unwrap();
    conn.execute_batch(
        "CREATE TABLE \"GIS.ROADS\" (id INTEGER, status TEXT);
         INSERT INTO \"GIS.ROADS\" VALUES (1, 'ACTIVE'), (2, 'RETIRED'), (3, 'ACTIVE');
         CREATE TABLE \"TRANSIT.ROADS\" (id INTEGER);
         INSERT INTO \"TRANSIT.ROADS\" VALUES (7);
         CREATE TABLE \"GIS.BRIDGES\" (id INTEGER);
         INSERT INTO \"GIS.BRIDGES\" VALUES (11), (12);",
    )
    .unwrap();
}

fn deployment(rebuild: bool) -> String {
    format!(
        r#"
version: "1.0"
rebuild_data: {rebuild}
portal:
  name: Enterprise
  folder: Transportation
resources:
  parallelism: 2
  retry:
    max_attempts: 1
    delay_seconds: 0
credentials:
  directory: creds
  rules:
    - account: gisuser
      credential: gisuser.sde
notifications:
  from: gis@example.org
  success_recipients: [team@example.org]
  failure_recipients: [oncall@example.org]
"#
    )
}

struct Target {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

fn target() -> Target {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("Transportation");
    std::fs::create_dir_all(root.join("creds")).unwrap();
    std::fs::create_dir_all(root.join("list")).unwrap();
    std::fs::create_dir_all(root.join("maps")).unwrap();
    seed_source(&root.join("creds"));
    std::fs::write(root.join("maps/roads.project.json"), PROJECT).unwrap();
    Target { _dir: dir, root }
}

fn write_definition(root: &Path, file: &str, body: &str) {
    std::fs::write(root.join("list").join(file), body).unwrap();
}

const FEATURE_DEFINITION: &str = "\
service_name: Roads
service_kind: feature
project: ../maps/roads.project.json
tags: roads, transport
portal_url: gis.example.org
admin_user: publisher
sharing:
  org: true
";

const TILE_DEFINITION: &str = "\
service_name: Roads_Tiles
service_kind: vector_tile
project: ../maps/roads.project.json
portal_url: gis.example.org
admin_user: publisher
max_cached_scale: 1128.5
";

async fn run(root: &Path, rebuild: bool) -> portalsync_engine::PipelineResult {
    let config = parse_deployment_str(&deployment(rebuild)).unwrap();
    let collaborators = local_collaborators(root, &config).unwrap();
    let notifier = Arc::new(OutboxNotifier::new(root.join("logs/outbox")));
    run_batch(root, &config, collaborators, notifier).await.unwrap()
}

fn outbox(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root.join("logs/outbox"))
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn catalogue(root: &Path) -> LocalPortal {
    LocalPortal::open(&root.join("portal.json"), "file://test").unwrap()
}

#[tokio::test]
async fn feature_service_is_extracted_rewired_and_published() {
    let t = target();
    write_definition(&t.root, "Roads.yaml", FEATURE_DEFINITION);

    let result = run(&t.root, true).await;
    assert!(result.is_success(), "result: {result:?}");
    assert_eq!(result.succeeded.len(), 1);

    // The working copy points at local replicas; unresolvable and basemap
    // layers keep their remote bindings.
    let working = t.root.join("data/Roads.project.json");
    let layers = read_layers(&JsonProjectResource, &working).unwrap();
    let binding = |id: &str| {
        layers
            .iter()
            .find(|l| l.id.as_str() == id)
            .and_then(|l| l.connection.clone())
            .unwrap()
    };
    for id in ["roads", "transit", "bridges"] {
        assert!(matches!(binding(id), ConnectionDescriptor::Local(_)), "{id} not rewired");
    }
    assert!(matches!(binding("parcels"), ConnectionDescriptor::Remote(_)));
    assert!(matches!(binding("imagery"), ConnectionDescriptor::Remote(_)));

    // Both ROADS tables collide on their leaf name; one is suffixed.
    let mut tables: Vec<String> = ["roads", "transit"]
        .iter()
        .map(|id| binding(id).dataset_name().to_string())
        .collect();
    tables.sort();
    assert_eq!(tables, vec!["ROADS", "ROADS_1"]);

    // Row filters are cleared once the data is local.
    let roads = layers.iter().find(|l| l.id.as_str() == "roads").unwrap();
    assert!(roads.active_row_filter().is_none());

    // The source project is never touched.
    let source = read_layers(&JsonProjectResource, &t.root.join("maps/roads.project.json")).unwrap();
    assert!(source
        .iter()
        .filter_map(|l| l.connection.as_ref())
        .all(|c| c.as_remote().is_some()));

    let items = catalogue(&t.root).items().unwrap();
    let service = items
        .iter()
        .find(|i| i.item_type == ItemType::FeatureService)
        .unwrap();
    assert_eq!(service.title, "Roads");
    assert!(service.sharing.org);

    assert!(!t.root.join("TO_DELETE").exists());
    let mail = outbox(&t.root);
    assert_eq!(mail.len(), 1);
    assert!(mail[0].contains("success"), "outbox: {mail:?}");
}

#[tokio::test]
async fn rerun_overwrites_the_live_feature_service() {
    let t = target();
    write_definition(&t.root, "Roads.yaml", FEATURE_DEFINITION);

    run(&t.root, true).await;
    let first = catalogue(&t.root).items().unwrap();
    let first_id = first
        .iter()
        .find(|i| i.item_type == ItemType::FeatureService)
        .map(|i| i.id.clone())
        .unwrap();

    let result = run(&t.root, true).await;
    assert!(result.is_success());

    let services: Vec<_> = catalogue(&t.root)
        .items()
        .unwrap()
        .into_iter()
        .filter(|i| i.item_type == ItemType::FeatureService)
        .collect();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].id, first_id);
    assert_eq!(services[0].revision, 1);

    // The first run's data was rotated into history.
    assert!(t.root.join("data/history/Roads.project.json").exists());
}

#[tokio::test]
async fn tile_service_publishes_with_style_companion() {
    let t = target();
    write_definition(&t.root, "Roads_Tiles.yaml", TILE_DEFINITION);

    let result = run(&t.root, true).await;
    assert!(result.is_success(), "result: {result:?}");

    // Tile services never extract.
    assert!(!t.root.join("data/Roads_Tiles_data").exists());

    let items = catalogue(&t.root).items().unwrap();
    assert_eq!(
        items
            .iter()
            .filter(|i| i.item_type == ItemType::VectorTilePackage)
            .count(),
        1
    );
    assert!(items.iter().any(|i| i.title == "Roads_Tiles_Style"));
}

#[tokio::test]
async fn invalid_definition_is_reported_and_batch_continues() {
    let t = target();
    write_definition(&t.root, "Broken.yaml", "service_name: [not, a, string]\n");
    write_definition(&t.root, "Roads.yaml", FEATURE_DEFINITION);

    let result = run(&t.root, true).await;
    assert_eq!(result.invalid_definitions.len(), 1);
    assert_eq!(result.succeeded.len(), 1);
    assert!(!result.is_success());

    let mail = outbox(&t.root);
    assert_eq!(mail.len(), 2, "outbox: {mail:?}");
    assert!(mail.iter().any(|m| m.contains("fail") && m.contains("broken")));
}

#[tokio::test]
async fn without_rebuild_the_feature_service_publishes_from_source() {
    let t = target();
    write_definition(&t.root, "Roads.yaml", FEATURE_DEFINITION);

    let result = run(&t.root, false).await;
    assert!(result.is_success(), "result: {result:?}");
    assert!(!t.root.join("data/Roads_data").exists());
    assert!(catalogue(&t.root)
        .items()
        .unwrap()
        .iter()
        .any(|i| i.item_type == ItemType::FeatureService));
}
