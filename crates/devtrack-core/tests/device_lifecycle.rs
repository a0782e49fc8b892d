use std::sync::Arc;

use devtrack_core::artifact::{decode_payload_url, ArtifactSync};
use devtrack_core::guard::{AutoConfirm, BlockReason, DeleteOutcome, DepartmentGuard};
use devtrack_core::models::collections::DEVICES;
use devtrack_core::storage::{BlobStore, FsBlobStore, MemoryBlobStore};
use devtrack_core::store::{MemoryStore, SqliteStore};
use devtrack_core::views::{department_devices_view, departments_view};
use devtrack_core::{records, CoreConfig, DeviceEdits, DocumentStore, SharedStore};
use pretty_assertions::assert_eq;

fn note(text: &str) -> DeviceEdits {
    DeviceEdits {
        note: Some(text.to_string()),
        ..DeviceEdits::default()
    }
}

async fn run_scenario(store: SharedStore, blobs: Arc<dyn BlobStore>) -> String {
    let lab = records::add_department(&store, "Lab").await.unwrap();
    let lab2 = records::add_department(&store, "Lab2").await.unwrap();
    let device = records::add_device(&store, "Laptop 7", "Laptop", "Lab")
        .await
        .unwrap();

    let guard = DepartmentGuard::new(Arc::clone(&store));
    assert_eq!(
        guard.request_delete(&lab2, &AutoConfirm(true)).await.unwrap(),
        DeleteOutcome::Deleted
    );
    assert_eq!(
        guard.request_delete(&lab, &AutoConfirm(true)).await.unwrap(),
        DeleteOutcome::Blocked(BlockReason::HasDevices)
    );

    let config = CoreConfig::default().with_qr_base_url("https://inventory.example.org/d");
    let sync = ArtifactSync::new(Arc::clone(&store), blobs, config);
    let report = sync.save(&device, &note("Battery replaced")).await.unwrap();

    let linked = sync.load(&device.id).await.unwrap();
    assert_eq!(linked.image_url, report.artifact.url);

    assert!(report
        .payload_url
        .starts_with("https://inventory.example.org/d?data="));
    let payload = decode_payload_url(&report.payload_url).unwrap();
    assert_eq!(payload.notes, "Battery replaced");
    assert_eq!(payload.department, "Lab");
    assert_eq!(payload.id, device.id);

    report.artifact.key
}

#[tokio::test]
async fn department_and_device_lifecycle_in_memory() {
    let blobs = MemoryBlobStore::new();
    let key = run_scenario(Arc::new(MemoryStore::new()), Arc::new(blobs.clone())).await;

    let (bytes, content_type) = blobs.object(&key).unwrap();
    assert_eq!(content_type, "image/png");
    assert!(!bytes.is_empty());
}

#[tokio::test]
async fn department_and_device_lifecycle_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("devtrack.db")).unwrap();
    let blob_root = dir.path().join("blobs");

    let key = run_scenario(Arc::new(store), Arc::new(FsBlobStore::new(&blob_root))).await;

    assert!(blob_root.join(&key).is_file());
}

#[tokio::test]
async fn live_views_follow_saves_and_deletes() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    records::add_department(&store, "Lab").await.unwrap();
    let ops = records::add_department(&store, "Ops").await.unwrap();
    let device = records::add_device(&store, "Printer", "Printer", "Lab")
        .await
        .unwrap();

    let mut departments = departments_view(&store);
    let mut lab_devices = department_devices_view(&store, "Lab");
    let initial = departments.ready().await.unwrap();
    assert_eq!(initial.ready().unwrap().len(), 2);
    let initial = lab_devices.ready().await.unwrap();
    assert_eq!(initial.ready().unwrap()["Printer"].len(), 1);

    DepartmentGuard::new(Arc::clone(&store))
        .request_delete(&ops, &AutoConfirm(true))
        .await
        .unwrap();
    let names = loop {
        let state = departments.changed().await.unwrap();
        let names: Vec<String> = state
            .ready()
            .unwrap()
            .iter()
            .map(|department| department.name.clone())
            .collect();
        if names.len() == 1 {
            break names;
        }
    };
    assert_eq!(names, vec!["Lab".to_string()]);

    let sync = ArtifactSync::new(
        Arc::clone(&store),
        Arc::new(MemoryBlobStore::new()),
        CoreConfig::default(),
    );
    sync.save(&device, &note("jammed")).await.unwrap();
    let linked = loop {
        let state = lab_devices.changed().await.unwrap();
        let printer = state.ready().unwrap()["Printer"][0].clone();
        if printer.has_artifact() {
            break printer;
        }
    };
    assert_eq!(linked.note, "jammed");

    let stored = store.get(DEVICES, &device.id).await.unwrap().unwrap();
    assert_eq!(stored.fields["type"], serde_json::json!("Printer"));
}
