use std::path::Path;

use fieldops_core::{Collection, Equipment, Job};
use fieldops_storage::{import_seed, list, JsonDocumentStore, Repository, SeedData};

fn seed_path() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/seed.yaml")
}

#[tokio::test]
async fn fixture_seed_imports_into_json_store() {
    let seed = SeedData::from_yaml_file(&seed_path()).await.expect("seed fixture");
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonDocumentStore::new(dir.path());

    let stored = import_seed(&store, &seed).await.expect("import");
    assert_eq!(stored.len(), Collection::ALL.len());

    let equipment: Vec<Equipment> = list(&store).await.expect("equipment");
    assert_eq!(equipment.len(), 3);
    assert_eq!(equipment[0].serial_number, "EXC12345");

    let jobs: Vec<Job> = list(&store).await.expect("jobs");
    assert!(jobs.iter().all(|j| j.time_span().total_days().is_some()));

    let raw = store.load(Collection::Tasks).await.expect("tasks");
    assert_eq!(raw.len(), 2);
}
