//! Integration tests for planned, chunked uploads
//!
//! The in-memory store records every collaborator call, which lets these
//! tests check the fan-out, compose and cleanup sequence end to end.

use gcs_resource::store::{InMemoryStore, StoreCall, StoreError};
use gcs_resource::transfer::{ParallelUploadCoordinator, TransferPlanner, UploadTarget};
use gcs_resource::{Error, PutParams};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const KIB: u64 = 1024;

fn write_file(dir: &TempDir, name: &str, len: u64) -> (std::path::PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
    let path = dir.path().join(name);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

fn uploads(calls: &[StoreCall]) -> Vec<(String, u64)> {
    calls
        .iter()
        .filter_map(|c| match c {
            StoreCall::Upload { key, bytes, .. } => Some((key.clone(), *bytes)),
            _ => None,
        })
        .collect()
}

fn composes(calls: &[StoreCall]) -> Vec<Vec<String>> {
    calls
        .iter()
        .filter_map(|c| match c {
            StoreCall::Compose { parts, .. } => Some(parts.clone()),
            _ => None,
        })
        .collect()
}

fn deletes(calls: &[StoreCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|c| match c {
            StoreCall::Delete { key, .. } => Some(key.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_four_part_upload_composes_in_order_and_cleans_up() {
    let temp = TempDir::new().unwrap();
    let (path, data) = write_file(&temp, "file.tgz", 500 * KIB);

    let store = InMemoryStore::new();
    store.create_bucket("artifacts", false);
    // Cleanup keeps going past a failed delete
    store.fail_deletes_of("dir/file.tgz.part1");

    let plan = TransferPlanner::default().plan(500 * KIB, (150 * KIB) as i64);
    assert_eq!(plan.thread_count(), 4);

    let coordinator = ParallelUploadCoordinator::new(Arc::new(store.clone()));
    let generation = coordinator
        .execute(&plan, &path, &UploadTarget::new("artifacts", "dir/file.tgz"))
        .await
        .unwrap();
    assert_eq!(generation, None);

    let calls = store.calls();
    let mut uploaded = uploads(&calls);
    uploaded.sort();
    assert_eq!(
        uploaded,
        vec![
            ("dir/file.tgz.part0".to_string(), 150 * KIB),
            ("dir/file.tgz.part1".to_string(), 150 * KIB),
            ("dir/file.tgz.part2".to_string(), 150 * KIB),
            ("dir/file.tgz.part3".to_string(), 50 * KIB),
        ]
    );

    assert_eq!(
        composes(&calls),
        vec![vec![
            "dir/file.tgz.part0".to_string(),
            "dir/file.tgz.part1".to_string(),
            "dir/file.tgz.part2".to_string(),
            "dir/file.tgz.part3".to_string(),
        ]]
    );
    assert_eq!(deletes(&calls).len(), 4);

    // Compose happens after every upload and before any delete
    let compose_at = calls
        .iter()
        .position(|c| matches!(c, StoreCall::Compose { .. }))
        .unwrap();
    assert!(calls[..compose_at]
        .iter()
        .filter(|c| matches!(c, StoreCall::Upload { .. }))
        .count()
        == 4);
    assert!(calls[..compose_at]
        .iter()
        .all(|c| !matches!(c, StoreCall::Delete { .. })));

    assert_eq!(store.object_data("artifacts", "dir/file.tgz", None).unwrap(), &data[..]);
    assert_eq!(
        store.keys("artifacts"),
        vec!["dir/file.tgz".to_string(), "dir/file.tgz.part1".to_string()]
    );
}

#[tokio::test]
async fn test_failed_part_returns_error_after_all_workers_finish() {
    let temp = TempDir::new().unwrap();
    let (path, _) = write_file(&temp, "file.tgz", 400 * KIB);

    let store = InMemoryStore::new();
    store.create_bucket("artifacts", false);
    store.fail_uploads_to("file.tgz.part2");
    // Failure is immediate; the healthy parts are still in flight when it lands
    store.set_upload_delay(Duration::from_millis(50));

    let plan = TransferPlanner::default().plan(400 * KIB, (100 * KIB) as i64);
    assert_eq!(plan.thread_count(), 4);

    let coordinator = ParallelUploadCoordinator::new(Arc::new(store.clone()));
    let err = coordinator
        .execute(&plan, &path, &UploadTarget::new("artifacts", "file.tgz"))
        .await
        .unwrap_err();

    match err {
        Error::Store(StoreError::Network(message)) => assert!(message.contains("part2")),
        other => panic!("expected injected network error, got {:?}", other),
    }

    let calls = store.calls();
    let mut uploaded: Vec<String> = uploads(&calls).into_iter().map(|(k, _)| k).collect();
    uploaded.sort();
    assert_eq!(
        uploaded,
        vec!["file.tgz.part0", "file.tgz.part1", "file.tgz.part3"]
    );
    assert!(composes(&calls).is_empty());
    assert!(deletes(&calls).is_empty());

    // Uploaded parts stay behind; the destination was never written
    assert!(store.object_data("artifacts", "file.tgz", None).is_none());
    assert_eq!(store.keys("artifacts").len(), 3);
}

#[tokio::test]
async fn test_clamped_plan_covers_every_byte() {
    let temp = TempDir::new().unwrap();
    let len = 64 * KIB + 17;
    let (path, data) = write_file(&temp, "wide.bin", len);

    let store = InMemoryStore::new();
    store.create_bucket("artifacts", false);

    let plan = TransferPlanner::default().plan(len, 1024);
    assert!(plan.was_clamped());
    assert_eq!(plan.thread_count(), 32);

    ParallelUploadCoordinator::new(Arc::new(store.clone()))
        .execute(&plan, &path, &UploadTarget::new("artifacts", "wide.bin"))
        .await
        .unwrap();

    let total: u64 = uploads(&store.calls()).iter().map(|(_, bytes)| bytes).sum();
    assert_eq!(total, len);
    assert_eq!(composes(&store.calls())[0].len(), 32);
    assert_eq!(store.object_data("artifacts", "wide.bin", None).unwrap(), &data[..]);
}

#[tokio::test]
async fn test_publish_from_params() {
    let temp = TempDir::new().unwrap();
    let (path, data) = write_file(&temp, "app.tgz", 3 * KIB);

    let store = InMemoryStore::new();
    store.create_bucket("versioned", true);

    let params = PutParams {
        file: path.display().to_string(),
        content_type: Some("application/gzip".to_string()),
        parallel_upload_threshold: 0,
        ..Default::default()
    };
    params.validate().unwrap();

    let target = UploadTarget::from_params("versioned", "releases/app.tgz", &params);
    let object = ParallelUploadCoordinator::new(Arc::new(store.clone()))
        .publish(&path, &target, params.threshold_bytes())
        .await
        .unwrap();

    // Single-part upload to a versioned bucket pins the new generation
    let generation = object.generation.unwrap();
    assert_eq!(
        store
            .object_data("versioned", "releases/app.tgz", Some(generation))
            .unwrap(),
        &data[..]
    );
    assert_eq!(
        store
            .object_options("versioned", "releases/app.tgz")
            .unwrap()
            .content_type
            .as_deref(),
        Some("application/gzip")
    );
}

#[tokio::test]
async fn test_missing_local_file_is_io_error() {
    let temp = TempDir::new().unwrap();
    let store = InMemoryStore::new();
    store.create_bucket("artifacts", false);

    let err = ParallelUploadCoordinator::new(Arc::new(store.clone()))
        .publish(
            &temp.path().join("missing.tgz"),
            &UploadTarget::new("artifacts", "missing.tgz"),
            0,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Io(_)));
    assert!(uploads(&store.calls()).is_empty());
}
