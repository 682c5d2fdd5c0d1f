//! Deployment store tests

use std::collections::BTreeMap;
use std::sync::Arc;

use deploybot::deploy::fsm::{DeploymentStatus, LifecycleEvent};
use deploybot::errors::BotError;
use deploybot::filesys::file::File;
use deploybot::models::deployment::NewDeployment;
use deploybot::store::backend::{JsonFileBackend, MemoryBackend};
use deploybot::store::records::DeploymentStore;

fn new_deployment(name: &str) -> NewDeployment {
    NewDeployment {
        name: name.to_string(),
        token: "12345678:secret".to_string(),
        files: BTreeMap::from([("main.py".to_string(), "print('hi')".to_string())]),
        deps: vec!["python-telegram-bot".to_string()],
        entry_point: Some("main.py".to_string()),
    }
}

#[tokio::test]
async fn test_round_trip_through_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deployments.json");

    let store = DeploymentStore::open(Arc::new(JsonFileBackend::new(File::new(&path))), 100)
        .await
        .unwrap();
    store.create(1, new_deployment("demo-bot")).await.unwrap();
    store.create(1, new_deployment("other-bot")).await.unwrap();
    store.create(2, new_deployment("third-bot")).await.unwrap();
    store
        .transition(1, "demo-bot", LifecycleEvent::Deploy, Some("Starting".to_string()))
        .await
        .unwrap();
    store.append_log(1, "demo-bot", "second line").await.unwrap();

    let reopened = DeploymentStore::open(Arc::new(JsonFileBackend::new(File::new(&path))), 100)
        .await
        .unwrap();
    let names: Vec<String> = reopened.list(1).await.into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["demo-bot", "other-bot"]);

    let demo = reopened.find(1, "demo-bot").await.unwrap();
    assert_eq!(demo.status, DeploymentStatus::Deploying);
    assert_eq!(demo.files.get("main.py").map(String::as_str), Some("print('hi')"));
    assert_eq!(demo.deps, vec!["python-telegram-bot"]);
    assert_eq!(demo.log.len(), 2);
    assert_eq!(reopened.summary().await.total_deployments, 3);
}

#[tokio::test]
async fn test_snapshot_uses_camel_case_records() {
    let backend = Arc::new(MemoryBackend::new());
    let store = DeploymentStore::open(backend.clone(), 100).await.unwrap();
    store.create(7, new_deployment("demo-bot")).await.unwrap();

    let snapshot: serde_json::Value = serde_json::from_slice(&backend.snapshot().unwrap()).unwrap();
    let record = &snapshot["7"][0];
    assert_eq!(record["name"], "demo-bot");
    assert_eq!(record["entryPoint"], "main.py");
    assert_eq!(record["status"], "pending");
}

#[tokio::test]
async fn test_names_are_unique_across_owners() {
    let store = DeploymentStore::open(Arc::new(MemoryBackend::new()), 100).await.unwrap();
    store.create(1, new_deployment("demo-bot")).await.unwrap();

    let err = store.create(2, new_deployment("demo-bot")).await.unwrap_err();
    assert!(matches!(err, BotError::NameConflict(ref name) if name == "demo-bot"));
    assert!(store.name_taken("demo-bot").await);
    assert!(!store.name_taken("free-name").await);
}

#[tokio::test]
async fn test_log_is_capped_on_load() {
    let backend = Arc::new(MemoryBackend::new());
    let store = DeploymentStore::open(backend.clone(), 50).await.unwrap();
    store.create(1, new_deployment("demo-bot")).await.unwrap();
    for i in 0..30 {
        store.append_log(1, "demo-bot", format!("line {i}")).await.unwrap();
    }

    let smaller = DeploymentStore::open(backend, 10).await.unwrap();
    let demo = smaller.find(1, "demo-bot").await.unwrap();
    assert_eq!(demo.log.len(), 10);
    assert_eq!(demo.log.back().unwrap().message, "line 29");
}

#[tokio::test]
async fn test_delete_removes_from_snapshot() {
    let backend = Arc::new(MemoryBackend::new());
    let store = DeploymentStore::open(backend.clone(), 100).await.unwrap();
    store.create(1, new_deployment("demo-bot")).await.unwrap();

    let removed = store.delete(1, "demo-bot").await.unwrap();
    assert_eq!(removed.name, "demo-bot");
    assert!(store.list(1).await.is_empty());
    assert!(store.find(1, "demo-bot").await.unwrap_err().is_not_found());

    let snapshot = String::from_utf8(backend.snapshot().unwrap()).unwrap();
    assert!(!snapshot.contains("demo-bot"));
    assert!(store.delete(1, "demo-bot").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_failed_write_rolls_back() {
    let backend = Arc::new(MemoryBackend::new());
    let store = DeploymentStore::open(backend.clone(), 100).await.unwrap();
    store.create(1, new_deployment("demo-bot")).await.unwrap();

    backend.set_fail_writes(true);

    let err = store
        .transition(1, "demo-bot", LifecycleEvent::Deploy, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::Persistence(_)));
    assert_eq!(store.find(1, "demo-bot").await.unwrap().status, DeploymentStatus::Pending);

    assert!(store.create(1, new_deployment("second-bot")).await.is_err());
    assert!(!store.name_taken("second-bot").await);

    assert!(store.delete(1, "demo-bot").await.is_err());
    assert!(store.find(1, "demo-bot").await.is_ok());

    backend.set_fail_writes(false);
    store.persist().await.unwrap();
}

#[tokio::test]
async fn test_invalid_transition_changes_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    let store = DeploymentStore::open(backend.clone(), 100).await.unwrap();
    store.create(1, new_deployment("demo-bot")).await.unwrap();
    let writes = backend.writes();

    let err = store
        .transition(1, "demo-bot", LifecycleEvent::Launched, Some("never logged".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::InvalidTransition(_)));
    assert_eq!(backend.writes(), writes);
    assert!(store.find(1, "demo-bot").await.unwrap().log.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_creates_of_one_name_admit_one() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(DeploymentStore::open(backend.clone(), 100).await.unwrap());

    let tasks: Vec<_> = (1..=16)
        .map(|owner| {
            let store = store.clone();
            tokio::spawn(async move { store.create(owner, new_deployment("race-bot")).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert!(matches!(e, BotError::NameConflict(ref name) if name == "race-bot")),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(store.summary().await.total_deployments, 1);

    let snapshot: serde_json::Value = serde_json::from_slice(&backend.snapshot().unwrap()).unwrap();
    let records: usize = snapshot.as_object().unwrap().values().map(|v| v.as_array().unwrap().len()).sum();
    assert_eq!(records, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_appends_are_all_kept() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(DeploymentStore::open(backend.clone(), 100).await.unwrap());
    store.create(1, new_deployment("busy-bot")).await.unwrap();

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.append_log(1, "busy-bot", format!("line {}", i)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let busy = store.find(1, "busy-bot").await.unwrap();
    assert_eq!(busy.log.len(), 50);
    for i in 0..50 {
        let line = format!("line {}", i);
        assert!(busy.log.iter().any(|entry| entry.message == line));
    }

    // the last snapshot holds every line
    let reopened = DeploymentStore::open(backend, 100).await.unwrap();
    assert_eq!(reopened.find(1, "busy-bot").await.unwrap().log.len(), 50);
}

#[tokio::test]
async fn test_fail_interrupted_only_touches_unfinished_records() {
    let backend = Arc::new(MemoryBackend::new());
    let store = DeploymentStore::open(backend.clone(), 100).await.unwrap();
    for name in ["pending-bot", "deploying-bot", "running-bot", "stopped-bot"] {
        store.create(1, new_deployment(name)).await.unwrap();
    }
    store
        .transition(1, "deploying-bot", LifecycleEvent::Deploy, None)
        .await
        .unwrap();
    store.set_status(1, "running-bot", DeploymentStatus::Running).await.unwrap();
    store.set_status(1, "stopped-bot", DeploymentStatus::Stopped).await.unwrap();

    let mut failed = store.fail_interrupted("interrupted").await.unwrap();
    failed.sort();
    assert_eq!(
        failed,
        vec![(1, "deploying-bot".to_string()), (1, "pending-bot".to_string())]
    );
    for name in ["pending-bot", "deploying-bot"] {
        let record = store.find(1, name).await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(record.log.back().map(|e| e.message.as_str()), Some("interrupted"));
    }
    assert_eq!(store.find(1, "running-bot").await.unwrap().status, DeploymentStatus::Running);
    assert_eq!(store.find(1, "stopped-bot").await.unwrap().status, DeploymentStatus::Stopped);

    // nothing left to recover, nothing written
    let writes = backend.writes();
    assert!(store.fail_interrupted("interrupted").await.unwrap().is_empty());
    assert_eq!(backend.writes(), writes);
}

#[test]
fn test_summary_counts_by_status() {
    tokio_test::block_on(async {
        let store = DeploymentStore::open(Arc::new(MemoryBackend::new()), 100).await.unwrap();
        store.create(1, new_deployment("one-bot")).await.unwrap();
        store.create(2, new_deployment("two-bot")).await.unwrap();
        store.set_status(2, "two-bot", DeploymentStatus::Running).await.unwrap();

        let summary = store.summary().await;
        assert_eq!(summary.total_owners, 2);
        assert_eq!(summary.total_deployments, 2);
        assert_eq!(summary.count(DeploymentStatus::Pending), 1);
        assert_eq!(summary.count(DeploymentStatus::Running), 1);
        assert_eq!(summary.count(DeploymentStatus::Failed), 0);
    });
}
