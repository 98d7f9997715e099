//! Concurrent mutation of one store from many tasks.

use crate::helpers::{Env, noon, write_file};
use archivist::TaskStore;
use archivist::test_utils::RecordingSink;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_creates_and_deletes_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::new(dir.path().join("tasks.json")));
    for i in 0..10 {
        store.create(format!("/srv/old{i}"), 1, noon()).await.unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..10u64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                store.delete(i).await.map(|_| None)
            } else {
                store.create(format!("/srv/new{i}"), 2, noon()).await.map(|t| Some(t.id))
            }
        }));
    }
    for i in 0..5u64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .create(format!("/srv/extra{i}"), 3, noon())
                .await
                .map(|t| Some(t.id))
        }));
    }

    let mut created = BTreeSet::new();
    for handle in handles {
        if let Some(id) = handle.await.unwrap().unwrap() {
            assert!(created.insert(id), "id {id} handed out twice");
        }
    }
    assert_eq!(created, (10..20).collect::<BTreeSet<u64>>());

    let tasks = store.list().await.unwrap();
    let expected: BTreeSet<u64> = [1, 3, 5, 7, 9].into_iter().chain(10..20).collect();
    assert_eq!(tasks.keys().copied().collect::<BTreeSet<_>>(), expected);

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
    assert_eq!(raw["tasks"].as_object().unwrap().len(), 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_deleted_mid_backup_is_not_resurrected() {
    let env = Env::new(RecordingSink::with_delay(Duration::from_millis(300)));
    let report = write_file(&env.path("report.txt"), b"r");
    let task = env.store.create(&report, 1, noon()).await.unwrap();

    let scheduler = env.scheduler(noon());
    let pass = tokio::spawn(async move { scheduler.tick().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(env.store.delete(task.id).await.unwrap());

    let report = pass.await.unwrap().unwrap();
    assert_eq!(report.delivered, 1);
    assert!(env.store.list().await.unwrap().is_empty());
}
