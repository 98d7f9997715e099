//! End-to-end scheduler passes against a real store file.

use crate::helpers::{Env, noon, noise, write_file};
use archivist::test_utils::RecordingSink;
use chrono::TimeDelta;

#[tokio::test]
async fn due_report_is_sent_once_and_rearmed() {
    let env = Env::new(RecordingSink::new());
    let report = write_file(&env.path("docs/report.txt"), &noise(10 * 1024, 7));
    let task = env
        .store
        .create(&report, 24, noon() - TimeDelta::minutes(1))
        .await
        .unwrap();

    let pass = env.scheduler(noon()).tick().await.unwrap();
    assert_eq!((pass.due, pass.delivered), (1, 1));

    let sent = env.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].part_name, "report.txt.zip");
    assert_eq!(
        sent[0].caption,
        "Backup of report.txt\nMade at: Monday 2026/10/19 12:00:00"
    );
    let stored = env.store.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.next_due_at, noon() + TimeDelta::hours(24));

    let later = env
        .scheduler(noon() + TimeDelta::hours(1))
        .tick()
        .await
        .unwrap();
    assert_eq!(later.due, 0);
    assert_eq!(env.sink.sent().len(), 1);
}

#[tokio::test]
async fn rearmed_time_is_persisted_in_the_legacy_layout() {
    let env = Env::new(RecordingSink::new());
    let report = write_file(&env.path("report.txt"), b"quarterly numbers");
    env.store.create(&report, 24, noon()).await.unwrap();

    env.scheduler(noon()).tick().await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(env.store.path()).unwrap()).unwrap();
    let record = &raw["tasks"]["0"];
    assert_eq!(record["sheduledTo"], "Tuesday 2026/10/20 12:00:00");
    assert_eq!(record["delay"], 24);
    assert_eq!(record["path"], &*report.to_string_lossy());
}

#[tokio::test]
async fn delivery_failure_leaves_task_due_for_the_next_tick() {
    let env = Env::new(RecordingSink::failing_after(0));
    let report = write_file(&env.path("report.txt"), b"data");
    let due = noon() - TimeDelta::hours(2);
    let task = env.store.create(&report, 24, due).await.unwrap();

    for offset in [0, 57] {
        let now = noon() + TimeDelta::minutes(offset);
        let pass = env.scheduler(now).tick().await.unwrap();
        assert_eq!(pass.failed, 1);
        let stored = env.store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.next_due_at, due);
        assert!(stored.is_due_at(now));
    }
}

#[tokio::test]
async fn missing_target_is_retried_until_it_reappears() {
    let env = Env::new(RecordingSink::new());
    let target = env.path("later/report.txt");
    let due = noon() - TimeDelta::hours(1);
    let task = env.store.create(&target, 6, due).await.unwrap();

    let pass = env.scheduler(noon()).tick().await.unwrap();
    assert_eq!(pass.skipped_missing, 1);
    assert_eq!(env.store.get(task.id).await.unwrap().unwrap().next_due_at, due);

    write_file(&target, b"now it exists");
    let pass = env.scheduler(noon()).tick().await.unwrap();
    assert_eq!(pass.delivered, 1);
    assert_eq!(
        env.store.get(task.id).await.unwrap().unwrap().next_due_at,
        noon() + TimeDelta::hours(6)
    );
}

#[tokio::test]
async fn only_due_tasks_fire() {
    let env = Env::new(RecordingSink::new());
    let a = write_file(&env.path("a.txt"), b"a");
    let b = write_file(&env.path("b.txt"), b"b");
    env.store.create(&a, 1, noon()).await.unwrap();
    env.store
        .create(&b, 1, noon() + TimeDelta::seconds(1))
        .await
        .unwrap();

    let pass = env.scheduler(noon()).tick().await.unwrap();
    assert_eq!(pass.evaluated, 2);
    assert_eq!(pass.delivered, 1);
    assert_eq!(env.sink.sent()[0].part_name, "a.txt.zip");
}

#[tokio::test]
async fn out_of_range_delay_on_disk_is_reported_not_panicked() {
    let env = Env::new(RecordingSink::new());
    let report = write_file(&env.path("report.txt"), b"data");
    std::fs::create_dir_all(env.store.path().parent().unwrap()).unwrap();
    let raw = serde_json::json!({
        "tasks": {"0": {
            "path": report,
            "sheduledTo": "Monday 2026/10/19 11:00:00",
            "delay": u32::MAX,
        }}
    });
    std::fs::write(env.store.path(), raw.to_string()).unwrap();

    let scheduler = env.scheduler(noon());
    let pass = tokio::spawn(async move { scheduler.tick().await })
        .await
        .expect("tick must not panic");

    assert!(pass.unwrap_err().is_fatal());
    assert!(env.sink.sent().is_empty());
}

#[tokio::test]
async fn longest_interval_rearms_far_in_the_future() {
    let env = Env::new(RecordingSink::new());
    let report = write_file(&env.path("report.txt"), b"data");
    let task = env
        .store
        .create(&report, archivist::store::MAX_INTERVAL_HOURS, noon())
        .await
        .unwrap();

    let pass = env.scheduler(noon()).tick().await.unwrap();
    assert_eq!(pass.delivered, 1);
    let stored = env.store.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.next_due_at, task.next_due_after(noon()).unwrap());
}
