//! Scheduler and service delivering into the local outbox.

use crate::helpers::{fixed_clock, noon, noise, reassemble, write_file, zip_entry_names};
use archivist::delivery::outbox::LedgerEntry;
use archivist::{ArchivistConfig, BackupService, OutboxSink, RecipientId, Scheduler, TaskStore};
use std::sync::Arc;

#[tokio::test]
async fn split_backup_lands_in_every_recipient_folder() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::new(dir.path().join("tasks.json")));
    let outbox = Arc::new(OutboxSink::open(dir.path().join("outbox")).unwrap());
    let target = write_file(&dir.path().join("db.sqlite"), &noise(40 * 1024, 3));
    store.create(&target, 24, noon()).await.unwrap();
    let recipients = vec![RecipientId::new("ops"), RecipientId::new("chat:42")];

    let pass = Scheduler::new(Arc::clone(&store), outbox.clone())
        .with_recipients(recipients.clone())
        .with_max_part_size(16 * 1024)
        .with_clock(fixed_clock(noon()))
        .tick()
        .await
        .unwrap();
    assert_eq!(pass.delivered, 1);

    for recipient in &recipients {
        let ledger = outbox.ledger(recipient).unwrap();
        let mut previous = None;
        let mut chunks = Vec::new();
        for entry in &ledger {
            let LedgerEntry::Part {
                message_id,
                file,
                reply_to,
                caption,
                ..
            } = entry
            else {
                panic!("unexpected notice in {recipient}'s ledger");
            };
            assert_eq!(*reply_to, previous);
            assert!(caption.starts_with("Backup of db.sqlite\nMade at: "));
            previous = Some(*message_id);
            chunks.push(std::fs::read(outbox.recipient_dir(recipient).join(file)).unwrap());
        }
        assert_eq!(ledger.len(), 3);

        let archive = reassemble(chunks.iter().map(Vec::as_slice));
        assert_eq!(zip_entry_names(&archive), ["db.sqlite"]);
    }
}

#[tokio::test]
async fn registration_notice_follows_the_test_backup() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::new(dir.path().join("tasks.json")));
    let outbox = Arc::new(OutboxSink::open(dir.path().join("outbox")).unwrap());
    let target = write_file(&dir.path().join("notes.md"), b"# notes");
    let service = BackupService::from_config(
        &ArchivistConfig::default(),
        store,
        outbox.clone(),
        outbox.clone(),
    )
    .with_clock(fixed_clock(noon()));
    let requester = RecipientId::new("alice");

    let task = service.register_task(&requester, &target, 12).await.unwrap();

    let ledger = outbox.ledger(&requester).unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(matches!(
        &ledger[0],
        LedgerEntry::Part { caption, .. } if caption == "Test backup notes.md"
    ));
    match &ledger[1] {
        LedgerEntry::Notice { text, .. } => {
            assert!(text.starts_with(&format!("Task {} created", task.id)));
            assert!(text.ends_with("Tuesday 2026/10/20 00:00:00"));
        }
        other => panic!("expected a notice, got {other:?}"),
    }
}
