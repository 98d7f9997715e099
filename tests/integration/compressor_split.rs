//! Splitting large archives and sending the parts as a reply chain.

use crate::helpers::{Env, noon, noise, reassemble, write_file, zip_entry_names};
use archivist::Compressor;
use archivist::test_utils::RecordingSink;
use std::io::Read;
use std::path::Path;

fn photo_tree(root: &Path) {
    for (i, name) in ["a.jpg", "b.jpg", "nested/c.jpg"].iter().enumerate() {
        write_file(&root.join(name), &noise(24 * 1024, i as u32 + 11));
    }
}

#[test]
fn directory_split_into_three_parts_reassembles() {
    let dir = tempfile::tempdir().unwrap();
    let photos = dir.path().join("photos");
    photo_tree(&photos);
    let compressor = Compressor::default();

    let whole = compressor.compress(&photos, u64::MAX).unwrap();
    assert_eq!(whole.len(), 1);
    assert_eq!(whole[0].name, "photos.zip");
    let max = (whole[0].len() as u64).div_ceil(3);

    let parts = compressor.compress(&photos, max).unwrap();
    assert_eq!(
        parts.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        ["photos.zip.part0", "photos.zip.part1", "photos.zip.part2"]
    );
    assert!(parts.iter().all(|p| p.len() as u64 <= max));

    let archive = reassemble(parts.iter().map(|p| p.data.as_ref()));
    assert_eq!(archive.len(), whole[0].len());
    let names = zip_entry_names(&archive);
    assert!(names.iter().any(|n| n == "photos/nested/c.jpg"));

    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive)).unwrap();
    let mut restored = Vec::new();
    zip.by_name("photos/b.jpg")
        .unwrap()
        .read_to_end(&mut restored)
        .unwrap();
    assert_eq!(restored, std::fs::read(photos.join("b.jpg")).unwrap());
}

#[tokio::test]
async fn scheduled_split_backup_is_a_reply_chain() {
    let env = Env::new(RecordingSink::new());
    let photos = env.path("photos");
    photo_tree(&photos);
    let whole = Compressor::default().compress(&photos, u64::MAX).unwrap();
    let max = (whole[0].len() as u64).div_ceil(3);
    env.store.create(&photos, 12, noon()).await.unwrap();

    env.scheduler(noon())
        .with_max_part_size(max)
        .tick()
        .await
        .unwrap();

    let sent = env.sink.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].reply_to, None);
    assert_eq!(sent[1].reply_to, Some(sent[0].message));
    assert_eq!(sent[2].reply_to, Some(sent[1].message));
    assert!(sent.iter().all(|s| s.caption.starts_with("Backup of photos\n")));

    let archive = reassemble(sent.iter().map(|s| s.bytes.as_slice()));
    assert_eq!(zip_entry_names(&archive).len(), zip_entry_names(&whole[0].data).len());
}
