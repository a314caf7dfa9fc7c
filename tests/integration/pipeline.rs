//! Integration test: watcher → chunk manager → in-memory store.
//!
//! Discovers a real directory tree, commits every regular file, and reads
//! each revision back.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cairn_integration_tests::{BackupHarness, revision_on_disk, test_data, test_data_seeded};

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(20000)]
async fn test_walk_backs_up_tree_with_exclusions() {
    let h = BackupHarness::in_memory(64);
    let a = h.write_file("a.txt", &test_data_seeded(1000, 1));
    let b = h.write_file("sub/b.txt", &test_data_seeded(500, 2));
    let c = h.write_file("docs/deep/c.txt", &test_data_seeded(70, 3));

    let (watcher, mut rx) = h.watch(&["sub/*"]);
    assert_eq!(h.backup_walk(&watcher, &mut rx).await, 2);

    let files = h.store().list_files().await.unwrap();
    assert!(files.contains(&*a.to_string_lossy()));
    assert!(files.contains(&*c.to_string_lossy()));
    assert!(!files.contains(&*b.to_string_lossy()));

    for (path, seed, len) in [(&a, 1, 1000), (&c, 3, 70)] {
        let restored = h.restore(&revision_on_disk(path)).await;
        assert_eq!(restored, test_data_seeded(len, seed), "{}", path.display());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(20000)]
async fn test_identical_files_share_chunks() {
    let h = BackupHarness::in_memory(128);
    let data = test_data(128 * 10);
    h.write_file("one.bin", &data);
    h.write_file("copy/two.bin", &data);
    h.write_file("other.bin", &test_data_seeded(128 * 2, 99));

    let (watcher, mut rx) = h.watch(&[]);
    assert_eq!(h.backup_walk(&watcher, &mut rx).await, 3);

    assert_eq!(h.store().list_files().await.unwrap().len(), 3);
    assert_eq!(h.store().list_chunks().await.unwrap().len(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(20000)]
async fn test_live_change_creates_new_revision() {
    let h = BackupHarness::in_memory(32);
    let old = test_data_seeded(300, 10);
    let new = test_data_seeded(450, 11);
    let path = h.place_file("notes.txt", &old, at(1_700_000_000));

    let (watcher, mut rx) = h.watch(&[]);
    assert_eq!(h.backup_walk(&watcher, &mut rx).await, 1);

    h.place_file("notes.txt", &new, at(1_700_000_600));
    let meta = h.backup_until(&mut rx, &path).await;
    assert_eq!(meta.revision.mod_time, at(1_700_000_600));
    assert_eq!(meta.length, 450);

    let name = path.to_string_lossy();
    let history = h.manager().history(&name).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(h.restore(&history[0].revision).await, old);
    assert_eq!(h.restore(&history[1].revision).await, new);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(20000)]
async fn test_live_exclusions_are_honoured() {
    let h = BackupHarness::in_memory(32);
    let (watcher, mut rx) = h.watch(&["*.tmp", "cache"]);
    assert_eq!(h.backup_walk(&watcher, &mut rx).await, 0);

    let skipped = h.place_file("scratch.tmp", b"temporary", at(1_000));
    let cached = h.place_file("cache/blob", b"cached", at(1_000));
    let kept = h.place_file("kept.txt", b"keep me", at(2_000));

    h.backup_until(&mut rx, &kept).await;

    let files = h.store().list_files().await.unwrap();
    assert!(files.contains(&*kept.to_string_lossy()));
    assert!(!files.contains(&*skipped.to_string_lossy()));
    assert!(!files.contains(&*cached.to_string_lossy()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(20000)]
async fn test_rediscovery_commits_nothing_new() {
    let h = BackupHarness::in_memory(64);
    for i in 0..5 {
        h.write_file(&format!("f{i}"), &test_data_seeded(200, i));
    }

    {
        let (watcher, mut rx) = h.watch(&[]);
        assert_eq!(h.backup_walk(&watcher, &mut rx).await, 5);
    }
    let chunks_before = h.store().list_chunks().await.unwrap();

    let (watcher, mut rx) = h.watch(&[]);
    assert_eq!(h.backup_walk(&watcher, &mut rx).await, 0);
    assert_eq!(h.store().list_chunks().await.unwrap(), chunks_before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(20000)]
async fn test_close_stops_discoveries() {
    let h = BackupHarness::in_memory(64);
    h.write_file("a", b"a");
    let (mut watcher, mut rx) = h.watch(&[]);
    assert_eq!(h.backup_walk(&watcher, &mut rx).await, 1);

    watcher.close();
    h.place_file("late", b"too late", at(5_000));
    assert!(rx.recv().await.is_none());
}
