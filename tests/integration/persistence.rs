//! Integration test: backups survive a restart of the file store, and a
//! failed backup leaves nothing a reader could mistake for a revision.

use std::io::Cursor;
use std::sync::Arc;

use cairn_engine::{ChunkManager, ManagerConfig};
use cairn_integration_tests::{BackupHarness, open_file_store, revision_on_disk, test_data_seeded};
use cairn_store::{FaultyStore, Store};
use cairn_types::RevisionId;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(20000)]
async fn test_backup_survives_reopen() {
    let store_dir = tempfile::tempdir().unwrap();
    let mut expected: Vec<(RevisionId, Vec<u8>)> = Vec::new();

    {
        let h = BackupHarness::with_store(256, open_file_store(store_dir.path()).await);
        for i in 0..8u32 {
            let data = test_data_seeded(100 + i as usize * 300, i + 1);
            let path = h.write_file(&format!("dir{}/file{i}.dat", i % 3), &data);
            expected.push((revision_on_disk(&path), data));
        }
        let (watcher, mut rx) = h.watch(&[]);
        assert_eq!(h.backup_walk(&watcher, &mut rx).await, 8);
        // The source tree goes away with the harness; only the store remains.
    }

    let store = open_file_store(store_dir.path()).await;
    assert_eq!(store.list_files().await.unwrap().len(), 8);

    let manager = ChunkManager::new(ManagerConfig::default(), store).unwrap();
    for (revision, data) in expected {
        assert!(manager.has_complete(&revision).await.unwrap(), "{revision}");
        let restored = manager
            .get(&revision)
            .await
            .unwrap()
            .read_to_end()
            .await
            .unwrap();
        assert_eq!(restored, data, "{revision}");
    }
}

#[tokio::test]
async fn test_failed_backup_leaves_no_revision_on_disk() {
    let store_dir = tempfile::tempdir().unwrap();
    let revision = RevisionId::new("/src/big.iso", std::time::SystemTime::UNIX_EPOCH);

    {
        let inner = open_file_store(store_dir.path()).await;
        let faulty = Arc::new(FaultyStore::new(inner).fail_chunk_writes_after(3));
        let manager = ChunkManager::new(
            ManagerConfig {
                chunk_size: 64,
                ..ManagerConfig::default()
            },
            faulty.clone(),
        )
        .unwrap();

        let result = manager
            .add(revision.clone(), Cursor::new(test_data_seeded(64 * 10, 5)))
            .await;
        assert!(result.is_err());
        assert_eq!(faulty.metadata_writes(), 0);
    }

    let store = open_file_store(store_dir.path()).await;
    assert!(store.list_files().await.unwrap().is_empty());
    assert!(
        store
            .get_revisions("/src/big.iso")
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        store
            .get_metadata(&revision)
            .await
            .unwrap_err()
            .is_not_found()
    );
    // Orphaned chunks from the failed attempt are allowed.
    assert_eq!(store.list_chunks().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_concurrent_writers_on_file_store() {
    let store_dir = tempfile::tempdir().unwrap();
    let store = open_file_store(store_dir.path()).await;
    let manager = Arc::new(
        ChunkManager::new(
            ManagerConfig {
                chunk_size: 128,
                write_concurrency: 4,
                ..ManagerConfig::default()
            },
            store.clone(),
        )
        .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..6u32 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            let data = test_data_seeded(2000, i + 100);
            let revision = RevisionId::new(
                format!("/parallel/{i}"),
                std::time::SystemTime::UNIX_EPOCH,
            );
            manager
                .add(revision.clone(), Cursor::new(data.clone()))
                .await
                .unwrap();
            (revision, data)
        }));
    }

    for handle in handles {
        let (revision, data) = handle.await.unwrap();
        let restored = manager
            .get(&revision)
            .await
            .unwrap()
            .read_to_end()
            .await
            .unwrap();
        assert_eq!(restored, data);
    }
    assert_eq!(store.list_files().await.unwrap().len(), 6);
}
