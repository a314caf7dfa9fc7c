//! Shared test utilities for cairn-engine tests.

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use cairn_store::MemoryStore;
use cairn_types::RevisionId;

use crate::manager::{ChunkManager, ManagerConfig};

/// 4x4-byte + 1x2-byte chunks at chunk size 4.
pub const TEST_DATA: &[u8] = b"abcdefghijklmnopqr";

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// A revision of `name` modified `secs` seconds after the epoch.
pub fn revision(name: &str, secs: u64) -> RevisionId {
    RevisionId::new(name, UNIX_EPOCH + Duration::from_secs(secs))
}

/// A manager over a fresh in-memory store, returning both.
pub fn memory_manager(chunk_size: u32) -> (ChunkManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let manager = ChunkManager::new(
        ManagerConfig {
            chunk_size,
            ..ManagerConfig::default()
        },
        store.clone(),
    )
    .unwrap();
    (manager, store)
}
