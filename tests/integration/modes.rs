//! Durability modes and item store options

use crate::common::*;
use tempfile::TempDir;

fn store_with(dir: &TempDir, durability: DurabilityMode, options: ItemStoreOptions) -> ItemStore {
    let config = ItemStoreConfig {
        storage: StorageConfig::for_testing().with_durability(durability),
        options,
    };
    ItemStore::open(dir.path(), config).unwrap()
}

#[test]
fn standard_mode_survives_clean_close() {
    let dir = TempDir::new().unwrap();
    {
        let store = store_with(&dir, DurabilityMode::standard_default(), ItemStoreOptions::default());
        store.put(&Event::new("u1", "k", "v", 1).unwrap()).unwrap();
        store.close().unwrap();
    }
    let store = store_with(&dir, DurabilityMode::standard_default(), ItemStoreOptions::default());
    assert_eq!(store.get("u1").unwrap().get("k"), Some("v"));
}

#[test]
fn cache_mode_keeps_only_checkpointed_state() {
    let dir = TempDir::new().unwrap();
    {
        let store = store_with(&dir, DurabilityMode::Cache, ItemStoreOptions::default());
        store.put(&Event::new("u1", "k", "kept", 1).unwrap()).unwrap();
        store.checkpoint().unwrap();
        store.put(&Event::new("u1", "k", "lost", 2).unwrap()).unwrap();
        store.close().unwrap();
    }
    let store = store_with(&dir, DurabilityMode::Cache, ItemStoreOptions::default());
    let item = store.get("u1").unwrap();
    assert_eq!(item.get("k"), Some("kept"));
    assert_eq!(item.last_updated, 1);
}

#[test]
fn non_atomic_writes_read_the_same() {
    let dir = TempDir::new().unwrap();
    let options = ItemStoreOptions::default().with_atomic_writes(false);
    let store = store_with(&dir, DurabilityMode::Always, options);
    store.put(&Event::new("u1", "a", "1", 7).unwrap()).unwrap();
    store.put(&Event::new("u1", "b", "2", 3).unwrap()).unwrap();

    let item = store.get("u1").unwrap();
    assert_eq!(item.get("a"), Some("1"));
    assert_eq!(item.get("b"), Some("2"));
    assert_eq!(item.last_updated, 3);
}

#[test]
fn max_timestamp_marker_never_regresses() {
    let dir = TempDir::new().unwrap();
    let options = ItemStoreOptions::default().with_marker_policy(MarkerPolicy::MaxTimestamp);
    let store = store_with(&dir, DurabilityMode::Always, options);
    store.put(&Event::new("u1", "a", "new", 9).unwrap()).unwrap();
    store.put(&Event::new("u1", "a", "old", 4).unwrap()).unwrap();

    let item = store.get("u1").unwrap();
    assert_eq!(item.get("a"), Some("old"));
    assert_eq!(item.last_updated, 9);
}

#[test]
fn in_memory_store_leaves_no_files() {
    let store = ItemStore::in_memory(ItemStoreOptions::default());
    store.put(&Event::new("u1", "a", "1", 1).unwrap()).unwrap();
    assert!(store.engine().path().is_none());
    assert!(store.checkpoint().unwrap().is_none());
    assert_eq!(store.get("u1").unwrap().get("a"), Some("1"));
}
