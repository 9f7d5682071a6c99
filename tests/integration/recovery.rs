//! Reopen and crash-recovery behavior of materialized items

use crate::common::*;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn items_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = ItemStore::open(dir.path(), always_config()).unwrap();
        store.put(&Event::new("u1", "name", "Ann", 10).unwrap()).unwrap();
        store.put(&Event::new("u1", "name", "Bea", 20).unwrap()).unwrap();
        store.close().unwrap();
    }

    let store = ItemStore::open(dir.path(), always_config()).unwrap();
    let item = store.get("u1").unwrap();
    assert_eq!(item.get("name"), Some("Bea"));
    assert_eq!(item.last_updated, 20);
}

#[test]
fn items_survive_drop_without_close() {
    let dir = TempDir::new().unwrap();
    {
        let store = ItemStore::open(dir.path(), always_config()).unwrap();
        store.put(&Event::new("u1", "age", "30", 1).unwrap()).unwrap();
    }

    let store = ItemStore::open(dir.path(), always_config()).unwrap();
    assert_eq!(store.get("u1").unwrap().get("age"), Some("30"));
}

#[test]
fn checkpoint_then_more_writes() {
    let dir = TempDir::new().unwrap();
    {
        let store = ItemStore::open(dir.path(), always_config()).unwrap();
        for i in 0..100u64 {
            let event = Event::new(format!("u{}", i % 10), "v", i.to_string(), i).unwrap();
            store.put(&event).unwrap();
        }
        let info = store.checkpoint().unwrap().unwrap();
        assert_eq!(info.entry_count, 20);

        store.put(&Event::new("u0", "v", "late", 500).unwrap()).unwrap();
        store.close().unwrap();
    }

    let store = ItemStore::open(dir.path(), always_config()).unwrap();
    let u0 = store.get("u0").unwrap();
    assert_eq!(u0.get("v"), Some("late"));
    assert_eq!(u0.last_updated, 500);
    assert_eq!(store.get("u9").unwrap().get("v"), Some("99"));
}

#[test]
fn pipeline_results_survive_reopen() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = (0..1000u64)
        .map(|i| tsv(&format!("item-{}", i % 25), &format!("a{}", i % 3), &i.to_string(), i))
        .collect();

    {
        let store = Arc::new(ItemStore::open(dir.path(), always_config()).unwrap());
        let pipeline = Pipeline::start(PipelineConfig::default(), Arc::clone(&store)).unwrap();
        pipeline
            .run(&mut IterLineSource::new(lines.iter().cloned()))
            .unwrap();
        let report = pipeline.finish().unwrap();
        assert_eq!(report.stats.events_applied, 1000);
        store.close().unwrap();
    }

    let store = ItemStore::open(dir.path(), always_config()).unwrap();
    // item-24 is last written by i = 999 (a0) and its a2 by i = 974
    let item = store.get("item-24").unwrap();
    assert_eq!(item.get("a0"), Some("999"));
    assert_eq!(item.get("a2"), Some("974"));
    assert_eq!(item.last_updated, 999);
}
