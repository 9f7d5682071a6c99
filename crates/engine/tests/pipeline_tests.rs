//! Pipeline behavior against real item stores
//!
//! Ordering, partitioning, halting, abort, and line accounting.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use meghaduta_core::{Error, KvEngine};
use meghaduta_durability::DurabilityMode;
use meghaduta_engine::{IterLineSource, LineFormat, Pipeline, PipelineConfig, StatsSnapshot};
use meghaduta_primitives::{ItemStore, ItemStoreConfig, ItemStoreOptions};
use meghaduta_storage::StorageConfig;
use tempfile::TempDir;

fn memory_store() -> Arc<ItemStore> {
    Arc::new(ItemStore::in_memory(ItemStoreOptions::default()))
}

fn wide_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_parser_workers(8)
        .with_extractor_workers(8)
        .with_materializer_workers(4)
        .with_channel_capacity(16)
}

fn assert_accounted(stats: &StatsSnapshot) {
    assert_eq!(
        stats.lines_received,
        stats.parse_skips
            + stats.validation_errors
            + stats.events_applied
            + stats.store_failures
            + stats.events_discarded,
        "unaccounted lines: {:?}",
        stats
    );
}

/// Expected state after applying `lines` one by one: per item, the last
/// value per attribute and the timestamp of the last event.
fn sequential_fold(lines: &[(String, String, String, u64)]) -> BTreeMap<String, (BTreeMap<String, String>, u64)> {
    let mut items: BTreeMap<String, (BTreeMap<String, String>, u64)> = BTreeMap::new();
    for (id, name, value, ts) in lines {
        let entry = items.entry(id.clone()).or_default();
        entry.0.insert(name.clone(), value.clone());
        entry.1 = *ts;
    }
    items
}

fn tsv(id: &str, name: &str, value: &str, ts: u64) -> String {
    format!("{}\t{}\t{}\t{}", id, name, value, ts)
}

#[test]
fn test_same_item_applied_in_submission_order() {
    let store = memory_store();
    let pipeline = Pipeline::start(wide_config(), Arc::clone(&store)).unwrap();

    // Timestamps go down so a timestamp-based rule would pick the wrong value
    for i in 0..2000u64 {
        pipeline.submit(tsv("u1", "counter", &i.to_string(), 5000 - i)).unwrap();
    }
    let report = pipeline.finish().unwrap();
    assert_eq!(report.stats.events_applied, 2000);

    let item = store.get("u1").unwrap();
    assert_eq!(item.get("counter"), Some("1999"));
    assert_eq!(item.last_updated, 5000 - 1999);
}

#[test]
fn test_partitioned_writers_match_sequential_fold() {
    let store = memory_store();
    let pipeline = Pipeline::start(wide_config(), Arc::clone(&store)).unwrap();

    let mut lines = Vec::new();
    for i in 0..3000u64 {
        let id = format!("item-{}", i % 37);
        let name = format!("attr-{}", i % 5);
        lines.push((id, name, format!("v{}", i), i * 7 % 1000));
    }
    for (id, name, value, ts) in &lines {
        pipeline.submit(tsv(id, name, value, *ts)).unwrap();
    }
    pipeline.finish().unwrap();

    for (id, (attributes, last)) in sequential_fold(&lines) {
        let item = store.get(&id).unwrap();
        assert_eq!(item.attributes, attributes, "item {}", id);
        assert_eq!(item.last_updated, last, "item {}", id);
    }
}

#[test]
fn test_single_writer_matches_sequential_fold() {
    let store = memory_store();
    let config = wide_config().single_writer();
    let pipeline = Pipeline::start(config, Arc::clone(&store)).unwrap();

    let lines: Vec<_> = (0..500u64)
        .map(|i| (format!("u{}", i % 3), "name".to_string(), format!("n{}", i), i))
        .collect();
    let mut source = IterLineSource::new(lines.iter().map(|(id, n, v, ts)| tsv(id, n, v, *ts)));
    assert_eq!(pipeline.run(&mut source).unwrap(), 500);
    pipeline.finish().unwrap();

    for (id, (attributes, last)) in sequential_fold(&lines) {
        let item = store.get(&id).unwrap();
        assert_eq!(item.attributes, attributes);
        assert_eq!(item.last_updated, last);
    }
}

#[test]
fn test_mixed_input_is_accounted() {
    let store = memory_store();
    let pipeline = Pipeline::start(wide_config(), Arc::clone(&store)).unwrap();

    let input = [
        tsv("u1", "name", "Ann", 1),
        String::new(),
        "# header".to_string(),
        "only\ttwo".to_string(),
        tsv("u1", "lastUpdatedAt", "9", 2),
        tsv("u2", "age", "30", 3).replace('3', "x"),
        "\tname\tnobody\t4".to_string(),
        tsv("u2", "age", "31", 5),
    ];
    let mut source = IterLineSource::new(input.iter().cloned());
    pipeline.run(&mut source).unwrap();
    let report = pipeline.finish().unwrap();

    let stats = report.stats;
    assert_eq!(stats.lines_received, 8);
    assert_eq!(stats.events_applied, 2);
    assert_eq!(stats.parse_skips, 4);
    assert_eq!(stats.validation_errors, 2);
    assert_eq!(stats.store_failures, 0);
    assert_accounted(&stats);

    assert_eq!(store.get("u1").unwrap().get("name"), Some("Ann"));
    assert_eq!(store.get("u2").unwrap().get("age"), Some("31"));
}

#[test]
fn test_json_lines() {
    let store = memory_store();
    let config = PipelineConfig::default().with_line_format(LineFormat::Json);
    let pipeline = Pipeline::start(config, Arc::clone(&store)).unwrap();

    pipeline
        .submit(r#"{"itemId":"u1","name":"email","value":"a@x.com","timestamp":10}"#)
        .unwrap();
    pipeline
        .submit(r#"{"itemId":"u1","name":"age","value":42,"timestamp":"11"}"#)
        .unwrap();
    pipeline.submit("not json").unwrap();
    let report = pipeline.finish().unwrap();

    assert_eq!(report.stats.events_applied, 2);
    assert_eq!(report.stats.parse_skips, 1);

    let item = store.get("u1").unwrap();
    assert_eq!(item.get("email"), Some("a@x.com"));
    assert_eq!(item.get("age"), Some("42"));
    assert_eq!(item.last_updated, 11);
}

#[test]
fn test_store_failure_halts_pipeline() {
    let store = memory_store();
    store.close().unwrap();
    let pipeline = Pipeline::start(wide_config(), Arc::clone(&store)).unwrap();

    pipeline.submit(tsv("u1", "name", "Ann", 1)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while !pipeline.is_halted() {
        assert!(Instant::now() < deadline, "pipeline never halted");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(matches!(
        pipeline.submit(tsv("u1", "name", "Bea", 2)),
        Err(Error::PipelineHalted(_))
    ));
    assert!(matches!(pipeline.finish(), Err(Error::StoreUnavailable(_))));
}

#[test]
fn test_failure_limit_tolerates_isolated_failures() {
    let store = memory_store();
    store.close().unwrap();
    let config = PipelineConfig::default()
        .single_writer()
        .with_store_failure_limit(1000);
    let pipeline = Pipeline::start(config, Arc::clone(&store)).unwrap();

    for i in 0..10u64 {
        pipeline.submit(tsv("u1", "n", "v", i)).unwrap();
    }
    assert!(!pipeline.is_halted());

    // Below the limit every failure is counted and nothing halts
    let report = pipeline.finish().unwrap();
    assert_eq!(report.stats.store_failures, 10);
    assert_eq!(report.stats.events_applied, 0);
    assert_accounted(&report.stats);
}

#[test]
fn test_abort_accounts_every_line() {
    let store = memory_store();
    let pipeline = Pipeline::start(wide_config(), Arc::clone(&store)).unwrap();

    for i in 0..1000u64 {
        pipeline.submit(tsv(&format!("u{}", i % 10), "n", "v", i)).unwrap();
    }
    let report = pipeline.abort();

    assert_eq!(report.stats.lines_received, 1000);
    assert_eq!(report.stats.store_failures, 0);
    assert_accounted(&report.stats);
}

#[test]
fn test_invalid_config_rejected() {
    let store = memory_store();
    let config = PipelineConfig::default().with_parser_workers(0);
    assert!(matches!(
        Pipeline::start(config, store),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_pipeline_over_durable_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    {
        let store = Arc::new(ItemStore::open(&path, ItemStoreConfig::for_testing()).unwrap());
        let pipeline = Pipeline::start(wide_config(), Arc::clone(&store)).unwrap();
        for i in 0..200u64 {
            pipeline
                .submit(tsv(&format!("u{}", i % 4), "seen", &i.to_string(), i))
                .unwrap();
        }
        pipeline.finish().unwrap();
        store.close().unwrap();
    }

    let store = ItemStore::open(&path, ItemStoreConfig::for_testing()).unwrap();
    assert_eq!(store.get("u3").unwrap().get("seen"), Some("199"));
    assert_eq!(store.get("u0").unwrap().last_updated, 196);
}

#[test]
fn test_idle_partition_syncs_standard_mode_wal() {
    let dir = TempDir::new().unwrap();
    let config = ItemStoreConfig {
        storage: StorageConfig::for_testing().with_durability(DurabilityMode::Standard {
            interval_ms: 300,
            batch_size: 10_000,
        }),
        options: ItemStoreOptions::default(),
    };
    let store = Arc::new(ItemStore::open(dir.path().join("db"), config).unwrap());
    let pipeline = Pipeline::start(PipelineConfig::default(), Arc::clone(&store)).unwrap();

    // One event, then silence: only the idle tick can flush it
    pipeline.submit(tsv("u1", "name", "Ann", 1)).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let wal = store.engine().stats().wal;
        if wal.wal_appends >= 1 && wal.sync_calls >= 1 {
            break;
        }
        assert!(Instant::now() < deadline, "buffered write was never synced");
        std::thread::sleep(Duration::from_millis(10));
    }

    let report = pipeline.finish().unwrap();
    assert_eq!(report.stats.events_applied, 1);
}

#[test]
fn test_event_writes_attribute_and_marker() {
    let store = memory_store();
    let pipeline = Pipeline::start(PipelineConfig::default(), Arc::clone(&store)).unwrap();
    pipeline.submit(tsv("u1", "name", "Ann", 1)).unwrap();
    pipeline.finish().unwrap();

    let keys = store.engine().scan_prefix(b"u1").unwrap();
    assert_eq!(keys.len(), 2);
}
