//! Shared helpers for the integration suites.
//!
//! Import via `mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Once;

pub use meghaduta::*;
use tempfile::TempDir;

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (shown on failure).
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Item store config with fsync on every write and small WAL segments.
pub fn always_config() -> ItemStoreConfig {
    ItemStoreConfig::for_testing()
}

/// Write `lines` to `name` under `dir`, one per line.
pub fn write_lines(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut text = lines.join("\n");
    text.push('\n');
    std::fs::write(&path, text).expect("write line file");
    path
}

/// One TSV event line.
pub fn tsv(item_id: &str, name: &str, value: &str, timestamp: u64) -> String {
    format!("{}\t{}\t{}\t{}", item_id, name, value, timestamp)
}

/// A `MeghadutaConfig` rooted in `dir` reading `source`.
pub fn config_in(dir: &TempDir, source: PathBuf) -> MeghadutaConfig {
    MeghadutaConfig {
        db_location: dir.path().join("db"),
        line_source: Some(source),
        durability: "always".to_string(),
        ..MeghadutaConfig::default()
    }
}

/// Lines-accounting identity of a drained pipeline.
pub fn assert_accounted(stats: &StatsSnapshot) {
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
