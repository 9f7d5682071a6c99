//! Configuration via `meghaduta.toml`
//!
//! One file holds everything a process needs at startup: where the store
//! lives, where lines come from, and how the pipeline and store behave.
//! Missing fields fall back to defaults, so an empty file is valid.
//!
//! Paths are used as written; relative paths resolve against the working
//! directory of the process.

use std::path::{Path, PathBuf};

use meghaduta_core::{Error, Result};
use meghaduta_durability::{DurabilityMode, WalConfig};
use meghaduta_primitives::{ItemStoreConfig, ItemStoreOptions, MarkerPolicy};
use meghaduta_storage::StorageConfig;
use serde::{Deserialize, Serialize};

use crate::parser::LineFormat;
use crate::pipeline::PipelineConfig;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "meghaduta.toml";

/// `[wal]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalSection {
    /// Bytes per WAL segment before rotation
    pub segment_size: u64,
    /// Unsynced bytes that force an fsync in standard mode
    pub buffered_sync_bytes: u64,
    /// Largest encoded write batch; bigger ones fail with StoreUnavailable
    pub max_record_bytes: usize,
}

impl Default for WalSection {
    fn default() -> Self {
        let defaults = WalConfig::default();
        WalSection {
            segment_size: defaults.segment_size,
            buffered_sync_bytes: defaults.buffered_sync_bytes,
            max_record_bytes: defaults.max_record_bytes,
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineSection {
    /// Line Parser workers
    pub parser_workers: usize,
    /// Event Extractor workers
    pub extractor_workers: usize,
    /// Materializer partitions
    pub materializer_workers: usize,
    /// Capacity of each inter-stage channel
    pub channel_capacity: usize,
    /// Consecutive store failures before ingestion halts
    pub store_failure_limit: u32,
    /// `"tsv"` or `"json"`
    pub line_format: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        PipelineSection {
            parser_workers: defaults.parser_workers,
            extractor_workers: defaults.extractor_workers,
            materializer_workers: defaults.materializer_workers,
            channel_capacity: defaults.channel_capacity,
            store_failure_limit: defaults.store_failure_limit,
            line_format: defaults.line_format.to_string(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreSection {
    /// `"last_applied"` or `"max_timestamp"`
    pub marker_policy: String,
    /// Write attribute and marker as one atomic batch
    pub atomic_writes: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        let defaults = ItemStoreOptions::default();
        StoreSection {
            marker_policy: defaults.marker_policy.to_string(),
            atomic_writes: defaults.atomic_writes,
        }
    }
}

/// Process configuration loaded from `meghaduta.toml`.
///
/// # Example
///
/// ```toml
/// db_location = "/var/lib/meghaduta"
/// line_source = "/var/log/events.tsv"
/// durability = "standard"
///
/// [pipeline]
/// materializer_workers = 8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeghadutaConfig {
    /// Directory of the item store
    #[serde(default = "default_db_location")]
    pub db_location: PathBuf,
    /// File to ingest lines from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_source: Option<PathBuf>,
    /// Durability mode: `"cache"`, `"always"` or `"standard"`
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// WAL sizing
    #[serde(default)]
    pub wal: WalSection,
    /// Pipeline shape
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Item store write behavior
    #[serde(default)]
    pub store: StoreSection,
}

fn default_db_location() -> PathBuf {
    PathBuf::from("meghaduta-data")
}

fn default_durability_str() -> String {
    "standard".to_string()
}

impl Default for MeghadutaConfig {
    fn default() -> Self {
        MeghadutaConfig {
            db_location: default_db_location(),
            line_source: None,
            durability: default_durability_str(),
            wal: WalSection::default(),
            pipeline: PipelineSection::default(),
            store: StoreSection::default(),
        }
    }
}

impl MeghadutaConfig {
    /// Parse the durability string.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        self.durability
            .parse()
            .map_err(|e| Error::Config(format!("durability: {}", e)))
    }

    /// Parse the line format string.
    pub fn line_format(&self) -> Result<LineFormat> {
        self.pipeline
            .line_format
            .parse()
            .map_err(|e| Error::Config(format!("pipeline.line_format: {}", e)))
    }

    /// Parse the marker policy string.
    pub fn marker_policy(&self) -> Result<MarkerPolicy> {
        self.store
            .marker_policy
            .parse()
            .map_err(|e| Error::Config(format!("store.marker_policy: {}", e)))
    }

    /// WAL configuration.
    pub fn wal_config(&self) -> WalConfig {
        WalConfig::new()
            .with_segment_size(self.wal.segment_size)
            .with_buffered_sync_bytes(self.wal.buffered_sync_bytes)
            .with_max_record_bytes(self.wal.max_record_bytes)
    }

    /// Item store configuration (engine settings plus write behavior).
    pub fn item_store_config(&self) -> Result<ItemStoreConfig> {
        Ok(ItemStoreConfig {
            storage: StorageConfig::new()
                .with_durability(self.durability_mode()?)
                .with_wal_config(self.wal_config()),
            options: ItemStoreOptions::default()
                .with_marker_policy(self.marker_policy()?)
                .with_atomic_writes(self.store.atomic_writes),
        })
    }

    /// Pipeline configuration.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        Ok(PipelineConfig {
            parser_workers: self.pipeline.parser_workers,
            extractor_workers: self.pipeline.extractor_workers,
            materializer_workers: self.pipeline.materializer_workers,
            channel_capacity: self.pipeline.channel_capacity,
            store_failure_limit: self.pipeline.store_failure_limit,
            line_format: self.line_format()?,
        })
    }

    /// Check every field that needs parsing or has a range.
    pub fn validate(&self) -> Result<()> {
        if self.db_location.as_os_str().is_empty() {
            return Err(Error::Config("db_location must not be empty".to_string()));
        }
        self.wal_config()
            .validate()
            .map_err(|e| Error::Config(format!("wal: {}", e)))?;
        self.item_store_config()?;
        self.pipeline_config()?.validate()
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Meghaduta configuration

# Directory holding the item store (created if absent)
db_location = "meghaduta-data"

# File to ingest, one event per line
# line_source = "events.tsv"

# Durability mode: "standard" (default), "always" or "cache"
#   "standard" = fsync after 1000 writes or 100ms, checked on every write
#                and by idle writers; a crash may lose the last interval
#   "always"   = fsync every write, zero data loss
#   "cache"    = no WAL, data lives only until the next checkpoint
durability = "standard"

[wal]
segment_size = 67108864        # 64MB
buffered_sync_bytes = 4194304  # 4MB
max_record_bytes = 67108864    # 64MB, also the most recovery will read

[pipeline]
parser_workers = 4
extractor_workers = 4
# Events of one item always go to the same materializer
materializer_workers = 4
channel_capacity = 1024
# Consecutive store failures before ingestion halts
store_failure_limit = 1
# "tsv": itemId<TAB>name<TAB>value<TAB>timestamp
# "json": {"itemId":..,"name":..,"value":..,"timestamp":..}
line_format = "tsv"

[store]
# "last_applied": marker takes the timestamp of the last applied event
# "max_timestamp": marker keeps the largest timestamp seen
marker_policy = "last_applied"
# Write attribute and marker as one atomic batch
atomic_writes = true
"#
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MeghadutaConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to `path`.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
