//! Meghaduta - event-sourced item materialization
//!
//! Meghaduta turns a stream of attribute-change events into the current
//! state of each item, stored in an embedded sorted key-value store.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use meghaduta::{FileLineSource, ItemStore, ItemStoreConfig, Pipeline, PipelineConfig};
//!
//! let store = Arc::new(ItemStore::open("data", ItemStoreConfig::default())?);
//! let pipeline = Pipeline::start(PipelineConfig::default(), Arc::clone(&store))?;
//! pipeline.run(&mut FileLineSource::open("events.tsv")?)?;
//! let report = pipeline.finish()?;
//!
//! let item = store.get("u42")?;
//! println!("{:?} updated at {}", item.attributes, item.last_updated);
//! ```
//!
//! # Architecture
//!
//! - `meghaduta-core`: events, items, errors, and the [`KvEngine`] seam
//! - `meghaduta-durability`: WAL segments, writesets, checkpoints
//! - `meghaduta-storage`: the durable [`OrderedStore`]
//! - `meghaduta-primitives`: the [`ItemStore`] key layout and write rules
//! - `meghaduta-engine`: parsing, extraction, and the [`Pipeline`]

pub use meghaduta_core::{
    Error, Event, Item, KvEngine, Result, ValidationError, WriteBatch, KEY_SEPARATOR,
    LAST_UPDATED_AT,
};
pub use meghaduta_durability::{CheckpointInfo, DurabilityMode, WalConfig};
pub use meghaduta_engine::{
    extract, ingest, parse_line, partition_for, try_parse_line, ApplyOutcome, FileLineSource,
    IterLineSource, LineFormat, LineParser, LineSource, Materializer, MeghadutaConfig,
    ParseSkip, ParsedCandidate, Pipeline, PipelineConfig, PipelineReport, ReaderLineSource,
    StatsSnapshot, CONFIG_FILE_NAME,
};
pub use meghaduta_primitives::{ItemStore, ItemStoreConfig, ItemStoreOptions, MarkerPolicy};
pub use meghaduta_storage::{OrderedStore, StorageConfig, StoreStats};
