//! Storage layer for Meghaduta
//!
//! This crate implements the sorted key-value engine behind the item store:
//! - OrderedStore: BTreeMap-based storage with RwLock, WAL-backed
//! - MANIFEST holding the database UUID
//! - Recovery from the newest checkpoint plus WAL replay
//! - StorageConfig: durability mode and WAL sizing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod manifest;
pub mod ordered;

pub use config::StorageConfig;
pub use manifest::Manifest;
pub use ordered::{OrderedStore, StoreStats};
