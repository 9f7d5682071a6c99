//! Item materialization for Meghaduta
//!
//! This crate turns events into stored item state and back:
//! - `keys`: the composite key encoding (`item_id` 0x1F `name`)
//! - `ItemStore`: `put(event)` / `get(item_id)` over any `KvEngine`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod item_store;
pub mod keys;

pub use item_store::{ItemStore, ItemStoreConfig, ItemStoreOptions, MarkerPolicy};
