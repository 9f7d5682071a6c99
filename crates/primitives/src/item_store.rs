//! ItemStore: event-sourced item materialization
//!
//! ## Design
//!
//! ItemStore is a stateless facade over a [`KvEngine`]. An item is never
//! stored as a record: each attribute lives under its own key, next to one
//! marker key holding the item's last-updated timestamp. Reading an item is
//! a prefix scan over its keys.
//!
//! ## Write Semantics
//!
//! - Attribute values are last-applied-wins: the most recently applied
//!   event for `(item, name)` is the stored value, whatever its timestamp.
//! - The marker follows [`MarkerPolicy`]. `LastApplied` overwrites it
//!   unconditionally, so an older event moves it backwards. `MaxTimestamp`
//!   keeps the larger of the stored and incoming value; it reads before it
//!   writes and is only exact while writes for an item are serialized.
//! - With `atomic_writes` (default) the attribute and marker are one
//!   [`WriteBatch`]. Without it they are two puts, and a crash between
//!   them can leave the marker behind the attribute.
//!
//! ## Thread Safety
//!
//! ItemStore is `Send + Sync` whenever its engine is. `get` may run
//! concurrently with `put`; a scan sees each batch entirely or not at all.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use meghaduta_core::{Error, Event, Item, KvEngine, Result, WriteBatch, LAST_UPDATED_AT};
use meghaduta_durability::CheckpointInfo;
use meghaduta_storage::{OrderedStore, StorageConfig};
use tracing::{debug, info};

use crate::keys;

/// How `put` updates the last-updated marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerPolicy {
    /// Overwrite with the incoming event's timestamp
    #[default]
    LastApplied,
    /// Keep the larger of the stored and incoming timestamps
    MaxTimestamp,
}

impl MarkerPolicy {
    /// Config-file name of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerPolicy::LastApplied => "last_applied",
            MarkerPolicy::MaxTimestamp => "max_timestamp",
        }
    }
}

impl fmt::Display for MarkerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkerPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "last_applied" => Ok(MarkerPolicy::LastApplied),
            "max_timestamp" => Ok(MarkerPolicy::MaxTimestamp),
            other => Err(format!(
                "unknown marker policy '{}', expected \"last_applied\" or \"max_timestamp\"",
                other
            )),
        }
    }
}

/// Write behavior of an [`ItemStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStoreOptions {
    /// Marker update policy
    pub marker_policy: MarkerPolicy,
    /// Write attribute and marker as one atomic batch
    pub atomic_writes: bool,
}

impl Default for ItemStoreOptions {
    fn default() -> Self {
        ItemStoreOptions {
            marker_policy: MarkerPolicy::LastApplied,
            atomic_writes: true,
        }
    }
}

impl ItemStoreOptions {
    /// Set the marker policy.
    pub fn with_marker_policy(mut self, policy: MarkerPolicy) -> Self {
        self.marker_policy = policy;
        self
    }

    /// Enable or disable atomic attribute + marker writes.
    pub fn with_atomic_writes(mut self, atomic: bool) -> Self {
        self.atomic_writes = atomic;
        self
    }
}

/// Everything needed to open an [`ItemStore`] on an [`OrderedStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemStoreConfig {
    /// Engine durability and WAL settings
    pub storage: StorageConfig,
    /// Write behavior
    pub options: ItemStoreOptions,
}

impl ItemStoreConfig {
    /// Strict durability, small WAL segments.
    pub fn for_testing() -> Self {
        ItemStoreConfig {
            storage: StorageConfig::for_testing(),
            options: ItemStoreOptions::default(),
        }
    }
}

/// Materialized item state over a sorted key-value engine.
///
/// # Example
///
/// ```ignore
/// let store = ItemStore::open("/var/lib/meghaduta", ItemStoreConfig::default())?;
/// store.put(&Event::new("u1", "name", "Ann", 10)?)?;
/// assert_eq!(store.get("u1")?.get("name"), Some("Ann"));
/// store.close()?;
/// ```
pub struct ItemStore<E: KvEngine = OrderedStore> {
    engine: E,
    options: ItemStoreOptions,
}

impl ItemStore<OrderedStore> {
    /// Open (creating if absent) an item store at `path`.
    pub fn open(path: impl AsRef<Path>, config: ItemStoreConfig) -> Result<Self> {
        let engine = OrderedStore::open(path, config.storage)?;
        info!(
            marker_policy = %config.options.marker_policy,
            atomic_writes = config.options.atomic_writes,
            "Item store opened"
        );
        Ok(ItemStore::with_engine(engine, config.options))
    }

    /// Item store over an in-memory engine.
    pub fn in_memory(options: ItemStoreOptions) -> Self {
        ItemStore::with_engine(OrderedStore::in_memory(), options)
    }

    /// Checkpoint the engine; see [`OrderedStore::checkpoint`].
    pub fn checkpoint(&self) -> Result<Option<CheckpointInfo>> {
        self.engine.checkpoint()
    }
}

impl<E: KvEngine> ItemStore<E> {
    /// Wrap an already opened engine. The store takes ownership of it.
    pub fn with_engine(engine: E, options: ItemStoreOptions) -> Self {
        ItemStore { engine, options }
    }

    /// Underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Write behavior in effect.
    pub fn options(&self) -> &ItemStoreOptions {
        &self.options
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// - [`Error::StoreUnavailable`] if the engine rejects a read or write
    /// - [`Error::Decode`] under `MaxTimestamp` if the stored marker is corrupt
    pub fn put(&self, event: &Event) -> Result<()> {
        let item_id = event.item_id();
        let attribute_key = keys::attribute_key(item_id, event.name());
        let marker_key = keys::marker_key(item_id);

        let marker = match self.options.marker_policy {
            MarkerPolicy::LastApplied => event.timestamp(),
            MarkerPolicy::MaxTimestamp => {
                let stored = match self.engine.get(&marker_key)? {
                    Some(raw) => decode_marker(item_id, &raw)?,
                    None => 0,
                };
                stored.max(event.timestamp())
            }
        };
        let marker = marker.to_string();

        if self.options.atomic_writes {
            let mut batch = WriteBatch::with_capacity(2);
            batch
                .put(attribute_key, event.value().as_bytes())
                .put(marker_key, marker.into_bytes());
            self.engine.write_batch(batch)
        } else {
            self.engine.put(&attribute_key, event.value().as_bytes())?;
            self.engine.put(&marker_key, marker.as_bytes())
        }
    }

    /// Current state of an item.
    ///
    /// An id that has never been written reads back as an empty item with
    /// `last_updated == 0`. So does an id no event could carry (empty, or
    /// containing the key separator).
    ///
    /// # Errors
    ///
    /// - [`Error::StoreUnavailable`] if the scan fails
    /// - [`Error::Decode`] if the marker is not a decimal integer, or a
    ///   stored name or value is not UTF-8
    pub fn get(&self, item_id: &str) -> Result<Item> {
        let mut item = Item::empty(item_id);
        if item_id.is_empty() || item_id.contains(keys::SEPARATOR) {
            return Ok(item);
        }

        for (key, value) in self.engine.scan_prefix(&keys::item_prefix(item_id))? {
            let Some(suffix) = keys::strip_item_prefix(item_id, &key) else {
                continue;
            };
            let name = std::str::from_utf8(suffix)
                .map_err(|_| Error::decode(item_id, "attribute name is not valid UTF-8"))?;

            if name == LAST_UPDATED_AT {
                item.last_updated = decode_marker(item_id, &value)?;
            } else {
                let value = String::from_utf8(value).map_err(|_| {
                    Error::decode(item_id, format!("value of '{}' is not valid UTF-8", name))
                })?;
                item.attributes.insert(name.to_string(), value);
            }
        }

        Ok(item)
    }

    /// Let the engine flush buffered writes whose sync interval has passed.
    pub fn sync_if_overdue(&self) -> Result<bool> {
        self.engine.sync_if_overdue()
    }

    /// Release the engine. Data already written stays durable.
    pub fn close(&self) -> Result<()> {
        debug!("Closing item store");
        self.engine.close()
    }
}

impl<E: KvEngine + fmt::Debug> fmt::Debug for ItemStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemStore")
            .field("engine", &self.engine)
            .field("options", &self.options)
            .finish()
    }
}

fn decode_marker(item_id: &str, raw: &[u8]) -> Result<u64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.parse::<u64>().ok())
        .ok_or_else(|| {
            Error::decode(
                item_id,
                format!(
                    "{} marker '{}' is not an integer",
                    LAST_UPDATED_AT,
                    String::from_utf8_lossy(raw)
                ),
            )
        })
}
