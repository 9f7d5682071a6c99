//! Materializer
//!
//! Applies validated events to the item store. Attribute values are
//! last-applied-wins, so events of one item must reach `apply` in source
//! order. The pipeline guarantees that by giving every item a single
//! partition, and every partition a single materializer.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use meghaduta_core::{Error, Event, KvEngine};
use meghaduta_primitives::ItemStore;
use meghaduta_storage::OrderedStore;
use rustc_hash::FxHasher;
use tracing::{error, warn};

/// Result of applying one event.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The event is in the store
    Applied,
    /// The store rejected the event; below the failure limit
    Failed(Error),
    /// The store rejected the event and the failure limit is reached
    Halt(Error),
}

/// Partition owning `item_id` among `partitions` partitions.
///
/// Stable for a given partition count. `partitions` of 0 is treated as 1.
pub fn partition_for(item_id: &str, partitions: usize) -> usize {
    let mut hasher = FxHasher::default();
    item_id.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as usize
}

/// Single-writer applier of events for one partition.
pub struct Materializer<E: KvEngine = OrderedStore> {
    store: Arc<ItemStore<E>>,
    failure_limit: u32,
    consecutive_failures: u32,
    applied: u64,
}

impl<E: KvEngine> Materializer<E> {
    /// Create a materializer that halts after `failure_limit` consecutive
    /// store failures (a limit of 0 is treated as 1).
    pub fn new(store: Arc<ItemStore<E>>, failure_limit: u32) -> Self {
        Materializer {
            store,
            failure_limit: failure_limit.max(1),
            consecutive_failures: 0,
            applied: 0,
        }
    }

    /// Apply one event.
    pub fn apply(&mut self, event: &Event) -> ApplyOutcome {
        match self.store.put(event) {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.applied += 1;
                ApplyOutcome::Applied
            }
            Err(e) => {
                self.consecutive_failures += 1;
                error!(
                    item_id = event.item_id(),
                    attribute = event.name(),
                    consecutive = self.consecutive_failures,
                    error = %e,
                    "Failed to apply event"
                );
                if self.consecutive_failures >= self.failure_limit {
                    ApplyOutcome::Halt(e)
                } else {
                    ApplyOutcome::Failed(e)
                }
            }
        }
    }

    /// Offer the store an overdue sync while the partition is idle.
    ///
    /// A failed sync is logged and reported as `false`; the next append
    /// surfaces the broken store through [`apply`](Self::apply).
    pub fn sync_if_overdue(&self) -> bool {
        match self.store.sync_if_overdue() {
            Ok(synced) => synced,
            Err(e) => {
                warn!(error = %e, "Periodic store sync failed");
                false
            }
        }
    }

    /// Store failures since the last successful apply.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Events applied by this materializer.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Shared item store.
    pub fn store(&self) -> &Arc<ItemStore<E>> {
        &self.store
    }
}
