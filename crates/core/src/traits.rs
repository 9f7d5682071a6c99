//! Core trait for the sorted key-value engine
//!
//! The item store only needs point reads, point writes, atomic batches and
//! ordered prefix scans. Keeping that surface behind [`KvEngine`] lets the
//! store run on the durable `OrderedStore` or on anything else that sorts
//! keys bytewise.

use crate::batch::WriteBatch;
use crate::error::Result;

/// Embedded, sorted byte-key store.
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
///
/// # Errors
///
/// Every method returns [`Error::StoreUnavailable`](crate::Error::StoreUnavailable)
/// when the engine rejects the operation, including after [`close`](KvEngine::close).
pub trait KvEngine: Send + Sync {
    /// Get the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Apply every put in `batch` atomically.
    ///
    /// Readers observe either none or all of the batch, and after a crash
    /// recovery restores either none or all of it.
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// Flush buffered writes if the engine's sync interval has elapsed.
    ///
    /// Engines that buffer durability call this from idle writers so the
    /// last batches of a quiet stream still reach disk on time. Returns
    /// whether a sync happened.
    fn sync_if_overdue(&self) -> Result<bool> {
        Ok(false)
    }

    /// All entries whose key starts with `prefix`, in ascending key order.
    ///
    /// The result comes from a single consistent view: a concurrent write is
    /// either entirely visible or entirely invisible.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Release the engine. Later calls fail; closing twice is a no-op.
    fn close(&self) -> Result<()>;
}
