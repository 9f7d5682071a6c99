//! Atomic write batches
//!
//! A [`WriteBatch`] groups puts that an engine must make visible and durable
//! together. The item store uses it to write an attribute and its item's
//! last-updated marker as one unit.

/// An ordered group of key-value puts applied atomically.
///
/// When the same key appears more than once, the later put wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    puts: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        WriteBatch { puts: Vec::new() }
    }

    /// Create an empty batch with room for `capacity` puts.
    pub fn with_capacity(capacity: usize) -> Self {
        WriteBatch {
            puts: Vec::with_capacity(capacity),
        }
    }

    /// Queue a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.puts.push((key.into(), value.into()));
        self
    }

    /// Queued puts in application order.
    pub fn puts(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.puts
    }

    /// Consume the batch, yielding its puts in application order.
    pub fn into_puts(self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.puts
    }

    /// Number of queued puts.
    pub fn len(&self) -> usize {
        self.puts.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }
}
