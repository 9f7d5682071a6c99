//! Reorder buffer
//!
//! Parser and extractor workers finish lines out of order. Each line carries
//! the sequence number it was submitted with, and the sequencer releases
//! outcomes strictly in that order.

use std::collections::BTreeMap;

/// Holds out-of-order items until their predecessors arrive.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    /// Empty buffer expecting sequence number 0 first.
    pub fn new() -> Self {
        ReorderBuffer {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Accept an item. Sequence numbers already released are ignored.
    pub fn push(&mut self, seq: u64, item: T) {
        if seq >= self.next {
            self.pending.insert(seq, item);
        }
    }

    /// The next item in sequence, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next)?;
        self.next += 1;
        Some(item)
    }

    /// Sequence number the buffer is waiting for.
    pub fn next_seq(&self) -> u64 {
        self.next
    }

    /// Items held back behind a gap.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Release everything still held, in sequence order, skipping gaps.
    pub fn drain_remaining(&mut self) -> Vec<T> {
        let pending = std::mem::take(&mut self.pending);
        if let Some(&last) = pending.keys().next_back() {
            self.next = last + 1;
        }
        pending.into_values().collect()
    }
}
