//! Tuning knobs for the ordered store's write-ahead log.
//!
//! Three limits shape the log: how large a segment grows before the writer
//! rolls to the next `wal-NNNNNN.seg`, how many unsynced bytes Standard mode
//! tolerates before forcing an fsync, and how large a single encoded write
//! batch may be. The record limit is enforced on the write path so that the
//! writer never appends a record the reader would refuse on recovery.

use super::record::{MAX_RECORD_LEN, MIN_RECORD_LEN};

/// Segments smaller than this would rotate on nearly every batch.
pub const MIN_SEGMENT_SIZE: u64 = 1024;

/// Write-ahead log limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalConfig {
    /// Rotation threshold for a segment file, header included.
    pub segment_size: u64,

    /// Unsynced bytes that force an fsync in Standard mode.
    pub buffered_sync_bytes: u64,

    /// Largest record length prefix the writer accepts.
    ///
    /// Bounded above by [`MAX_RECORD_LEN`], the reader's own ceiling.
    pub max_record_bytes: usize,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            segment_size: 64 * 1024 * 1024,
            buffered_sync_bytes: 4 * 1024 * 1024,
            max_record_bytes: MAX_RECORD_LEN,
        }
    }
}

impl WalConfig {
    /// Defaults suited to an ingest run: 64 MiB segments, 4 MiB sync window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the segment rotation threshold.
    pub fn with_segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Override the Standard-mode sync window.
    pub fn with_buffered_sync_bytes(mut self, bytes: u64) -> Self {
        self.buffered_sync_bytes = bytes;
        self
    }

    /// Override the per-record ceiling.
    pub fn with_max_record_bytes(mut self, bytes: usize) -> Self {
        self.max_record_bytes = bytes;
        self
    }

    /// Whether a record whose length prefix is `body_len` may be appended.
    pub fn admits(&self, body_len: usize) -> bool {
        body_len <= self.max_record_bytes
    }

    /// Reject combinations the writer or the reader cannot honour.
    pub fn validate(&self) -> Result<(), WalConfigError> {
        if self.segment_size < MIN_SEGMENT_SIZE {
            return Err(WalConfigError::SegmentSizeTooSmall {
                size: self.segment_size,
            });
        }
        if self.buffered_sync_bytes > self.segment_size {
            return Err(WalConfigError::BufferedSyncExceedsSegment {
                buffered: self.buffered_sync_bytes,
                segment: self.segment_size,
            });
        }
        if self.max_record_bytes < MIN_RECORD_LEN || self.max_record_bytes > MAX_RECORD_LEN {
            return Err(WalConfigError::RecordLimitOutOfRange {
                limit: self.max_record_bytes,
            });
        }
        Ok(())
    }

    /// Small segments and a 1 MiB record ceiling, so tests hit rotation
    /// and the record limit without writing much data.
    pub fn for_testing() -> Self {
        WalConfig {
            segment_size: 64 * 1024,
            buffered_sync_bytes: 16 * 1024,
            max_record_bytes: 1024 * 1024,
        }
    }
}

/// Invalid write-ahead log limits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalConfigError {
    /// Segment rotation threshold below [`MIN_SEGMENT_SIZE`].
    #[error("wal segment_size {size} is below the minimum of {} bytes", MIN_SEGMENT_SIZE)]
    SegmentSizeTooSmall {
        /// Configured size
        size: u64,
    },

    /// Sync window larger than a whole segment.
    #[error("wal buffered_sync_bytes {buffered} exceeds segment_size {segment}")]
    BufferedSyncExceedsSegment {
        /// Configured sync window
        buffered: u64,
        /// Configured segment size
        segment: u64,
    },

    /// Record ceiling the reader could not replay, or too small for any batch.
    #[error(
        "wal max_record_bytes {limit} must lie between {} and {}",
        MIN_RECORD_LEN,
        MAX_RECORD_LEN
    )]
    RecordLimitOutOfRange {
        /// Configured ceiling
        limit: usize,
    },
}
