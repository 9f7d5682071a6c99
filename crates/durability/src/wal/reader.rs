//! WAL reader for recovery and replay.
//!
//! Reads records segment by segment, stopping cleanly at a torn tail and
//! skipping records whose checksum fails but whose length is still usable.

use std::path::Path;

use tracing::warn;

use super::record::{WalRecord, WalRecordError, MAX_RECORD_LEN};
use super::segment::{WalSegment, SEGMENT_HEADER_SIZE};

/// WAL reader for iterating over records in segments.
#[derive(Debug, Clone, Default)]
pub struct WalReader {
    /// When set, every segment must carry this database UUID
    expected_uuid: Option<[u8; 16]>,
}

/// Records read from one segment plus where and why reading stopped.
#[derive(Debug)]
pub struct SegmentRead {
    /// Valid records, in file order
    pub records: Vec<WalRecord>,
    /// Byte position where valid records end
    pub valid_end: u64,
    /// Why reading stopped
    pub stop_reason: ReadStopReason,
    /// Records skipped because of checksum mismatches
    pub skipped_corrupted: usize,
}

impl WalReader {
    /// Create a reader that accepts segments from any database.
    pub fn new() -> Self {
        WalReader::default()
    }

    /// Create a reader that rejects segments stamped with another database UUID.
    pub fn for_database(database_uuid: [u8; 16]) -> Self {
        WalReader {
            expected_uuid: Some(database_uuid),
        }
    }

    /// Read all records from a single segment.
    pub fn read_segment(
        &self,
        wal_dir: &Path,
        segment_number: u64,
    ) -> Result<SegmentRead, WalReaderError> {
        let mut segment = WalSegment::open_read(wal_dir, segment_number)
            .map_err(|e| WalReaderError::IoError(e.to_string()))?;

        if let Some(expected) = self.expected_uuid {
            if segment.database_uuid() != expected {
                return Err(WalReaderError::DatabaseMismatch(segment_number));
            }
        }

        let buffer = segment
            .read_body()
            .map_err(|e| WalReaderError::IoError(e.to_string()))?;

        Ok(Self::parse_records(&buffer))
    }

    fn parse_records(buffer: &[u8]) -> SegmentRead {
        let hdr_size = SEGMENT_HEADER_SIZE as u64;
        let mut records = Vec::new();
        let mut valid_end = hdr_size;
        let mut offset = 0;
        let mut stop_reason = ReadStopReason::EndOfData;
        let mut skipped_corrupted = 0usize;

        while offset < buffer.len() {
            let remaining = &buffer[offset..];

            match WalRecord::from_bytes(remaining) {
                Ok((record, consumed)) => {
                    records.push(record);
                    offset += consumed;
                    valid_end = hdr_size + offset as u64;
                }
                Err(WalRecordError::InsufficientData) => {
                    // Partial record at end - expected after a crash
                    stop_reason = ReadStopReason::PartialRecord;
                    break;
                }
                Err(WalRecordError::ChecksumMismatch { .. }) => {
                    // Skip the corrupted record if its length is still believable
                    if let Ok(record_len) = WalRecord::declared_len(remaining) {
                        if record_len > 0
                            && record_len < MAX_RECORD_LEN
                            && remaining.len() >= 4 + record_len
                        {
                            warn!(offset = offset, "Skipping corrupted WAL record (checksum mismatch)");
                            offset += 4 + record_len;
                            valid_end = hdr_size + offset as u64;
                            skipped_corrupted += 1;
                            continue;
                        }
                    }
                    stop_reason = ReadStopReason::ChecksumMismatch { offset };
                    break;
                }
                Err(e) => {
                    stop_reason = ReadStopReason::ParseError {
                        offset,
                        detail: e.to_string(),
                    };
                    break;
                }
            }
        }

        SegmentRead {
            records,
            valid_end,
            stop_reason,
            skipped_corrupted,
        }
    }

    /// Read all records from all segments in a WAL directory, in order.
    pub fn read_all(&self, wal_dir: &Path) -> Result<WalReadResult, WalReaderError> {
        let segments =
            super::list_segments(wal_dir).map_err(|e| WalReaderError::IoError(e.to_string()))?;

        let mut all_records = Vec::new();
        let mut truncate_info = None;
        let mut last_stop_reason = ReadStopReason::EndOfData;
        let mut total_skipped_corrupted = 0usize;

        for (idx, segment_num) in segments.iter().enumerate() {
            let read = self.read_segment(wal_dir, *segment_num)?;
            all_records.extend(read.records);
            total_skipped_corrupted += read.skipped_corrupted;

            // Only the last (active) segment may carry a torn tail
            if idx == segments.len() - 1 {
                let original_size = std::fs::metadata(WalSegment::segment_path(wal_dir, *segment_num))
                    .map_err(|e| WalReaderError::IoError(e.to_string()))?
                    .len();
                if read.valid_end < original_size {
                    truncate_info = Some(TruncateInfo {
                        segment_number: *segment_num,
                        valid_end: read.valid_end,
                        original_size,
                    });
                }
            } else if read.stop_reason != ReadStopReason::EndOfData {
                warn!(
                    segment = *segment_num,
                    reason = ?read.stop_reason,
                    "Closed WAL segment ended early"
                );
            }
            last_stop_reason = read.stop_reason;
        }

        Ok(WalReadResult {
            records: all_records,
            truncate_info,
            stop_reason: last_stop_reason,
            skipped_corrupted: total_skipped_corrupted,
        })
    }
}

/// Reason why record reading stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStopReason {
    /// Successfully read all records to end of data
    EndOfData,
    /// Partial record at end of segment (expected after crash)
    PartialRecord,
    /// CRC mismatch where the record boundary could not be recovered
    ChecksumMismatch {
        /// Byte offset (after the header) where the mismatch was detected
        offset: usize,
    },
    /// CRC was valid but the payload could not be parsed
    ParseError {
        /// Byte offset (after the header) where parsing failed
        offset: usize,
        /// Human-readable error description
        detail: String,
    },
}

/// Result of reading all WAL segments.
#[derive(Debug)]
pub struct WalReadResult {
    /// All valid records in order
    pub records: Vec<WalRecord>,
    /// Truncation needed on the active segment (if any)
    pub truncate_info: Option<TruncateInfo>,
    /// Why reading of the last segment stopped
    pub stop_reason: ReadStopReason,
    /// Number of corrupted records that were skipped
    pub skipped_corrupted: usize,
}

/// Information about a segment that needs truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateInfo {
    /// Segment number
    pub segment_number: u64,
    /// Position where valid data ends
    pub valid_end: u64,
    /// Original file size
    pub original_size: u64,
}

impl TruncateInfo {
    /// Number of bytes that need to be truncated.
    pub fn bytes_to_truncate(&self) -> u64 {
        self.original_size - self.valid_end
    }
}

/// WAL reader errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalReaderError {
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),

    /// Segment belongs to a different database
    #[error("Segment {0} belongs to a different database")]
    DatabaseMismatch(u64),
}
