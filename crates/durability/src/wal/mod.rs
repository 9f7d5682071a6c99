//! Write-Ahead Log (WAL) module.
//!
//! - **Segment-based storage**: WAL is split into segments (`wal-NNNNNN.seg`)
//! - **Self-delimiting records**: Each record has length prefix and CRC32 checksum
//! - **Durability modes**: Cache, Always, Standard
//! - **Crash recovery**: Reader handles partial/corrupt records gracefully
//!
//! ```text
//! WAL Directory Structure:
//! wal/
//! ├── wal-000001.seg   (closed, immutable)
//! ├── wal-000002.seg   (closed, immutable)
//! └── wal-000003.seg   (active, writable)
//! ```

pub mod config;
pub mod mode;
pub mod reader;
pub mod record;
pub mod segment;
pub mod writer;

pub use config::{WalConfig, WalConfigError, MIN_SEGMENT_SIZE};
pub use mode::DurabilityMode;
pub use reader::{ReadStopReason, TruncateInfo, WalReadResult, WalReader, WalReaderError};
pub use record::{WalRecord, WalRecordError, MAX_RECORD_LEN, MIN_RECORD_LEN};
pub use segment::{SegmentHeader, WalSegment, SEGMENT_HEADER_SIZE};
pub use writer::{WalCounters, WalWriter};

/// Parse a segment number out of a `wal-NNNNNN.seg` file name.
pub(crate) fn parse_segment_name(name: &str) -> Option<u64> {
    // "wal-" (4) + at least 6 digits + ".seg" (4)
    if name.len() >= 14 && name.starts_with("wal-") && name.ends_with(".seg") {
        name[4..name.len() - 4].parse::<u64>().ok()
    } else {
        None
    }
}

/// List all segment numbers in `wal_dir`, ascending.
pub fn list_segments(wal_dir: &std::path::Path) -> std::io::Result<Vec<u64>> {
    let mut segments = Vec::new();
    if !wal_dir.exists() {
        return Ok(segments);
    }

    for entry in std::fs::read_dir(wal_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(num) = parse_segment_name(&name) {
            segments.push(num);
        }
    }

    segments.sort_unstable();
    Ok(segments)
}
