//! Durability layer for Meghaduta
//!
//! This crate implements the on-disk persistence used by the ordered store:
//! - Segmented write-ahead log (`wal-NNNNNN.seg`) with CRC32-checked records
//! - Durability modes (Cache, Always, Standard)
//! - Writeset codec for atomic write batches
//! - Crash-safe checkpoints (`snap-NNNNNN.chk`) written with write-fsync-rename

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod wal;
pub mod writeset;

pub use checkpoint::{CheckpointError, CheckpointInfo, CheckpointReader, CheckpointWriter, LoadedCheckpoint};
pub use wal::{
    DurabilityMode, ReadStopReason, TruncateInfo, WalConfig, WalConfigError, WalCounters,
    WalReadResult, WalReader, WalReaderError, WalRecord, WalRecordError, WalSegment, WalWriter,
    MAX_RECORD_LEN, MIN_RECORD_LEN,
};
pub use writeset::{decode_writeset, encode_writeset, WritesetError};

/// Current wall-clock time in microseconds since the Unix epoch.
pub(crate) fn now_micros() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}
