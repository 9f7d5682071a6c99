//! WAL corruption detection
//!
//! These tests damage segment files on disk and check what the reader
//! recovers:
//! - CRC32 detects bit flips and the damaged record is skipped
//! - A torn tail stops reading and is reported for truncation
//! - Garbage length prefixes stop reading without panicking

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use meghaduta_core::WriteBatch;
use meghaduta_durability::wal::{list_segments, SEGMENT_HEADER_SIZE};
use meghaduta_durability::{
    decode_writeset, encode_writeset, DurabilityMode, ReadStopReason, WalConfig, WalReader,
    WalRecord, WalSegment, WalWriter,
};
use tempfile::TempDir;

const UUID: [u8; 16] = [7; 16];

fn record(seq: u64, key: &str, value: &str) -> WalRecord {
    let mut batch = WriteBatch::new();
    batch.put(key, value);
    WalRecord::new(seq, seq * 10, encode_writeset(&batch))
}

/// Append `records` to a fresh WAL and return the path of its only segment.
fn write_wal(dir: &Path, records: &[WalRecord]) -> PathBuf {
    let mut writer =
        WalWriter::new(dir.to_path_buf(), UUID, DurabilityMode::Always, WalConfig::for_testing())
            .unwrap();
    for record in records {
        writer.append(record).unwrap();
    }
    writer.close().unwrap();

    let segments = list_segments(dir).unwrap();
    assert_eq!(segments.len(), 1);
    WalSegment::segment_path(dir, segments[0])
}

fn flip_byte(path: &Path, offset: u64) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    let mut buf = [0u8; 1];
    file.read_exact(&mut buf).unwrap();
    buf[0] ^= 0xFF;
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&buf).unwrap();
    file.sync_all().unwrap();
}

#[test]
fn test_crc_detects_bit_flip() {
    let dir = TempDir::new().unwrap();
    let records = vec![record(1, "a", "1"), record(2, "b", "2"), record(3, "c", "3")];
    let path = write_wal(dir.path(), &records);

    // Somewhere inside the second record's payload
    let second = SEGMENT_HEADER_SIZE as u64 + records[0].to_bytes().len() as u64;
    flip_byte(&path, second + 10);

    let read = WalReader::for_database(UUID).read_all(dir.path()).unwrap();
    assert_eq!(read.skipped_corrupted, 1);
    let seqs: Vec<u64> = read.records.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![1, 3]);
}

#[test]
fn test_torn_tail_reported_for_truncation() {
    let dir = TempDir::new().unwrap();
    let records = vec![record(1, "a", "1"), record(2, "b", "2")];
    let path = write_wal(dir.path(), &records);

    let full = std::fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(full - 3).unwrap();

    let read = WalReader::for_database(UUID).read_all(dir.path()).unwrap();
    assert_eq!(read.records.len(), 1);
    assert_eq!(read.stop_reason, ReadStopReason::PartialRecord);

    let truncate = read.truncate_info.unwrap();
    assert_eq!(truncate.original_size, full - 3);
    assert_eq!(
        truncate.valid_end,
        SEGMENT_HEADER_SIZE as u64 + records[0].to_bytes().len() as u64
    );
}

#[test]
fn test_garbage_length_stops_reading() {
    let dir = TempDir::new().unwrap();
    let path = write_wal(dir.path(), &[record(1, "a", "1")]);

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&u32::MAX.to_le_bytes()).unwrap();
    file.write_all(&[0xAB; 32]).unwrap();
    file.sync_all().unwrap();

    let read = WalReader::for_database(UUID).read_all(dir.path()).unwrap();
    assert_eq!(read.records.len(), 1);
    assert!(matches!(read.stop_reason, ReadStopReason::ParseError { .. }));
}

#[test]
fn test_writeset_survives_wal_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut batch = WriteBatch::new();
    batch
        .put("u1\u{1f}name", "Ann")
        .put("u1\u{1f}lastUpdatedAt", "42");
    write_wal(dir.path(), &[WalRecord::new(1, 0, encode_writeset(&batch))]);

    let read = WalReader::for_database(UUID).read_all(dir.path()).unwrap();
    assert_eq!(read.records.len(), 1);
    assert_eq!(decode_writeset(&read.records[0].writeset).unwrap(), batch);
}

#[test]
fn test_records_read_in_order_across_rotation() {
    let dir = TempDir::new().unwrap();
    let config = WalConfig::new()
        .with_segment_size(1024)
        .with_buffered_sync_bytes(512);
    let mut writer =
        WalWriter::new(dir.path().to_path_buf(), UUID, DurabilityMode::Always, config).unwrap();
    for seq in 1..=100 {
        writer.append(&record(seq, &format!("key-{}", seq), "value")).unwrap();
    }
    writer.close().unwrap();

    assert!(list_segments(dir.path()).unwrap().len() > 1);
    let read = WalReader::for_database(UUID).read_all(dir.path()).unwrap();
    let seqs: Vec<u64> = read.records.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, (1..=100).collect::<Vec<_>>());
    assert_eq!(read.stop_reason, ReadStopReason::EndOfData);
}

#[test]
fn test_foreign_segment_rejected() {
    let dir = TempDir::new().unwrap();
    write_wal(dir.path(), &[record(1, "a", "1")]);

    assert!(WalReader::for_database([9; 16]).read_all(dir.path()).is_err());
    assert_eq!(WalReader::new().read_all(dir.path()).unwrap().records.len(), 1);
}
