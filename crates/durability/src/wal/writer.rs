//! WAL writer with durability mode support.
//!
//! The writer appends records to the active segment, rotates segments when
//! they fill up, and fsyncs according to the configured [`DurabilityMode`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, warn};

use super::config::WalConfig;
use super::mode::DurabilityMode;
use super::record::WalRecord;
use super::segment::{WalSegment, SEGMENT_HEADER_SIZE};

/// Cumulative WAL operation counters.
///
/// These counters accumulate over the lifetime of the WalWriter
/// and are never reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalCounters {
    /// Total WAL record appends
    pub wal_appends: u64,
    /// Total sync/fsync calls
    pub sync_calls: u64,
    /// Total bytes written to WAL segments
    pub bytes_written: u64,
    /// Total segment rotations
    pub rotations: u64,
}

/// WAL writer with configurable durability modes.
pub struct WalWriter {
    /// Current active segment (None when DurabilityMode::Cache)
    segment: Option<WalSegment>,
    durability: DurabilityMode,
    wal_dir: PathBuf,
    database_uuid: [u8; 16],
    config: WalConfig,
    bytes_since_sync: u64,
    writes_since_sync: usize,
    last_sync_time: Instant,
    current_segment_number: u64,
    has_unsynced_data: bool,
    counters: WalCounters,
}

impl WalWriter {
    /// Create a new WAL writer.
    ///
    /// If the WAL directory already holds segments, the writer appends to the
    /// latest one when it belongs to this database, and otherwise starts a
    /// new segment after it.
    pub fn new(
        wal_dir: PathBuf,
        database_uuid: [u8; 16],
        durability: DurabilityMode,
        config: WalConfig,
    ) -> io::Result<Self> {
        let mut writer = WalWriter {
            segment: None,
            durability,
            wal_dir,
            database_uuid,
            config,
            bytes_since_sync: 0,
            writes_since_sync: 0,
            last_sync_time: Instant::now(),
            current_segment_number: 0,
            has_unsynced_data: false,
            counters: WalCounters::default(),
        };

        // Cache mode never touches the filesystem
        if !durability.requires_wal() {
            return Ok(writer);
        }

        std::fs::create_dir_all(&writer.wal_dir)?;

        let (segment, number) = match super::list_segments(&writer.wal_dir)?.last().copied() {
            Some(num) => match WalSegment::open_append(&writer.wal_dir, num) {
                Ok(seg) if seg.database_uuid() == database_uuid => (seg, num),
                _ => {
                    let seg = WalSegment::create(&writer.wal_dir, num + 1, database_uuid)?;
                    (seg, num + 1)
                }
            },
            None => (WalSegment::create(&writer.wal_dir, 1, database_uuid)?, 1),
        };

        debug!(segment = number, dir = %writer.wal_dir.display(), "WAL writer opened");
        writer.segment = Some(segment);
        writer.current_segment_number = number;
        Ok(writer)
    }

    /// Append a record to the WAL.
    ///
    /// - `Cache`: no-op
    /// - `Always`: writes and fsyncs before returning
    /// - `Standard`: writes, fsyncs once a batch/byte/time threshold is crossed
    ///
    /// Records longer than the configured `max_record_bytes` are refused with
    /// `InvalidInput` in every mode and nothing is written. If the write or
    /// its fsync fails, the segment is cut back to where the record started.
    pub fn append(&mut self, record: &WalRecord) -> io::Result<()> {
        let body_len = record.body_len();
        if !self.config.admits(body_len) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "WAL record of {} bytes exceeds the limit of {} bytes",
                    body_len, self.config.max_record_bytes
                ),
            ));
        }

        if !self.durability.requires_wal() {
            return Ok(());
        }

        let encoded = record.to_bytes();

        let lost_segment = self.segment.as_ref().map_or(true, WalSegment::is_closed);
        if lost_segment
            || (self.current_segment_size() + encoded.len() as u64 > self.config.segment_size
                && self.current_segment_size() > SEGMENT_HEADER_SIZE as u64)
        {
            self.rotate()?;
        }

        let start = self.current_segment_size();
        let result = match self.active_segment()?.write(&encoded) {
            Ok(()) => {
                self.counters.wal_appends += 1;
                self.counters.bytes_written += encoded.len() as u64;
                self.bytes_since_sync += encoded.len() as u64;
                self.writes_since_sync += 1;
                self.has_unsynced_data = true;
                self.maybe_sync()
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if let Some(segment) = self.segment.as_mut() {
                if let Err(truncate_err) = segment.truncate(start) {
                    warn!(
                        segment = self.current_segment_number,
                        position = start,
                        error = %truncate_err,
                        "could not cut back failed WAL append"
                    );
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Largest record length prefix this writer accepts.
    pub fn max_record_bytes(&self) -> usize {
        self.config.max_record_bytes
    }

    fn active_segment(&mut self) -> io::Result<&mut WalSegment> {
        self.segment
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "WAL has no active segment"))
    }

    fn maybe_sync(&mut self) -> io::Result<()> {
        match self.durability {
            DurabilityMode::Always => self.flush(),
            DurabilityMode::Standard {
                interval_ms,
                batch_size,
            } => {
                if self.writes_since_sync >= batch_size
                    || self.bytes_since_sync >= self.config.buffered_sync_bytes
                    || self.last_sync_time.elapsed().as_millis() as u64 >= interval_ms
                {
                    self.flush()?;
                }
                Ok(())
            }
            DurabilityMode::Cache => Ok(()),
        }
    }

    fn reset_sync_counters(&mut self) {
        self.bytes_since_sync = 0;
        self.writes_since_sync = 0;
        self.last_sync_time = Instant::now();
        self.has_unsynced_data = false;
    }

    /// Close the active segment and start a new one.
    ///
    /// Returns the number of the new active segment. A no-op in Cache mode.
    /// If the new segment cannot be created the writer is left without one
    /// and the next append retries the rotation.
    pub fn rotate(&mut self) -> io::Result<u64> {
        if !self.durability.requires_wal() {
            return Ok(self.current_segment_number);
        }

        if let Some(mut segment) = self.segment.take() {
            if !segment.is_closed() {
                segment.close()?;
                self.counters.sync_calls += 1;
            }
        }

        let next = self.current_segment_number + 1;
        let new_segment = WalSegment::create(&self.wal_dir, next, self.database_uuid)?;

        self.segment = Some(new_segment);
        self.current_segment_number = next;
        self.counters.rotations += 1;
        self.reset_sync_counters();
        debug!(segment = next, "WAL segment rotated");
        Ok(next)
    }

    /// Force any written data to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(ref mut segment) = self.segment {
            if self.has_unsynced_data {
                segment.sync()?;
                self.counters.sync_calls += 1;
            }
        }
        self.reset_sync_counters();
        Ok(())
    }

    /// Sync if the Standard interval has elapsed and there is unsynced data.
    ///
    /// Returns `true` if a sync was performed.
    pub fn sync_if_overdue(&mut self) -> io::Result<bool> {
        if !self.has_unsynced_data {
            return Ok(false);
        }

        if let DurabilityMode::Standard { interval_ms, .. } = self.durability {
            if self.last_sync_time.elapsed().as_millis() as u64 >= interval_ms {
                self.flush()?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Delete closed segments numbered `<= through`. The active segment is kept.
    ///
    /// Returns how many segment files were removed.
    pub fn remove_segments_through(&mut self, through: u64) -> io::Result<usize> {
        let mut removed = 0;
        for num in super::list_segments(&self.wal_dir)? {
            if num <= through && num != self.current_segment_number {
                std::fs::remove_file(WalSegment::segment_path(&self.wal_dir, num))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Current active segment number (0 in Cache mode).
    pub fn current_segment(&self) -> u64 {
        self.current_segment_number
    }

    /// Current active segment size in bytes.
    pub fn current_segment_size(&self) -> u64 {
        self.segment
            .as_ref()
            .map(WalSegment::size)
            .unwrap_or(SEGMENT_HEADER_SIZE as u64)
    }

    /// Snapshot of cumulative WAL counters.
    pub fn counters(&self) -> WalCounters {
        self.counters.clone()
    }

    /// Durability mode of this writer.
    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    /// WAL directory path.
    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }

    /// Close the writer, ensuring all data is flushed.
    pub fn close(mut self) -> io::Result<()> {
        self.flush()?;
        if let Some(ref mut segment) = self.segment {
            segment.close()?;
        }
        Ok(())
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if self.has_unsynced_data {
            if let Some(ref mut segment) = self.segment {
                let _ = segment.sync();
            }
        }
    }
}
