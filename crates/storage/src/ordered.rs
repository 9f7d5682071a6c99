//! OrderedStore: durable sorted byte-key engine
//!
//! This module implements [`KvEngine`] using:
//! - `BTreeMap<Vec<u8>, Vec<u8>>` for bytewise-ordered keys
//! - `parking_lot::RwLock` for concurrent readers and exclusive writers
//! - A segmented WAL for durability, one record per write batch
//! - Checkpoints that let covered WAL segments be deleted
//!
//! # Directory Layout
//!
//! ```text
//! <root>/
//!   MANIFEST              database UUID
//!   wal/wal-NNNNNN.seg    WAL segments
//!   snapshots/snap-NNNNNN.chk
//! ```
//!
//! # Write Path
//!
//! Writers serialize on the WAL mutex: a batch is assigned the next sequence
//! number, appended to the WAL, then applied to the map under the write lock.
//! Lock order is always WAL then map, so the map never reflects a batch the
//! WAL has not accepted.
//!
//! # Recovery
//!
//! Open loads the newest checkpoint, replays WAL records with a sequence
//! above its watermark, and truncates a torn tail on the last segment.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use meghaduta_core::{Error, KvEngine, Result, WriteBatch};
use meghaduta_durability::checkpoint::list_checkpoints;
use meghaduta_durability::{
    decode_writeset, encode_writeset, CheckpointInfo, CheckpointReader, CheckpointWriter,
    DurabilityMode, WalConfig, WalCounters, WalReader, WalRecord, WalSegment, WalWriter,
};

use crate::config::StorageConfig;
use crate::manifest::Manifest;

/// MANIFEST file name
pub const MANIFEST_FILE: &str = "MANIFEST";
/// WAL directory name
pub const WAL_DIR: &str = "wal";
/// Checkpoint directory name
pub const SNAPSHOTS_DIR: &str = "snapshots";

type KeyMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Point-in-time statistics of an [`OrderedStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of keys held
    pub entries: usize,
    /// Sequence number of the last applied write batch
    pub last_seq: u64,
    /// Point reads served
    pub reads: u64,
    /// Write batches applied (single puts count as one)
    pub writes: u64,
    /// Prefix scans served
    pub scans: u64,
    /// WAL counters (zero when closed or in Cache mode)
    pub wal: WalCounters,
    /// Most recent checkpoint written or loaded
    pub last_checkpoint: Option<CheckpointInfo>,
}

#[derive(Default)]
struct OpCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    scans: AtomicU64,
}

/// State rebuilt from disk at open.
struct Recovered {
    data: KeyMap,
    last_seq: u64,
    next_snapshot_id: u64,
    last_checkpoint: Option<CheckpointInfo>,
}

/// Durable, thread-safe sorted byte-key store.
pub struct OrderedStore {
    /// Ordered key space
    data: Arc<RwLock<KeyMap>>,
    /// WAL writer; `None` once closed
    wal: Mutex<Option<WalWriter>>,
    /// Checkpoint writer; `None` for in-memory stores
    checkpoints: Option<CheckpointWriter>,
    /// Serializes checkpoints
    checkpoint_lock: Mutex<()>,
    root: Option<PathBuf>,
    database_uuid: [u8; 16],
    durability: DurabilityMode,
    last_seq: AtomicU64,
    next_snapshot_id: AtomicU64,
    last_checkpoint: Mutex<Option<CheckpointInfo>>,
    closed: AtomicBool,
    counters: OpCounters,
}

impl OrderedStore {
    /// Open (or create) a store rooted at `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the WAL configuration is invalid
    /// - [`Error::StoreUnavailable`] if the directory cannot be created, the
    ///   manifest is corrupt, or the newest checkpoint fails verification
    pub fn open(path: impl AsRef<Path>, config: StorageConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let manifest = Manifest::load_or_create(&root.join(MANIFEST_FILE))?;
        let database_uuid = manifest.database_uuid;
        let wal_dir = root.join(WAL_DIR);
        let snapshots_dir = root.join(SNAPSHOTS_DIR);

        let recovered = recover(&wal_dir, &snapshots_dir, database_uuid)?;
        let checkpoints = CheckpointWriter::new(snapshots_dir, database_uuid)?;
        let wal = WalWriter::new(wal_dir, database_uuid, config.durability, config.wal_config)?;

        info!(
            path = %root.display(),
            durability = %config.durability,
            entries = recovered.data.len(),
            last_seq = recovered.last_seq,
            "Ordered store opened"
        );

        Ok(OrderedStore {
            data: Arc::new(RwLock::new(recovered.data)),
            wal: Mutex::new(Some(wal)),
            checkpoints: Some(checkpoints),
            checkpoint_lock: Mutex::new(()),
            root: Some(root),
            database_uuid,
            durability: config.durability,
            last_seq: AtomicU64::new(recovered.last_seq),
            next_snapshot_id: AtomicU64::new(recovered.next_snapshot_id),
            last_checkpoint: Mutex::new(recovered.last_checkpoint),
            closed: AtomicBool::new(false),
            counters: OpCounters::default(),
        })
    }

    /// Create a store that never touches the filesystem.
    pub fn in_memory() -> Self {
        let database_uuid = *uuid::Uuid::new_v4().as_bytes();
        // Cache mode never creates segments, so this cannot fail
        let wal = WalWriter::new(
            PathBuf::new(),
            database_uuid,
            DurabilityMode::Cache,
            WalConfig::default(),
        )
        .ok();

        OrderedStore {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            wal: Mutex::new(wal),
            checkpoints: None,
            checkpoint_lock: Mutex::new(()),
            root: None,
            database_uuid,
            durability: DurabilityMode::Cache,
            last_seq: AtomicU64::new(0),
            next_snapshot_id: AtomicU64::new(1),
            last_checkpoint: Mutex::new(None),
            closed: AtomicBool::new(false),
            counters: OpCounters::default(),
        }
    }

    /// Root directory (`None` for in-memory stores).
    pub fn path(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Durability mode the store was opened with.
    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    /// Database UUID stamped on WAL segments and checkpoints.
    pub fn database_uuid(&self) -> [u8; 16] {
        self.database_uuid
    }

    /// Sequence number of the last applied write batch.
    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::Acquire)
    }

    /// True once [`close`](KvEngine::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Force buffered WAL data to disk.
    pub fn sync(&self) -> Result<()> {
        let mut wal = self.wal.lock();
        let writer = wal.as_mut().ok_or_else(closed_error)?;
        writer.flush()?;
        Ok(())
    }

    /// Write a checkpoint of the whole key space and drop what it covers.
    ///
    /// The active WAL segment is rotated first, so every closed segment is
    /// covered by the checkpoint and can be deleted along with older
    /// checkpoints. Returns `None` for in-memory stores.
    pub fn checkpoint(&self) -> Result<Option<CheckpointInfo>> {
        self.ensure_open()?;
        let Some(checkpoints) = &self.checkpoints else {
            return Ok(None);
        };
        let _guard = self.checkpoint_lock.lock();

        let (watermark, covered_through, snapshot) = {
            let mut wal = self.wal.lock();
            let writer = wal.as_mut().ok_or_else(closed_error)?;
            writer.flush()?;
            let covered_through = writer.current_segment();
            writer.rotate()?;
            let snapshot = self.data.read().clone();
            (self.last_seq(), covered_through, snapshot)
        };

        let snapshot_id = self.next_snapshot_id.fetch_add(1, Ordering::AcqRel);
        let info = checkpoints.write(snapshot_id, watermark, snapshot.iter())?;
        let removed_checkpoints = checkpoints.remove_before(snapshot_id)?;

        let removed_segments = match self.wal.lock().as_mut() {
            Some(writer) if self.durability.requires_wal() => {
                writer.remove_segments_through(covered_through)?
            }
            _ => 0,
        };

        debug!(
            snapshot_id,
            watermark,
            removed_checkpoints,
            removed_segments,
            "Checkpoint complete"
        );
        *self.last_checkpoint.lock() = Some(info.clone());
        Ok(Some(info))
    }

    /// Current statistics.
    pub fn stats(&self) -> StoreStats {
        let wal = self
            .wal
            .lock()
            .as_ref()
            .map(WalWriter::counters)
            .unwrap_or_default();

        StoreStats {
            entries: self.data.read().len(),
            last_seq: self.last_seq(),
            reads: self.counters.reads.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            scans: self.counters.scans.load(Ordering::Relaxed),
            wal,
            last_checkpoint: self.last_checkpoint.lock().clone(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(closed_error())
        } else {
            Ok(())
        }
    }

    fn apply(&self, batch: WriteBatch) -> Result<()> {
        self.ensure_open()?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut wal = self.wal.lock();
        let writer = wal.as_mut().ok_or_else(closed_error)?;

        let seq = self.last_seq() + 1;
        let timestamp = chrono::Utc::now().timestamp_micros().max(0) as u64;
        let record = WalRecord::new(seq, timestamp, encode_writeset(&batch));

        let body_len = record.body_len();
        if body_len > writer.max_record_bytes() {
            return Err(Error::store_unavailable(format!(
                "write batch of {} bytes exceeds the WAL record limit of {} bytes",
                body_len,
                writer.max_record_bytes()
            )));
        }

        if let Err(e) = writer.append(&record) {
            // The seq may have reached disk; never hand it out again
            self.last_seq.store(seq, Ordering::Release);
            warn!(seq, error = %e, "WAL append failed");
            if let Err(rotate_err) = writer.rotate() {
                warn!(error = %rotate_err, "WAL rotation after failed append also failed");
            }
            return Err(Error::store_unavailable(e));
        }

        self.last_seq.store(seq, Ordering::Release);
        let mut data = self.data.write();
        for (key, value) in batch.into_puts() {
            data.insert(key, value);
        }
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl KvEngine for OrderedStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.put(key, value);
        self.apply(batch)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        self.apply(batch)
    }

    fn sync_if_overdue(&self) -> Result<bool> {
        let mut wal = self.wal.lock();
        match wal.as_mut() {
            Some(writer) => Ok(writer.sync_if_overdue()?),
            None => Ok(false),
        }
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.ensure_open()?;
        self.counters.scans.fetch_add(1, Ordering::Relaxed);

        let data = self.data.read();
        Ok(data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let writer = self.wal.lock().take();
        if let Some(writer) = writer {
            writer.close()?;
        }
        info!(last_seq = self.last_seq(), "Ordered store closed");
        Ok(())
    }
}

impl fmt::Debug for OrderedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedStore")
            .field("root", &self.root)
            .field("durability", &self.durability)
            .field("last_seq", &self.last_seq())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn closed_error() -> Error {
    Error::store_unavailable("store is closed")
}

fn recover(wal_dir: &Path, snapshots_dir: &Path, database_uuid: [u8; 16]) -> Result<Recovered> {
    let mut data = KeyMap::new();
    let mut watermark = 0;
    let mut last_checkpoint = None;

    if let Some(loaded) = CheckpointReader::new(database_uuid)
        .load_latest(snapshots_dir)
        .map_err(Error::store_unavailable)?
    {
        debug!(
            snapshot_id = loaded.info.snapshot_id,
            watermark = loaded.info.watermark,
            entries = loaded.entries.len(),
            "Loaded checkpoint"
        );
        watermark = loaded.info.watermark;
        data.extend(loaded.entries);
        last_checkpoint = Some(loaded.info);
    }
    let next_snapshot_id = list_checkpoints(snapshots_dir)?
        .last()
        .map_or(1, |id| id + 1);

    let read = WalReader::for_database(database_uuid)
        .read_all(wal_dir)
        .map_err(Error::store_unavailable)?;
    if read.skipped_corrupted > 0 {
        warn!(
            skipped = read.skipped_corrupted,
            "Skipped corrupted WAL records during recovery"
        );
    }

    let mut last_seq = watermark;
    let mut replayed = 0usize;
    for record in read.records {
        if record.seq <= watermark {
            continue;
        }
        let batch = decode_writeset(&record.writeset).map_err(|e| {
            Error::store_unavailable(format!("WAL record {} is unreadable: {}", record.seq, e))
        })?;
        for (key, value) in batch.into_puts() {
            data.insert(key, value);
        }
        last_seq = last_seq.max(record.seq);
        replayed += 1;
    }

    if let Some(truncate) = read.truncate_info {
        warn!(
            segment = truncate.segment_number,
            bytes = truncate.bytes_to_truncate(),
            "Truncating torn WAL tail"
        );
        let mut segment = WalSegment::open_append(wal_dir, truncate.segment_number)?;
        segment.truncate(truncate.valid_end)?;
    }

    debug!(replayed, last_seq, "WAL replay complete");
    Ok(Recovered {
        data,
        last_seq,
        next_snapshot_id,
        last_checkpoint,
    })
}
