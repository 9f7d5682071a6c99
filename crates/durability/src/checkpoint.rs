//! Crash-safe checkpoints of the full key space.
//!
//! A checkpoint captures every key-value pair at a WAL sequence watermark so
//! that WAL segments covered by it can be deleted.
//!
//! # Crash Safety
//!
//! 1. Write to temporary file (`.snap-NNNNNN.tmp`)
//! 2. fsync the temporary file
//! 3. Atomic rename to final path (`snap-NNNNNN.chk`)
//! 4. fsync the parent directory
//!
//! Either the complete checkpoint exists or it doesn't.
//!
//! # Layout
//!
//! ```text
//! ┌──────────┬─────────┬─────────────┬───────────┬────────────┬─────────┬─────────────┐
//! │ Magic(4) │ Ver (4) │ Snap id (8) │ Watermark │ Created at │ UUID    │ Count (8)   │
//! │          │         │             │ (8)       │ (8)        │ (16)    │             │
//! ├──────────┴─────────┴─────────────┴───────────┴────────────┴─────────┴─────────────┤
//! │ Entries: key_len (4) | key | value_len (4) | value                                │
//! ├────────────────────────────────────────────────────────────────────────────────────┤
//! │ CRC32 of everything above (4)                                                      │
//! └────────────────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, info};

/// Magic bytes identifying a checkpoint file: "MGCK"
pub const CHECKPOINT_MAGIC: [u8; 4] = *b"MGCK";

/// Current checkpoint format version
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Bytes before the first entry
const HEADER_SIZE: usize = 4 + 4 + 8 + 8 + 8 + 16 + 8;

/// Metadata of a written or loaded checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Checkpoint id (monotonically increasing)
    pub snapshot_id: u64,
    /// Highest WAL sequence included in the checkpoint
    pub watermark: u64,
    /// Creation time (microseconds since epoch)
    pub created_at: u64,
    /// Number of key-value entries
    pub entry_count: u64,
    /// Final path
    pub path: PathBuf,
}

/// A checkpoint read back from disk.
#[derive(Debug)]
pub struct LoadedCheckpoint {
    /// Checkpoint metadata
    pub info: CheckpointInfo,
    /// Entries in ascending key order
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Checkpoint file path: `snap-NNNNNN.chk`.
pub fn checkpoint_path(dir: &Path, snapshot_id: u64) -> PathBuf {
    dir.join(format!("snap-{:06}.chk", snapshot_id))
}

/// List checkpoint ids in `dir`, ascending.
pub fn list_checkpoints(dir: &Path) -> io::Result<Vec<u64>> {
    let mut ids = Vec::new();
    if !dir.exists() {
        return Ok(ids);
    }
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if name.len() >= 15 && name.starts_with("snap-") && name.ends_with(".chk") {
            if let Ok(id) = name[5..name.len() - 4].parse::<u64>() {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Writes checkpoints with write-fsync-rename.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    dir: PathBuf,
    database_uuid: [u8; 16],
}

impl CheckpointWriter {
    /// Create a writer, creating the checkpoint directory if needed.
    ///
    /// Leftover temporary files from an interrupted checkpoint are removed.
    pub fn new(dir: PathBuf, database_uuid: [u8; 16]) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(".snap-") && name.ends_with(".tmp") {
                debug!(file = %name, "Removing stale checkpoint temp file");
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(CheckpointWriter { dir, database_uuid })
    }

    /// Checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a checkpoint of `entries` at `watermark`.
    pub fn write<'a, I>(&self, snapshot_id: u64, watermark: u64, entries: I) -> io::Result<CheckpointInfo>
    where
        I: ExactSizeIterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>,
    {
        let final_path = checkpoint_path(&self.dir, snapshot_id);
        let temp_path = self.dir.join(format!(".snap-{:06}.tmp", snapshot_id));
        let created_at = crate::now_micros();
        let entry_count = entries.len() as u64;

        let mut buf = Vec::with_capacity(HEADER_SIZE + 4);
        buf.extend_from_slice(&CHECKPOINT_MAGIC);
        buf.write_u32::<LittleEndian>(CHECKPOINT_FORMAT_VERSION)?;
        buf.write_u64::<LittleEndian>(snapshot_id)?;
        buf.write_u64::<LittleEndian>(watermark)?;
        buf.write_u64::<LittleEndian>(created_at)?;
        buf.extend_from_slice(&self.database_uuid);
        buf.write_u64::<LittleEndian>(entry_count)?;

        for (key, value) in entries {
            buf.write_u32::<LittleEndian>(key.len() as u32)?;
            buf.extend_from_slice(key);
            buf.write_u32::<LittleEndian>(value.len() as u32)?;
            buf.extend_from_slice(value);
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        buf.write_u32::<LittleEndian>(hasher.finalize())?;

        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, &final_path)?;

        // Persist the rename itself; not every platform can fsync a directory
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        info!(snapshot_id, watermark, entries = entry_count, bytes = buf.len(), "Checkpoint written");

        Ok(CheckpointInfo {
            snapshot_id,
            watermark,
            created_at,
            entry_count,
            path: final_path,
        })
    }

    /// Delete checkpoints older than `keep_from`.
    pub fn remove_before(&self, keep_from: u64) -> io::Result<usize> {
        let mut removed = 0;
        for id in list_checkpoints(&self.dir)? {
            if id < keep_from {
                std::fs::remove_file(checkpoint_path(&self.dir, id))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Reads checkpoints back for recovery.
#[derive(Debug, Clone)]
pub struct CheckpointReader {
    database_uuid: [u8; 16],
}

impl CheckpointReader {
    /// Create a reader that only accepts checkpoints of this database.
    pub fn new(database_uuid: [u8; 16]) -> Self {
        CheckpointReader { database_uuid }
    }

    /// Load the newest checkpoint in `dir`, if any.
    ///
    /// Older checkpoints are never used as a fallback: WAL segments covered
    /// by the newest one may already be gone.
    pub fn load_latest(&self, dir: &Path) -> Result<Option<LoadedCheckpoint>, CheckpointError> {
        match list_checkpoints(dir)?.last() {
            Some(&id) => self.load(dir, id).map(Some),
            None => Ok(None),
        }
    }

    /// Load one checkpoint.
    pub fn load(&self, dir: &Path, snapshot_id: u64) -> Result<LoadedCheckpoint, CheckpointError> {
        let path = checkpoint_path(dir, snapshot_id);
        let mut bytes = Vec::new();
        File::open(&path)?.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_SIZE + 4 {
            return Err(CheckpointError::Truncated(snapshot_id));
        }

        let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
        let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(body);
        if hasher.finalize() != stored_crc {
            return Err(CheckpointError::ChecksumMismatch(snapshot_id));
        }

        let mut cursor = Cursor::new(body);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != CHECKPOINT_MAGIC {
            return Err(CheckpointError::InvalidHeader(snapshot_id));
        }
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != CHECKPOINT_FORMAT_VERSION {
            return Err(CheckpointError::UnsupportedVersion(version));
        }
        let stored_id = cursor.read_u64::<LittleEndian>()?;
        if stored_id != snapshot_id {
            return Err(CheckpointError::InvalidHeader(snapshot_id));
        }
        let watermark = cursor.read_u64::<LittleEndian>()?;
        let created_at = cursor.read_u64::<LittleEndian>()?;
        let mut uuid = [0u8; 16];
        cursor.read_exact(&mut uuid)?;
        if uuid != self.database_uuid {
            return Err(CheckpointError::DatabaseMismatch(snapshot_id));
        }
        let entry_count = cursor.read_u64::<LittleEndian>()?;

        let mut entries = Vec::new();
        for _ in 0..entry_count {
            let key = read_chunk(&mut cursor, snapshot_id)?;
            let value = read_chunk(&mut cursor, snapshot_id)?;
            entries.push((key, value));
        }
        if cursor.position() as usize != body.len() {
            return Err(CheckpointError::Truncated(snapshot_id));
        }

        Ok(LoadedCheckpoint {
            info: CheckpointInfo {
                snapshot_id,
                watermark,
                created_at,
                entry_count,
                path,
            },
            entries,
        })
    }
}

fn read_chunk(cursor: &mut Cursor<&[u8]>, snapshot_id: u64) -> Result<Vec<u8>, CheckpointError> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(CheckpointError::Truncated(snapshot_id));
    }
    let mut chunk = vec![0u8; len];
    cursor.read_exact(&mut chunk)?;
    Ok(chunk)
}

/// Checkpoint errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Footer CRC does not match
    #[error("Checkpoint {0} failed checksum verification")]
    ChecksumMismatch(u64),

    /// Magic bytes or id do not match
    #[error("Checkpoint {0} has an invalid header")]
    InvalidHeader(u64),

    /// Unknown format version
    #[error("Unsupported checkpoint format version: {0}")]
    UnsupportedVersion(u32),

    /// Checkpoint belongs to a different database
    #[error("Checkpoint {0} belongs to a different database")]
    DatabaseMismatch(u64),

    /// Entry data ends early or has trailing bytes
    #[error("Checkpoint {0} is truncated")]
    Truncated(u64),
}
