//! MANIFEST file
//!
//! Holds the identity of a database directory. WAL segments and checkpoints
//! are stamped with this UUID so files from another database are never
//! replayed into this one.
//!
//! # Format
//!
//! ```text
//! +------------------+
//! | Magic: "MGDM"    | 4 bytes
//! | Format Version   | 4 bytes (u32 LE)
//! | Database UUID    | 16 bytes
//! | CRC32            | 4 bytes
//! +------------------+
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use tracing::info;

/// MANIFEST magic bytes: "MGDM"
pub const MANIFEST_MAGIC: [u8; 4] = *b"MGDM";

/// Current MANIFEST format version
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

const MANIFEST_SIZE: usize = 4 + 4 + 16 + 4;

/// Identity of a database directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manifest {
    /// Format version
    pub format_version: u32,
    /// Unique database identifier (generated on creation)
    pub database_uuid: [u8; 16],
}

impl Manifest {
    /// Load the manifest at `path`, creating one with a fresh UUID if absent.
    pub fn load_or_create(path: &Path) -> io::Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let manifest = Manifest {
            format_version: MANIFEST_FORMAT_VERSION,
            database_uuid: *uuid::Uuid::new_v4().as_bytes(),
        };
        manifest.write(path)?;
        info!(
            path = %path.display(),
            uuid = %uuid::Uuid::from_bytes(manifest.database_uuid),
            "Created database manifest"
        );
        Ok(manifest)
    }

    /// Load an existing manifest.
    pub fn load(path: &Path) -> io::Result<Self> {
        let mut bytes = Vec::with_capacity(MANIFEST_SIZE);
        File::open(path)?.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    fn write(&self, path: &Path) -> io::Result<()> {
        let temp_path = path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            file.write_all(&self.to_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, path)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MANIFEST_SIZE);
        bytes.extend_from_slice(&MANIFEST_MAGIC);
        bytes.extend_from_slice(&self.format_version.to_le_bytes());
        bytes.extend_from_slice(&self.database_uuid);
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() != MANIFEST_SIZE {
            return Err(invalid("MANIFEST has the wrong size"));
        }
        let (body, crc_bytes) = bytes.split_at(MANIFEST_SIZE - 4);
        let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(body) != stored_crc {
            return Err(invalid("MANIFEST checksum mismatch"));
        }
        if body[0..4] != MANIFEST_MAGIC {
            return Err(invalid("MANIFEST has invalid magic"));
        }
        let format_version = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
        if format_version != MANIFEST_FORMAT_VERSION {
            return Err(invalid("unsupported MANIFEST format version"));
        }
        let mut database_uuid = [0u8; 16];
        database_uuid.copy_from_slice(&body[8..24]);

        Ok(Manifest {
            format_version,
            database_uuid,
        })
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
