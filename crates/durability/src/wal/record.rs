//! WAL record format.
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Payload (variable)      │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//!
//! Payload:
//! ┌──────────────┬──────────────┬─────────────────────────────┐
//! │ Seq (8)      │ Timestamp (8)│ Writeset (variable)         │
//! └──────────────┴──────────────┴─────────────────────────────┘
//! ```
//!
//! The length field covers format version, payload and CRC. The CRC covers
//! format version and payload.

use crc32fast::Hasher;

/// Current WAL record format version
pub const WAL_RECORD_FORMAT_VERSION: u8 = 1;

/// Version byte + seq + timestamp
const MIN_PAYLOAD_LEN: usize = 1 + 8 + 8;

/// Smallest length prefix a well-formed record can carry (empty writeset).
pub const MIN_RECORD_LEN: usize = MIN_PAYLOAD_LEN + 4;

/// Upper bound on a single record, used to reject garbage length prefixes.
pub const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

/// One logged mutation group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Sequence number assigned by the store, strictly increasing
    pub seq: u64,
    /// Append time (microseconds since epoch)
    pub timestamp: u64,
    /// Encoded writeset
    pub writeset: Vec<u8>,
}

impl WalRecord {
    /// Create a new WAL record.
    pub fn new(seq: u64, timestamp: u64, writeset: Vec<u8>) -> Self {
        WalRecord {
            seq,
            timestamp,
            writeset,
        }
    }

    /// Value of the length prefix `to_bytes` will write.
    ///
    /// This is the quantity the reader bounds by [`MAX_RECORD_LEN`].
    pub fn body_len(&self) -> usize {
        MIN_RECORD_LEN + self.writeset.len()
    }

    /// Serialize record to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(MIN_PAYLOAD_LEN + self.writeset.len());
        payload.push(WAL_RECORD_FORMAT_VERSION);
        payload.extend_from_slice(&self.seq.to_le_bytes());
        payload.extend_from_slice(&self.timestamp.to_le_bytes());
        payload.extend_from_slice(&self.writeset);

        let crc = compute_crc(&payload);

        let total_len = payload.len() + 4;
        let mut record = Vec::with_capacity(4 + total_len);
        record.extend_from_slice(&(total_len as u32).to_le_bytes());
        record.extend_from_slice(&payload);
        record.extend_from_slice(&crc.to_le_bytes());
        record
    }

    /// Deserialize one record from the front of `bytes`.
    ///
    /// Returns (record, bytes_consumed) on success.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), WalRecordError> {
        let length = Self::declared_len(bytes)?;

        if length < MIN_RECORD_LEN || length > MAX_RECORD_LEN {
            return Err(WalRecordError::InvalidFormat);
        }
        if bytes.len() < 4 + length {
            return Err(WalRecordError::InsufficientData);
        }

        let body = &bytes[4..4 + length];
        let payload = &body[..length - 4];
        let stored_crc = u32::from_le_bytes([
            body[length - 4],
            body[length - 3],
            body[length - 2],
            body[length - 1],
        ]);

        let computed_crc = compute_crc(payload);
        if computed_crc != stored_crc {
            return Err(WalRecordError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        if payload[0] != WAL_RECORD_FORMAT_VERSION {
            return Err(WalRecordError::UnsupportedVersion(payload[0]));
        }

        let mut seq = [0u8; 8];
        seq.copy_from_slice(&payload[1..9]);
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&payload[9..17]);

        let record = WalRecord {
            seq: u64::from_le_bytes(seq),
            timestamp: u64::from_le_bytes(timestamp),
            writeset: payload[MIN_PAYLOAD_LEN..].to_vec(),
        };

        Ok((record, 4 + length))
    }

    /// Length prefix of the record at the front of `bytes`.
    pub fn declared_len(bytes: &[u8]) -> Result<usize, WalRecordError> {
        if bytes.len() < 4 {
            return Err(WalRecordError::InsufficientData);
        }
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// WAL record parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalRecordError {
    /// Not enough data to parse record
    #[error("Insufficient data to parse record")]
    InsufficientData,

    /// Record format is invalid
    #[error("Invalid record format")]
    InvalidFormat,

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected checksum from record
        expected: u32,
        /// Computed checksum
        computed: u32,
    },

    /// Unsupported format version
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),
}
