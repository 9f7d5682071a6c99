//! Writeset serialization format.
//!
//! A writeset holds every put of one [`WriteBatch`] so that the batch is
//! logged, and recovered, as a single WAL record.
//!
//! ```text
//! Writeset Layout:
//! ┌──────────────────┬──────────────────────────────────────────────┐
//! │ Count (4 bytes)  │ Mutations (variable)                         │
//! └──────────────────┴──────────────────────────────────────────────┘
//!
//! Mutation Layout:
//! ┌────────────┬──────────────┬───────┬────────────────┬─────────┐
//! │ Tag (1)    │ Key len (4)  │ Key   │ Value len (4)  │ Value   │
//! └────────────┴──────────────┴───────┴────────────────┴─────────┘
//! ```

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use meghaduta_core::WriteBatch;

/// Mutation tag for a put
const MUTATION_PUT: u8 = 0x01;

/// Encode a batch into writeset bytes.
pub fn encode_writeset(batch: &WriteBatch) -> Vec<u8> {
    let size: usize = batch
        .puts()
        .iter()
        .map(|(k, v)| 9 + k.len() + v.len())
        .sum();
    let mut buf = Vec::with_capacity(4 + size);

    buf.extend_from_slice(&(batch.len() as u32).to_le_bytes());
    for (key, value) in batch.puts() {
        buf.push(MUTATION_PUT);
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buf.extend_from_slice(key);
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(value);
    }
    buf
}

/// Decode writeset bytes back into a batch.
pub fn decode_writeset(bytes: &[u8]) -> Result<WriteBatch, WritesetError> {
    let mut cursor = Cursor::new(bytes);
    let count = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| WritesetError::Truncated)? as usize;

    // Each put needs at least 9 bytes, so a larger count is garbage
    if count > bytes.len() / 9 + 1 {
        return Err(WritesetError::Truncated);
    }

    let mut batch = WriteBatch::with_capacity(count);
    for _ in 0..count {
        let tag = cursor.read_u8().map_err(|_| WritesetError::Truncated)?;
        if tag != MUTATION_PUT {
            return Err(WritesetError::UnknownTag(tag));
        }
        let key = read_chunk(&mut cursor)?;
        let value = read_chunk(&mut cursor)?;
        batch.put(key, value);
    }

    if (cursor.position() as usize) != bytes.len() {
        return Err(WritesetError::TrailingBytes(
            bytes.len() - cursor.position() as usize,
        ));
    }
    Ok(batch)
}

fn read_chunk(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>, WritesetError> {
    let len = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| WritesetError::Truncated)? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(WritesetError::Truncated);
    }
    let mut chunk = vec![0u8; len];
    cursor
        .read_exact(&mut chunk)
        .map_err(|_| WritesetError::Truncated)?;
    Ok(chunk)
}

/// Writeset decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WritesetError {
    /// Data ended in the middle of a mutation
    #[error("Writeset truncated")]
    Truncated,

    /// Unknown mutation tag
    #[error("Unknown mutation tag: {0:#04x}")]
    UnknownTag(u8),

    /// Bytes left over after the declared mutations
    #[error("{0} trailing bytes after writeset")]
    TrailingBytes(usize),
}
