//! Error types for Meghaduta
//!
//! This module defines the error taxonomy shared by the store and the pipeline.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Line-level parse failures are not errors: the parser reports them as a skip
//! reason and the pipeline keeps going. Validation failures are recoverable and
//! only drop the offending event. Store and decode failures are fatal for the
//! operation that hit them and are always surfaced to the caller.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for Meghaduta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Meghaduta
#[derive(Debug, Error)]
pub enum Error {
    /// The key-value engine rejected an operation (I/O failure, closed handle)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Stored data for an item could not be decoded
    #[error("Decode error for item '{item_id}': {detail}")]
    Decode {
        /// Item whose keys failed to decode
        item_id: String,
        /// What failed to decode
        detail: String,
    },

    /// An event failed validation
    #[error("Invalid event: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration could not be read, parsed, or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// The ingestion pipeline stopped accepting work
    #[error("Pipeline halted: {0}")]
    PipelineHalted(String),

    /// The external line source failed to deliver a line
    #[error("Line source error: {0}")]
    Source(String),
}

impl Error {
    /// Build a `StoreUnavailable` error from anything displayable.
    pub fn store_unavailable(detail: impl fmt::Display) -> Self {
        Error::StoreUnavailable(detail.to_string())
    }

    /// Build a `Decode` error for the given item.
    pub fn decode(item_id: impl Into<String>, detail: impl fmt::Display) -> Self {
        Error::Decode {
            item_id: item_id.into(),
            detail: detail.to_string(),
        }
    }

    /// Whether the error aborts the operation that produced it.
    ///
    /// Validation errors only drop a single event; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Validation(_))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::StoreUnavailable(e.to_string())
    }
}

/// Reasons a candidate is rejected while being turned into an [`Event`](crate::Event).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Item id was empty
    #[error("item id is empty")]
    EmptyItemId,

    /// Attribute name was empty
    #[error("attribute name is empty")]
    EmptyAttributeName,

    /// Attribute name collides with the reserved last-updated marker
    #[error("attribute name '{0}' is reserved")]
    ReservedAttributeName(String),

    /// Item id contains the key separator and would break prefix isolation
    #[error("item id '{0}' contains the key separator")]
    SeparatorInItemId(String),

    /// Timestamp field is not a non-negative integer
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}
