//! Event Extractor
//!
//! Validates a [`ParsedCandidate`] into an [`Event`]. Pure and stateless.
//! A rejected candidate is a [`ValidationError`]: the event is dropped and
//! counted, the pipeline continues.

use meghaduta_core::{Event, ValidationError};

use crate::parser::ParsedCandidate;

/// Turn a candidate into a validated event.
///
/// The timestamp is parsed as a non-negative decimal integer after trimming
/// surrounding whitespace. Id and name checks are those of [`Event::new`].
pub fn extract(candidate: ParsedCandidate) -> Result<Event, ValidationError> {
    let timestamp = candidate
        .timestamp
        .trim()
        .parse::<u64>()
        .map_err(|_| ValidationError::InvalidTimestamp(candidate.timestamp.clone()))?;

    Event::new(candidate.item_id, candidate.name, candidate.value, timestamp)
}
