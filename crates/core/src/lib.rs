//! Core types and traits for Meghaduta
//!
//! This crate defines the foundational types used throughout the system:
//! - Event: an immutable attribute-change fact for one item
//! - Item: the materialized current state of one item
//! - WriteBatch: a group of puts applied atomically by an engine
//! - Error: Error type hierarchy (store, decode, validation, config, pipeline)
//! - Traits: the `KvEngine` seam between the item store and the sorted byte store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod error;
pub mod traits;
pub mod types;

pub use batch::WriteBatch;
pub use error::{Error, Result, ValidationError};
pub use traits::KvEngine;
pub use types::{Event, Item, KEY_SEPARATOR, LAST_UPDATED_AT};
