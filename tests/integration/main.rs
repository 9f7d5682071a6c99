//! Integration Tests
//!
//! End-to-end runs through the public facade:
//! - ingest: file and config driven ingestion
//! - recovery: reopen, checkpoints, and crash leftovers
//! - modes: durability modes and item store options

#[path = "../common/mod.rs"]
mod common;

mod ingest;
mod modes;
mod recovery;
