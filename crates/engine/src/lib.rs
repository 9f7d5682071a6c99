//! Ingestion engine for Meghaduta
//!
//! Turns raw text lines into materialized items:
//! - [`parser`]: line → candidate (or a skip reason)
//! - [`extractor`]: candidate → validated [`Event`](meghaduta_core::Event)
//! - [`materializer`]: event → item store write, with failure accounting
//! - [`pipeline`]: the concurrent, order-preserving coordinator
//! - [`config`] and [`ingest`]: file-driven one-shot ingestion

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod extractor;
pub mod ingest;
pub mod materializer;
pub mod parser;
pub mod pipeline;
pub mod source;

pub use config::{MeghadutaConfig, CONFIG_FILE_NAME};
pub use extractor::extract;
pub use ingest::ingest;
pub use materializer::{partition_for, ApplyOutcome, Materializer};
pub use parser::{parse_line, try_parse_line, LineFormat, LineParser, ParseSkip, ParsedCandidate};
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport, PipelineStats, StatsSnapshot};
pub use source::{FileLineSource, IterLineSource, LineSource, ReaderLineSource};
