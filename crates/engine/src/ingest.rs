//! One-shot ingestion driven by a [`MeghadutaConfig`]

use std::sync::Arc;

use meghaduta_core::{Error, Result};
use meghaduta_primitives::ItemStore;
use tracing::{info, warn};

use crate::config::MeghadutaConfig;
use crate::pipeline::{Pipeline, PipelineReport};
use crate::source::FileLineSource;

/// Ingest `config.line_source` into the store at `config.db_location`.
///
/// Opens the store, runs every line through a [`Pipeline`], waits for it to
/// drain, checkpoints, and closes the store.
///
/// # Errors
///
/// - [`Error::Config`] if the configuration is invalid or names no line source
/// - [`Error::Source`] if the line file cannot be opened or read
/// - [`Error::StoreUnavailable`] if the store cannot be opened or the
///   pipeline halted on a store failure
pub fn ingest(config: &MeghadutaConfig) -> Result<PipelineReport> {
    config.validate()?;
    let source_path = config
        .line_source
        .as_deref()
        .ok_or_else(|| Error::Config("line_source is not set".to_string()))?;
    let mut source = FileLineSource::open(source_path)?;

    let store = Arc::new(ItemStore::open(
        &config.db_location,
        config.item_store_config()?,
    )?);
    info!(
        db = %config.db_location.display(),
        source = %source_path.display(),
        "Ingest started"
    );

    let pipeline = Pipeline::start(config.pipeline_config()?, Arc::clone(&store))?;
    let submitted = pipeline.run(&mut source);
    let finished = pipeline.finish();

    // A halted pipeline refuses lines; report the store failure that caused it
    let report = match (submitted, finished) {
        (_, Err(e @ Error::StoreUnavailable(_))) => Err(e),
        (Err(e), _) => Err(e),
        (Ok(_), finished) => finished,
    };

    if report.is_ok() {
        store.checkpoint()?;
    }
    if let Err(e) = store.close() {
        warn!(error = %e, "Failed to close item store after ingest");
    }
    report
}
