//! Pipeline Coordinator
//!
//! Wires the stages into one process-local pipeline:
//!
//! ```text
//!            ┌──────────┐    ┌─────────────┐    ┌───────────┐    ┌───────────────┐
//! submit ──▶ │ parser   │ ─▶ │ extractor   │ ─▶ │ sequencer │ ─┬▶│ partition 0   │ ─▶ ItemStore
//! (seq n)    │ × P      │    │ × E         │    │ × 1       │  ├▶│ ...           │
//!            └──────────┘    └─────────────┘    └───────────┘  └▶│ partition M-1 │
//!                                                                └───────────────┘
//! ```
//!
//! # Ordering
//!
//! Every submitted line gets a sequence number and produces exactly one
//! outcome (event, skip, or invalid), so the sequencer can put outcomes back
//! into submission order whatever the parser and extractor parallelism.
//! Events are then routed by item id hash; a partition has one worker, so
//! events of an item are applied in submission order while different items
//! materialize in parallel.
//!
//! # Failure
//!
//! Parse skips and validation errors are counted and logged. Store failures
//! are counted; once a partition reaches `store_failure_limit` consecutive
//! failures the pipeline halts: `submit` is refused and remaining events are
//! discarded. Stages always keep draining their channels, so a halt never
//! blocks a producer.

pub mod sequencer;
pub mod stats;
mod worker;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use meghaduta_core::{Error, Event, KvEngine, Result, ValidationError};
use meghaduta_primitives::ItemStore;
use meghaduta_storage::OrderedStore;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::extractor::extract;
use crate::materializer::{partition_for, ApplyOutcome, Materializer};
use crate::parser::{LineFormat, LineParser, ParseSkip, ParsedCandidate};
use crate::source::LineSource;

use self::sequencer::ReorderBuffer;
pub use self::stats::{PipelineReport, PipelineStats, StatsSnapshot};
use self::worker::spawn_worker;

/// Idle wait of a materializer partition before it offers the store a sync.
const SYNC_TICK: Duration = Duration::from_millis(50);

/// Worker counts and limits of a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Line Parser workers
    pub parser_workers: usize,
    /// Event Extractor workers
    pub extractor_workers: usize,
    /// Materializer partitions, one worker each
    pub materializer_workers: usize,
    /// Capacity of every inter-stage channel
    pub channel_capacity: usize,
    /// Consecutive store failures that halt the pipeline
    pub store_failure_limit: u32,
    /// Input line format
    pub line_format: LineFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            parser_workers: 4,
            extractor_workers: 4,
            materializer_workers: 4,
            channel_capacity: 1024,
            store_failure_limit: 1,
            line_format: LineFormat::Tsv,
        }
    }
}

impl PipelineConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the parser worker count.
    pub fn with_parser_workers(mut self, n: usize) -> Self {
        self.parser_workers = n;
        self
    }

    /// Set the extractor worker count.
    pub fn with_extractor_workers(mut self, n: usize) -> Self {
        self.extractor_workers = n;
        self
    }

    /// Set the materializer partition count.
    pub fn with_materializer_workers(mut self, n: usize) -> Self {
        self.materializer_workers = n;
        self
    }

    /// Set the channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the consecutive store failure limit.
    pub fn with_store_failure_limit(mut self, limit: u32) -> Self {
        self.store_failure_limit = limit;
        self
    }

    /// Set the line format.
    pub fn with_line_format(mut self, format: LineFormat) -> Self {
        self.line_format = format;
        self
    }

    /// One materializer for all items: global apply order equals submission order.
    pub fn single_writer(self) -> Self {
        self.with_materializer_workers(1)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("parser_workers", self.parser_workers),
            ("extractor_workers", self.extractor_workers),
            ("materializer_workers", self.materializer_workers),
            ("channel_capacity", self.channel_capacity),
            ("store_failure_limit", self.store_failure_limit as usize),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(Error::Config(format!("pipeline.{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

/// Result of the parse and extract stages for one line.
#[derive(Debug)]
enum Outcome {
    Event(Event),
    Skipped(ParseSkip),
    Invalid(ValidationError),
}

/// Why the pipeline stopped accepting lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HaltReason {
    /// Store failure limit reached; carries the first failure message
    StoreFailure(String),
    /// A worker thread panicked
    WorkerPanic(String),
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::StoreFailure(msg) => write!(f, "store failure: {}", msg),
            HaltReason::WorkerPanic(msg) => f.write_str(msg),
        }
    }
}

/// State shared by the coordinator and every worker.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    stats: PipelineStats,
    halted: AtomicBool,
    aborted: AtomicBool,
    halt_reason: Mutex<Option<HaltReason>>,
    first_failure: Mutex<Option<String>>,
}

impl Shared {
    pub(crate) fn halt(&self, reason: HaltReason) {
        let mut current = self.halt_reason.lock();
        if current.is_none() {
            *current = Some(reason);
        }
        self.halted.store(true, Ordering::Release);
    }

    pub(crate) fn halt_reason(&self) -> Option<HaltReason> {
        self.halt_reason.lock().clone()
    }

    fn record_failure(&self, error: &Error) -> String {
        self.first_failure
            .lock()
            .get_or_insert_with(|| error.to_string())
            .clone()
    }

    fn is_stopped(&self) -> bool {
        self.halted.load(Ordering::Acquire) || self.aborted.load(Ordering::Acquire)
    }
}

type Line = (u64, String);
type Parsed = (u64, std::result::Result<ParsedCandidate, ParseSkip>);
type Sequenced = (u64, Outcome);

/// Running ingestion pipeline.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(ItemStore::open(path, ItemStoreConfig::default())?);
/// let pipeline = Pipeline::start(PipelineConfig::default(), Arc::clone(&store))?;
/// pipeline.run(&mut FileLineSource::open("events.tsv")?)?;
/// let report = pipeline.finish()?;
/// ```
pub struct Pipeline<E: KvEngine + 'static = OrderedStore> {
    line_tx: Mutex<Option<Sender<Line>>>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
    next_seq: AtomicU64,
    started: Instant,
    store: Arc<ItemStore<E>>,
    config: PipelineConfig,
}

impl<E: KvEngine + 'static> Pipeline<E> {
    /// Spawn all stage workers.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::PipelineHalted`] if a worker thread cannot be spawned
    pub fn start(config: PipelineConfig, store: Arc<ItemStore<E>>) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared::default());
        let capacity = config.channel_capacity;
        let (line_tx, line_rx) = bounded::<Line>(capacity);
        let (parsed_tx, parsed_rx) = bounded::<Parsed>(capacity);
        let (outcome_tx, outcome_rx) = bounded::<Sequenced>(capacity);

        let mut workers = Vec::with_capacity(
            config.parser_workers + config.extractor_workers + config.materializer_workers + 1,
        );

        let mut partitions = Vec::with_capacity(config.materializer_workers);
        for i in 0..config.materializer_workers {
            let (tx, rx) = bounded::<Event>(capacity);
            partitions.push(tx);
            let materializer = Materializer::new(Arc::clone(&store), config.store_failure_limit);
            workers.push(spawn_worker(
                "materializer",
                i,
                Arc::clone(&shared),
                move |shared| run_partition(rx, materializer, shared),
            )?);
        }

        workers.push(spawn_worker(
            "sequencer",
            0,
            Arc::clone(&shared),
            move |shared| run_sequencer(outcome_rx, partitions, shared),
        )?);

        for i in 0..config.extractor_workers {
            let rx = parsed_rx.clone();
            let tx = outcome_tx.clone();
            workers.push(spawn_worker("extractor", i, Arc::clone(&shared), move |_| {
                run_extractor(rx, tx)
            })?);
        }

        let parser = LineParser::new(config.line_format);
        for i in 0..config.parser_workers {
            let rx = line_rx.clone();
            let tx = parsed_tx.clone();
            workers.push(spawn_worker("parser", i, Arc::clone(&shared), move |_| {
                run_parser(rx, tx, parser)
            })?);
        }

        info!(
            parsers = config.parser_workers,
            extractors = config.extractor_workers,
            partitions = config.materializer_workers,
            format = %config.line_format,
            "Pipeline started"
        );

        Ok(Pipeline {
            line_tx: Mutex::new(Some(line_tx)),
            workers,
            shared,
            next_seq: AtomicU64::new(0),
            started: Instant::now(),
            store,
            config,
        })
    }

    /// Hand one raw line to the pipeline. Blocks while the first stage is full.
    ///
    /// # Errors
    ///
    /// [`Error::PipelineHalted`] once the pipeline has halted or its workers
    /// have stopped.
    pub fn submit(&self, line: impl Into<String>) -> Result<()> {
        if let Some(reason) = self.shared.halt_reason() {
            return Err(Error::PipelineHalted(reason.to_string()));
        }

        let tx = self
            .line_tx
            .lock()
            .clone()
            .ok_or_else(|| Error::PipelineHalted("pipeline is shutting down".to_string()))?;
        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
        tx.send((seq, line.into()))
            .map_err(|_| Error::PipelineHalted("pipeline workers have stopped".to_string()))?;
        self.shared.stats.record_received();
        Ok(())
    }

    /// Submit every line of `source`. Returns the number of lines submitted.
    ///
    /// # Errors
    ///
    /// [`Error::Source`] if the source fails, [`Error::PipelineHalted`] if the
    /// pipeline halts first.
    pub fn run<S: LineSource + ?Sized>(&self, source: &mut S) -> Result<u64> {
        let mut submitted = 0u64;
        while let Some(line) = source.next_line()? {
            self.submit(line)?;
            submitted += 1;
        }
        debug!(submitted, "Line source exhausted");
        Ok(submitted)
    }

    /// Stop accepting lines, apply everything in flight, and join the workers.
    ///
    /// # Errors
    ///
    /// - [`Error::StoreUnavailable`] with the first store failure if the
    ///   failure limit halted the pipeline
    /// - [`Error::PipelineHalted`] if a worker panicked
    pub fn finish(mut self) -> Result<PipelineReport> {
        self.shutdown();
        let report = self.report();

        match self.shared.halt_reason() {
            Some(HaltReason::StoreFailure(msg)) => {
                error!(
                    applied = report.stats.events_applied,
                    discarded = report.stats.events_discarded,
                    "Pipeline halted on store failure"
                );
                Err(Error::StoreUnavailable(msg))
            }
            Some(reason @ HaltReason::WorkerPanic(_)) => Err(Error::PipelineHalted(reason.to_string())),
            None => {
                info!(
                    lines = report.stats.lines_received,
                    applied = report.stats.events_applied,
                    skipped = report.stats.parse_skips,
                    invalid = report.stats.validation_errors,
                    store_failures = report.stats.store_failures,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Pipeline finished"
                );
                Ok(report)
            }
        }
    }

    /// Stop accepting lines and abandon queued events. Events already
    /// applied stay durable.
    pub fn abort(mut self) -> PipelineReport {
        self.shared.aborted.store(true, Ordering::Release);
        self.shutdown();
        let report = self.report();
        warn!(
            applied = report.stats.events_applied,
            discarded = report.stats.events_discarded,
            "Pipeline aborted"
        );
        report
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// True once the pipeline has halted.
    pub fn is_halted(&self) -> bool {
        self.shared.halted.load(Ordering::Acquire)
    }

    /// Configuration the pipeline runs with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Item store events are applied to.
    pub fn store(&self) -> &Arc<ItemStore<E>> {
        &self.store
    }

    fn report(&self) -> PipelineReport {
        PipelineReport {
            stats: self.stats(),
            elapsed: self.started.elapsed(),
        }
    }

    fn shutdown(&mut self) {
        // Dropping the only sender lets every stage drain and exit in turn
        self.line_tx.lock().take();
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().map(str::to_string);
            if handle.join().is_err() {
                error!(worker = ?name, "Pipeline worker exited abnormally");
            }
        }
    }
}

impl<E: KvEngine + 'static> Drop for Pipeline<E> {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shared.aborted.store(true, Ordering::Release);
            self.shutdown();
        }
    }
}

fn run_parser(rx: Receiver<Line>, tx: Sender<Parsed>, parser: LineParser) {
    for (seq, line) in rx.iter() {
        if tx.send((seq, parser.try_parse(&line))).is_err() {
            break;
        }
    }
}

fn run_extractor(rx: Receiver<Parsed>, tx: Sender<Sequenced>) {
    for (seq, parsed) in rx.iter() {
        let outcome = match parsed {
            Ok(candidate) => match extract(candidate) {
                Ok(event) => Outcome::Event(event),
                Err(e) => Outcome::Invalid(e),
            },
            Err(skip) => Outcome::Skipped(skip),
        };
        if tx.send((seq, outcome)).is_err() {
            break;
        }
    }
}

fn run_sequencer(rx: Receiver<Sequenced>, partitions: Vec<Sender<Event>>, shared: &Shared) {
    let mut buffer = ReorderBuffer::new();
    for (seq, outcome) in rx.iter() {
        buffer.push(seq, (seq, outcome));
        while let Some((seq, outcome)) = buffer.pop_ready() {
            route(seq, outcome, &partitions, shared);
        }
    }

    if buffer.pending() > 0 {
        warn!(
            waiting_for = buffer.next_seq(),
            held = buffer.pending(),
            "Releasing outcomes behind a sequence gap"
        );
        for (seq, outcome) in buffer.drain_remaining() {
            route(seq, outcome, &partitions, shared);
        }
    }
}

fn route(seq: u64, outcome: Outcome, partitions: &[Sender<Event>], shared: &Shared) {
    match outcome {
        Outcome::Event(event) => {
            let partition = partition_for(event.item_id(), partitions.len());
            if partitions[partition].send(event).is_err() {
                shared.stats.record_discarded();
            }
        }
        Outcome::Skipped(skip) => {
            shared.stats.record_parse_skip();
            if !skip.is_benign() {
                warn!(line = seq + 1, reason = %skip, "Skipped malformed line");
            }
        }
        Outcome::Invalid(e) => {
            shared.stats.record_validation_error();
            warn!(line = seq + 1, error = %e, "Dropped invalid event");
        }
    }
}

fn run_partition<E: KvEngine>(rx: Receiver<Event>, mut materializer: Materializer<E>, shared: &Shared) {
    loop {
        let event = match rx.recv_timeout(SYNC_TICK) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                materializer.sync_if_overdue();
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if shared.is_stopped() {
            shared.stats.record_discarded();
            continue;
        }

        match materializer.apply(&event) {
            ApplyOutcome::Applied => shared.stats.record_applied(),
            ApplyOutcome::Failed(e) => {
                shared.stats.record_store_failure();
                shared.record_failure(&e);
            }
            ApplyOutcome::Halt(e) => {
                shared.stats.record_store_failure();
                let first = shared.record_failure(&e);
                shared.halt(HaltReason::StoreFailure(first));
            }
        }
    }
}
