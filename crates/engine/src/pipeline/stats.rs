//! Pipeline counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Live counters shared by all pipeline workers.
///
/// Once the pipeline has drained, every received line is accounted for
/// exactly once:
/// `lines_received == parse_skips + validation_errors + events_applied
///  + store_failures + events_discarded`.
#[derive(Debug, Default)]
pub struct PipelineStats {
    lines_received: AtomicU64,
    parse_skips: AtomicU64,
    validation_errors: AtomicU64,
    events_applied: AtomicU64,
    store_failures: AtomicU64,
    events_discarded: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn record_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parse_skip(&self) {
        self.parse_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_validation_error(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.events_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_received: self.lines_received.load(Ordering::Relaxed),
            parse_skips: self.parse_skips.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Lines accepted by `submit`
    pub lines_received: u64,
    /// Lines that produced no candidate
    pub parse_skips: u64,
    /// Candidates rejected by validation
    pub validation_errors: u64,
    /// Events written to the store
    pub events_applied: u64,
    /// Events the store rejected
    pub store_failures: u64,
    /// Events dropped after a halt or abort
    pub events_discarded: u64,
}

impl StatsSnapshot {
    /// Lines whose outcome is known.
    pub fn lines_accounted(&self) -> u64 {
        self.parse_skips
            + self.validation_errors
            + self.events_applied
            + self.store_failures
            + self.events_discarded
    }
}

/// Final counters of a drained pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    /// Counters after the drain
    pub stats: StatsSnapshot,
    /// Time from start to drained
    pub elapsed: Duration,
}
