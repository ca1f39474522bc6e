/// Scan progress reporting: atomic counters bumped by the pipeline threads
/// and the terminal events sent to the front end over a crossbeam channel.
use crate::error::ScanError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Terminal events of a scan. Exactly one is sent per started scan, unless
/// the scan is cancelled, in which case none is.
#[derive(Debug)]
pub enum ScanEvent {
    /// The producer and every sink finished.
    Completed {
        duration: Duration,
        progress: ProgressSnapshot,
    },
    /// The first fatal error raised by any party. Peers have been cancelled.
    Failed { error: ScanError },
}

/// Running totals, shared by the coordinator's listeners.
///
/// Only `Add` records are counted, so each number is the count of entries
/// rather than of events.
#[derive(Debug)]
pub struct ProgressCounters {
    scanned: AtomicU64,
    sinks: Vec<(String, AtomicU64)>,
}

impl ProgressCounters {
    pub fn new<'a>(sink_names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            scanned: AtomicU64::new(0),
            sinks: sink_names
                .into_iter()
                .map(|name| (name.to_owned(), AtomicU64::new(0)))
                .collect(),
        }
    }

    pub fn record_scanned(&self) {
        self.scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self, sink: usize) {
        if let Some((_, count)) = self.sinks.get(sink) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            scanned: self.scanned.load(Ordering::Relaxed),
            sinks: self
                .sinks
                .iter()
                .map(|(name, count)| SinkProgress {
                    name: name.clone(),
                    processed: count.load(Ordering::Relaxed),
                })
                .collect(),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Entries emitted by the producer.
    pub scanned: u64,
    pub sinks: Vec<SinkProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkProgress {
    pub name: String,
    /// Entries this sink has fully handled.
    pub processed: u64,
}

impl ProgressSnapshot {
    /// Entries handled by the slowest sink.
    pub fn slowest_sink(&self) -> u64 {
        self.sinks.iter().map(|s| s.processed).min().unwrap_or(self.scanned)
    }
}
