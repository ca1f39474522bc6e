/// Scanner module: assembles and runs the default scan pipeline.
///
/// [`start_scan`] wires one [`ScanProducer`] to the two sinks, the file
/// sink writing [`ScanOptions::output`] and the tree sink populating a
/// shared [`LiveDocument`](crate::model::LiveDocument), each behind its own
/// [`QueuedConsumer`], and starts the [`Coordinator`]. The caller watches
/// the returned [`ScanHandle`] for the terminal event while draining its
/// dispatch loop.
pub mod producer;
pub mod progress;

pub use producer::{root_display_name, ScanProducer};
pub use progress::{ProgressSnapshot, ScanEvent, SinkProgress};

use crate::config::ScanOptions;
use crate::error::ScanError;
use crate::model::SharedDocument;
use crate::pipeline::{Coordinator, CoordinatorState, QueuedConsumer, RecordProducer, StreamConsumer};
use crate::platform::StandardProbe;
use crate::sinks::{Dispatcher, TreeSink, XmlFileSink};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use tracing::info;

/// Handle to a running or completed scan.
pub struct ScanHandle {
    /// Receiver for the single terminal event.
    pub events_rx: Receiver<ScanEvent>,
    /// Document populated incrementally by the tree sink.
    pub document: SharedDocument,
    coordinator: Coordinator,
}

impl ScanHandle {
    /// Request the scan to stop as soon as possible. The partial output
    /// file is removed and no terminal event is sent.
    pub fn cancel(&self) {
        self.coordinator.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.coordinator.state() == CoordinatorState::Cancelled
    }

    pub fn state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.coordinator.progress()
    }

    /// Wait for every pipeline thread.
    ///
    /// The tree sink may be waiting on the dispatch loop, so call this only
    /// after a terminal event or after `cancel`.
    pub fn join(&self) {
        self.coordinator.join();
    }
}

/// Start a scan of `options.root`.
///
/// `document` receives the live tree; `dispatcher` must belong to the
/// thread that owns it and keeps draining the matching
/// [`DispatchLoop`](crate::sinks::DispatchLoop).
pub fn start_scan(
    options: &ScanOptions,
    document: SharedDocument,
    dispatcher: Dispatcher,
) -> Result<ScanHandle, ScanError> {
    options.validate()?;

    let probe = StandardProbe::new(options.collect_security);
    info!(
        "Scanning {} into {} (elevated: {})",
        options.root.display(),
        options.output.display(),
        probe.is_elevated()
    );

    let producer: Arc<dyn RecordProducer> = Arc::new(ScanProducer::new(
        options.root.clone(),
        Arc::new(probe),
        options.include_hidden,
    ));
    let consumers: Vec<Arc<dyn StreamConsumer>> = vec![
        Arc::new(QueuedConsumer::with_capacity(
            Box::new(XmlFileSink::new(options.output.clone())),
            options.queue_capacity,
        )),
        Arc::new(QueuedConsumer::with_capacity(
            Box::new(TreeSink::new(Arc::clone(&document), dispatcher)),
            options.queue_capacity,
        )),
    ];

    let (coordinator, events_rx) = Coordinator::new(producer, consumers);
    coordinator.start()?;

    Ok(ScanHandle {
        events_rx,
        document,
        coordinator,
    })
}
