/// Scripted pipeline parties for unit tests.
use super::{CancelToken, ConsumerEvents, Outcome, ProducerEvents, RecordProcessor, RecordProducer, StreamConsumer};
use crate::error::ScanError;
use crate::model::Record;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::io;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL: Duration = Duration::from_millis(5);

fn scripted_error(path: &str, message: String) -> ScanError {
    ScanError::Io {
        path: path.into(),
        source: io::Error::other(message),
    }
}

/// Emits a fixed list of records, optionally waits on a gate, then completes
/// or fails.
pub(crate) struct ScriptedProducer {
    records: Mutex<Option<Vec<Record>>>,
    failure: Option<String>,
    gate: Option<Receiver<()>>,
    cancel: CancelToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptedProducer {
    pub(crate) fn new(records: Vec<Record>) -> Self {
        Self {
            records: Mutex::new(Some(records)),
            failure: None,
            gate: None,
            cancel: CancelToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Raise `failed` instead of `completed` after the records.
    pub(crate) fn failing_with(mut self, message: &str) -> Self {
        self.failure = Some(message.to_owned());
        self
    }

    /// Hold the terminal event until the gate fires, is dropped, or the
    /// producer is cancelled.
    pub(crate) fn gated(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl RecordProducer for ScriptedProducer {
    fn start(&self, events: Arc<dyn ProducerEvents>) {
        let Some(records) = self.records.lock().take() else {
            return;
        };
        let cancel = self.cancel.clone();
        let gate = self.gate.clone();
        let failure = self.failure.clone();
        let handle = thread::spawn(move || {
            for record in records {
                if cancel.is_cancelled() {
                    return;
                }
                events.produced(record);
            }
            if let Some(gate) = gate {
                loop {
                    if cancel.is_cancelled() {
                        return;
                    }
                    match gate.recv_timeout(POLL) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
            }
            if cancel.is_cancelled() {
                return;
            }
            match failure {
                Some(message) => events.failed(scripted_error("scripted", message)),
                None => events.completed(),
            }
        });
        *self.worker.lock() = Some(handle);
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn join(&self) {
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Shared view of what a [`RecordingProcessor`] saw.
#[derive(Clone, Default)]
pub(crate) struct ProcessorLog {
    records: Arc<Mutex<Vec<Arc<Record>>>>,
    outcomes: Arc<Mutex<Vec<Outcome>>>,
}

impl ProcessorLog {
    pub(crate) fn names(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.name.to_string()).collect()
    }

    pub(crate) fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }
}

/// Unblocks a blocking [`RecordingProcessor`] one record at a time.
pub(crate) struct Release(Sender<()>);

impl Release {
    pub(crate) fn release(&self) {
        let _ = self.0.send(());
    }
}

/// Records every record and outcome it is handed.
pub(crate) struct RecordingProcessor {
    name: String,
    log: ProcessorLog,
    fail_at: Option<usize>,
    seen: usize,
    gate: Option<(Sender<()>, Receiver<()>)>,
}

impl RecordingProcessor {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            log: ProcessorLog::default(),
            fail_at: None,
            seen: 0,
            gate: None,
        }
    }

    /// Fail on the record with this zero-based position.
    pub(crate) fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Block in `process_record` until released or cancelled.
    pub(crate) fn blocking(mut self) -> Self {
        self.gate = Some(crossbeam_channel::unbounded());
        self
    }

    pub(crate) fn release_handle(&self) -> Release {
        let (tx, _) = self.gate.as_ref().expect("processor is not blocking");
        Release(tx.clone())
    }

    pub(crate) fn log(&self) -> ProcessorLog {
        self.log.clone()
    }
}

impl RecordProcessor for RecordingProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_record(&mut self, record: &Arc<Record>, cancel: &CancelToken) -> Result<(), ScanError> {
        let index = self.seen;
        self.seen += 1;
        if self.fail_at == Some(index) {
            return Err(scripted_error(&self.name, format!("record {index} rejected")));
        }
        if let Some((_, rx)) = &self.gate {
            loop {
                cancel.check()?;
                match rx.recv_timeout(POLL) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
        }
        self.log.records.lock().push(Arc::clone(record));
        Ok(())
    }

    fn finalize(&mut self, outcome: Outcome) -> Result<(), ScanError> {
        self.log.outcomes.lock().push(outcome);
        Ok(())
    }
}

/// What a [`RecordingConsumerEvents`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConsumerSignal {
    Processed(String),
    Completed,
    Failed(String),
}

/// Forwards consumer events into a channel.
pub(crate) struct RecordingConsumerEvents {
    tx: Sender<ConsumerSignal>,
}

impl RecordingConsumerEvents {
    pub(crate) fn new() -> (Arc<Self>, Receiver<ConsumerSignal>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl ConsumerEvents for RecordingConsumerEvents {
    fn processed(&self, record: &Record) {
        let _ = self.tx.send(ConsumerSignal::Processed(record.name.to_string()));
    }

    fn completed(&self) {
        let _ = self.tx.send(ConsumerSignal::Completed);
    }

    fn failed(&self, error: ScanError) {
        let _ = self.tx.send(ConsumerSignal::Failed(error.to_string()));
    }
}

/// Reports completion as soon as it sees its first record.
pub(crate) struct PrematureConsumer {
    name: String,
    events: OnceLock<Arc<dyn ConsumerEvents>>,
}

impl PrematureConsumer {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            events: OnceLock::new(),
        }
    }
}

impl StreamConsumer for PrematureConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self, events: Arc<dyn ConsumerEvents>) {
        let _ = self.events.set(events);
    }

    fn queue_task(&self, _record: Arc<Record>) {
        if let Some(events) = self.events.get() {
            events.completed();
        }
    }

    fn finish(&self) {}

    fn cancel(&self) {}

    fn join(&self) {}
}

/// What a [`RecordingProducerEvents`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProducerSignal {
    Produced(Record),
    Completed,
    Failed(String),
}

/// Forwards producer events into a channel.
pub(crate) struct RecordingProducerEvents {
    tx: Sender<ProducerSignal>,
}

impl RecordingProducerEvents {
    pub(crate) fn new() -> (Arc<Self>, Receiver<ProducerSignal>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl ProducerEvents for RecordingProducerEvents {
    fn produced(&self, record: Record) {
        let _ = self.tx.send(ProducerSignal::Produced(record));
    }

    fn completed(&self) {
        let _ = self.tx.send(ProducerSignal::Completed);
    }

    fn failed(&self, error: ScanError) {
        let _ = self.tx.send(ProducerSignal::Failed(error.to_string()));
    }
}

/// Collect signals until the terminal one (or the channel closes).
pub(crate) fn drain_producer(signals: &Receiver<ProducerSignal>) -> (Vec<Record>, Option<ProducerSignal>) {
    let mut records = Vec::new();
    while let Ok(signal) = signals.recv_timeout(Duration::from_secs(10)) {
        match signal {
            ProducerSignal::Produced(record) => records.push(record),
            terminal => return (records, Some(terminal)),
        }
    }
    (records, None)
}
