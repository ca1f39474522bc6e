/// The coordinator: wires one producer to N consumers and decides, exactly
/// once, how the scan ended.
///
/// # Completion barrier
///
/// Producer completion, each consumer's completion and every failure go
/// through the one `Barrier` mutex. The scan completes when the producer and
/// all consumers have completed; the first failure moves it to `Failed` and
/// cancels everyone. A consumer completing while the producer is still
/// running is a protocol breach and fails the scan.
///
/// Listeners hold a `Weak` back-reference, so consumers (which own their
/// listener) never keep the coordinator alive.
use super::{ConsumerEvents, ProducerEvents, RecordProducer, StreamConsumer};
use crate::error::ScanError;
use crate::model::Record;
use crate::scanner::progress::{ProgressCounters, ProgressSnapshot, ScanEvent};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Created,
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl CoordinatorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

struct Barrier {
    state: CoordinatorState,
    producer_done: bool,
    consumers_done: Vec<bool>,
    started_at: Option<Instant>,
}

struct Shared {
    producer: Arc<dyn RecordProducer>,
    consumers: Vec<Arc<dyn StreamConsumer>>,
    barrier: Mutex<Barrier>,
    counters: ProgressCounters,
    events_tx: Sender<ScanEvent>,
}

/// Owner of one scan's parties.
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Build a coordinator and subscribe to every consumer.
    ///
    /// The returned receiver yields the single terminal [`ScanEvent`].
    pub fn new(
        producer: Arc<dyn RecordProducer>,
        consumers: Vec<Arc<dyn StreamConsumer>>,
    ) -> (Self, Receiver<ScanEvent>) {
        // One terminal event per scan.
        let (events_tx, events_rx) = crossbeam_channel::bounded(1);
        let counters = ProgressCounters::new(consumers.iter().map(|c| c.name()));
        let shared = Arc::new(Shared {
            barrier: Mutex::new(Barrier {
                state: CoordinatorState::Created,
                producer_done: false,
                consumers_done: vec![false; consumers.len()],
                started_at: None,
            }),
            producer,
            consumers,
            counters,
            events_tx,
        });

        for (index, consumer) in shared.consumers.iter().enumerate() {
            consumer.subscribe(Arc::new(ConsumerLink {
                shared: Arc::downgrade(&shared),
                index,
            }));
        }

        (Self { shared }, events_rx)
    }

    /// Start the producer. Fails with `InvalidState` on any state but
    /// `Created`.
    pub fn start(&self) -> Result<(), ScanError> {
        {
            let mut barrier = self.shared.barrier.lock();
            if barrier.state != CoordinatorState::Created {
                return Err(ScanError::InvalidState("scan already started"));
            }
            barrier.state = CoordinatorState::Started;
            barrier.started_at = Some(Instant::now());
        }
        info!(
            "Scan started with {} sink(s)",
            self.shared.consumers.len()
        );
        self.shared.producer.start(Arc::new(ProducerLink {
            shared: Arc::downgrade(&self.shared),
        }));
        Ok(())
    }

    /// Cancel the producer and every consumer.
    ///
    /// No-op before `start`. Idempotent; no terminal event follows.
    pub fn cancel(&self) {
        {
            let mut barrier = self.shared.barrier.lock();
            match barrier.state {
                CoordinatorState::Created => return,
                CoordinatorState::Started => barrier.state = CoordinatorState::Cancelled,
                _ => {}
            }
        }
        info!("Scan cancelled");
        self.shared.cancel_all();
    }

    pub fn state(&self) -> CoordinatorState {
        self.shared.barrier.lock().state
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.shared.counters.snapshot()
    }

    /// Wait for the producer and consumer threads.
    pub fn join(&self) {
        self.shared.producer.join();
        for consumer in &self.shared.consumers {
            consumer.join();
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        // Nobody is left to receive the outcome; stop the workers.
        if self.state() == CoordinatorState::Started {
            self.cancel();
        }
    }
}

impl Shared {
    fn cancel_all(&self) {
        self.producer.cancel();
        for consumer in &self.consumers {
            consumer.cancel();
        }
    }

    fn producer_completed(&self) {
        {
            let mut barrier = self.barrier.lock();
            if barrier.state != CoordinatorState::Started {
                return;
            }
            barrier.producer_done = true;
        }
        debug!("Producer completed, finishing sinks");
        for consumer in &self.consumers {
            consumer.finish();
        }
        self.check_completion();
    }

    fn consumer_completed(&self, index: usize) {
        let premature = {
            let mut barrier = self.barrier.lock();
            if barrier.state != CoordinatorState::Started {
                return;
            }
            if barrier.producer_done {
                barrier.consumers_done[index] = true;
                false
            } else {
                true
            }
        };
        let name = self.consumers[index].name();
        if premature {
            error!("Sink {name} completed before the producer");
            self.fail(ScanError::ContractViolation(format!(
                "sink {name} completed before the producer"
            )));
            return;
        }
        debug!("Sink {name} completed");
        self.check_completion();
    }

    fn check_completion(&self) {
        let duration = {
            let mut barrier = self.barrier.lock();
            let done = barrier.state == CoordinatorState::Started
                && barrier.producer_done
                && barrier.consumers_done.iter().all(|&d| d);
            if !done {
                return;
            }
            barrier.state = CoordinatorState::Completed;
            barrier
                .started_at
                .map(|started| started.elapsed())
                .unwrap_or_default()
        };
        let progress = self.counters.snapshot();
        info!(
            "Scan complete: {} entries in {:.2}s",
            progress.scanned,
            duration.as_secs_f64()
        );
        let _ = self
            .events_tx
            .send(ScanEvent::Completed { duration, progress });
    }

    fn fail(&self, error: ScanError) {
        if matches!(error, ScanError::Cancelled) {
            return;
        }
        {
            let mut barrier = self.barrier.lock();
            if barrier.state != CoordinatorState::Started {
                warn!("Dropping failure after the scan ended: {error}");
                return;
            }
            barrier.state = CoordinatorState::Failed;
        }
        error!("Scan failed: {error}");
        self.cancel_all();
        let _ = self.events_tx.send(ScanEvent::Failed { error });
    }
}

struct ProducerLink {
    shared: Weak<Shared>,
}

impl ProducerEvents for ProducerLink {
    fn produced(&self, record: Record) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if record.is_add() {
            shared.counters.record_scanned();
        }
        let record = Arc::new(record);
        for consumer in &shared.consumers {
            consumer.queue_task(Arc::clone(&record));
        }
    }

    fn completed(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.producer_completed();
        }
    }

    fn failed(&self, error: ScanError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.fail(error);
        }
    }
}

struct ConsumerLink {
    shared: Weak<Shared>,
    index: usize,
}

impl ConsumerEvents for ConsumerLink {
    fn processed(&self, record: &Record) {
        if !record.is_add() {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.counters.record_processed(self.index);
        }
    }

    fn completed(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.consumer_completed(self.index);
        }
    }

    fn failed(&self, error: ScanError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.fail(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attributes;
    use crate::pipeline::testing::{PrematureConsumer, RecordingProcessor, ScriptedProducer};
    use crate::pipeline::{Outcome, QueuedConsumer};
    use crate::sinks::XmlFileSink;
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn script() -> Vec<Record> {
        vec![
            Record::add_directory("root", Attributes::new()),
            Record::add_file("a", Attributes::new()),
            Record::add_file("b", Attributes::new()),
            Record::update_directory("root", Some(0)),
        ]
    }

    fn recording_sink(name: &str) -> (Arc<dyn StreamConsumer>, crate::pipeline::testing::ProcessorLog) {
        let processor = RecordingProcessor::new(name);
        let log = processor.log();
        (Arc::new(QueuedConsumer::new(Box::new(processor))), log)
    }

    #[test]
    fn completes_once_after_every_party() {
        let (file, file_log) = recording_sink("file");
        let (tree, tree_log) = recording_sink("tree");
        let producer = Arc::new(ScriptedProducer::new(script()));
        let (coordinator, events) = Coordinator::new(producer, vec![file, tree]);

        coordinator.start().unwrap();
        let event = events.recv_timeout(WAIT).expect("terminal event");
        coordinator.join();

        match event {
            ScanEvent::Completed { progress, .. } => {
                assert_eq!(progress.scanned, 3);
                assert!(progress.sinks.iter().all(|s| s.processed == 3));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(coordinator.state(), CoordinatorState::Completed);
        assert!(coordinator.state().is_terminal());
        assert!(events.try_recv().is_err());
        for log in [file_log, tree_log] {
            assert_eq!(log.names(), ["root", "a", "b", "root"]);
            assert_eq!(log.outcomes(), [Outcome::Completed]);
        }
    }

    #[test]
    fn completes_without_consumers() {
        let producer = Arc::new(ScriptedProducer::new(script()));
        let (coordinator, events) = Coordinator::new(producer, Vec::new());
        coordinator.start().unwrap();
        assert!(matches!(
            events.recv_timeout(WAIT),
            Ok(ScanEvent::Completed { .. })
        ));
        coordinator.join();
    }

    #[test]
    fn start_twice_is_invalid() {
        let producer = Arc::new(ScriptedProducer::new(script()));
        let (coordinator, events) = Coordinator::new(producer, Vec::new());
        coordinator.start().unwrap();
        assert!(matches!(
            coordinator.start(),
            Err(ScanError::InvalidState(_))
        ));
        let _ = events.recv_timeout(WAIT);
        coordinator.join();
        assert!(coordinator.start().is_err());
    }

    #[test]
    fn cancel_before_start_is_a_no_op() {
        let producer = Arc::new(ScriptedProducer::new(script()));
        let (coordinator, events) = Coordinator::new(producer, Vec::new());
        coordinator.cancel();
        assert_eq!(coordinator.state(), CoordinatorState::Created);
        coordinator.start().unwrap();
        assert!(events.recv_timeout(WAIT).is_ok());
        coordinator.join();
    }

    #[test]
    fn consumer_failure_cancels_peers_and_reports_once() {
        let failing = RecordingProcessor::new("fragile").failing_at(1);
        let failing_log = failing.log();
        let (healthy, healthy_log) = recording_sink("healthy");
        let (gate_tx, gate) = crossbeam_channel::bounded::<()>(0);
        let producer = Arc::new(ScriptedProducer::new(script()).gated(gate));
        let (coordinator, events) = Coordinator::new(
            producer,
            vec![Arc::new(QueuedConsumer::new(Box::new(failing))), healthy],
        );

        coordinator.start().unwrap();
        match events.recv_timeout(WAIT).expect("terminal event") {
            ScanEvent::Failed { error } => {
                assert!(error.to_string().contains("record 1"), "{error}")
            }
            other => panic!("unexpected event: {other:?}"),
        }
        drop(gate_tx);
        coordinator.join();

        assert_eq!(coordinator.state(), CoordinatorState::Failed);
        assert!(events.try_recv().is_err());
        assert_eq!(failing_log.outcomes(), [Outcome::Failed]);
        assert_eq!(healthy_log.outcomes(), [Outcome::Cancelled]);
    }

    #[test]
    fn producer_failure_is_reraised() {
        let (sink, log) = recording_sink("sink");
        let producer = Arc::new(ScriptedProducer::new(script()).failing_with("disk vanished"));
        let (coordinator, events) = Coordinator::new(producer, vec![sink]);

        coordinator.start().unwrap();
        match events.recv_timeout(WAIT).expect("terminal event") {
            ScanEvent::Failed { error } => assert!(error.to_string().contains("disk vanished")),
            other => panic!("unexpected event: {other:?}"),
        }
        coordinator.join();
        assert_eq!(log.outcomes(), [Outcome::Cancelled]);
    }

    #[test]
    fn premature_consumer_completion_is_a_contract_violation() {
        let (gate_tx, gate) = crossbeam_channel::bounded::<()>(0);
        let producer = Arc::new(ScriptedProducer::new(script()).gated(gate));
        let (coordinator, events) =
            Coordinator::new(producer, vec![Arc::new(PrematureConsumer::new("eager"))]);

        coordinator.start().unwrap();
        match events.recv_timeout(WAIT).expect("terminal event") {
            ScanEvent::Failed { error } => {
                assert!(matches!(error, ScanError::ContractViolation(_)))
            }
            other => panic!("unexpected event: {other:?}"),
        }
        drop(gate_tx);
        coordinator.join();
    }

    #[test]
    fn cancel_suppresses_completion() {
        let (sink, log) = recording_sink("sink");
        let (gate_tx, gate) = crossbeam_channel::bounded::<()>(0);
        let producer = Arc::new(ScriptedProducer::new(script()).gated(gate));
        let (coordinator, events) = Coordinator::new(producer, vec![sink]);

        coordinator.start().unwrap();
        coordinator.cancel();
        coordinator.cancel();
        drop(gate_tx);
        coordinator.join();

        assert_eq!(coordinator.state(), CoordinatorState::Cancelled);
        assert!(events.try_recv().is_err());
        assert!(log.outcomes().iter().all(|&o| o == Outcome::Cancelled));
    }

    #[test]
    fn cancel_removes_partial_output_file() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("scan.xml");
        let (gate_tx, gate) = crossbeam_channel::bounded::<()>(0);
        let producer = Arc::new(ScriptedProducer::new(script()).gated(gate));
        let sink: Arc<dyn StreamConsumer> =
            Arc::new(QueuedConsumer::new(Box::new(XmlFileSink::new(&out))));
        let (coordinator, events) = Coordinator::new(producer, vec![sink]);

        coordinator.start().unwrap();
        let deadline = Instant::now() + WAIT;
        while !out.exists() {
            assert!(Instant::now() < deadline, "file sink never created its file");
            thread::sleep(Duration::from_millis(5));
        }

        coordinator.cancel();
        drop(gate_tx);
        coordinator.join();

        assert!(!out.exists());
        assert!(events.try_recv().is_err());
    }
}
