/// Generic queued consumer: a FIFO of records drained by one worker thread
/// into a boxed [`RecordProcessor`].
///
/// The worker is spawned lazily on the first `queue_task` (or on `finish`
/// when nothing was ever queued). It sleeps on a condvar while the queue is
/// empty and wakes on enqueue, `finish` and `cancel`. Events are always
/// raised with the queue lock released.
use super::{CancelToken, ConsumerEvents, Outcome, RecordProcessor, StreamConsumer};
use crate::error::ScanError;
use crate::model::Record;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

struct QueueState {
    pending: VecDeque<Arc<Record>>,
    producer_done: bool,
    /// Present until the worker starts and takes ownership of it.
    processor: Option<Box<dyn RecordProcessor>>,
    worker: Option<JoinHandle<()>>,
}

struct Inner {
    name: String,
    state: Mutex<QueueState>,
    /// Signalled on enqueue, finish and cancel.
    wake: Condvar,
    /// Signalled on dequeue and cancel, for producers blocked on a full queue.
    space: Condvar,
    capacity: Option<usize>,
    cancel: CancelToken,
    events: OnceLock<Arc<dyn ConsumerEvents>>,
}

/// A [`StreamConsumer`] running a [`RecordProcessor`] on its own thread.
pub struct QueuedConsumer {
    inner: Arc<Inner>,
}

enum Step {
    Record(Arc<Record>),
    Drained,
    Cancelled,
}

impl QueuedConsumer {
    /// Wrap a processor with an unbounded queue.
    pub fn new(processor: Box<dyn RecordProcessor>) -> Self {
        Self::with_capacity(processor, None)
    }

    /// Wrap a processor. With `Some(n)`, `queue_task` blocks while `n`
    /// records are waiting.
    pub fn with_capacity(processor: Box<dyn RecordProcessor>, capacity: Option<usize>) -> Self {
        let name = processor.name().to_owned();
        Self {
            inner: Arc::new(Inner {
                name,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    producer_done: false,
                    processor: Some(processor),
                    worker: None,
                }),
                wake: Condvar::new(),
                space: Condvar::new(),
                capacity: capacity.filter(|&n| n > 0),
                cancel: CancelToken::new(),
                events: OnceLock::new(),
            }),
        }
    }

    /// Number of records waiting for the worker.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Spawn the worker if it has not started yet. Must be called with the
    /// queue lock held; the returned error is raised after releasing it.
    fn ensure_worker(&self, state: &mut QueueState) -> Option<ScanError> {
        let processor = state.processor.take()?;
        let inner = Arc::clone(&self.inner);
        let thread_name = format!("scanscribe-{}", self.inner.name);
        match thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run(inner, processor))
        {
            Ok(handle) => {
                debug!("{} worker started", self.inner.name);
                state.worker = Some(handle);
                None
            }
            Err(source) => Some(ScanError::Spawn {
                thread: thread_name,
                source,
            }),
        }
    }
}

impl StreamConsumer for QueuedConsumer {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn subscribe(&self, events: Arc<dyn ConsumerEvents>) {
        if self.inner.events.set(events).is_err() {
            warn!("{} already has an events listener", self.inner.name);
        }
    }

    fn queue_task(&self, record: Arc<Record>) {
        let spawn_error = {
            let mut state = self.inner.state.lock();
            if let Some(capacity) = self.inner.capacity {
                while state.pending.len() >= capacity && !self.inner.cancel.is_cancelled() {
                    self.inner.space.wait(&mut state);
                }
            }
            if self.inner.cancel.is_cancelled() {
                return;
            }
            state.pending.push_back(record);
            let spawn_error = self.ensure_worker(&mut state);
            self.inner.wake.notify_one();
            spawn_error
        };
        if let Some(err) = spawn_error {
            self.inner.raise_failed(err);
        }
    }

    fn finish(&self) {
        let spawn_error = {
            let mut state = self.inner.state.lock();
            if self.inner.cancel.is_cancelled() {
                return;
            }
            state.producer_done = true;
            let spawn_error = self.ensure_worker(&mut state);
            self.inner.wake.notify_all();
            spawn_error
        };
        if let Some(err) = spawn_error {
            self.inner.raise_failed(err);
        }
    }

    fn cancel(&self) {
        self.inner.cancel.cancel();
        // Notify under the lock so a worker between its check and its wait
        // cannot miss the wakeup.
        let _state = self.inner.state.lock();
        self.inner.wake.notify_all();
        self.inner.space.notify_all();
    }

    fn join(&self) {
        let handle = self.inner.state.lock().worker.take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("{} worker panicked", self.inner.name);
            }
        }
    }
}

impl Inner {
    fn raise_processed(&self, record: &Record) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(events) = self.events.get() {
            events.processed(record);
        }
    }

    fn raise_completed(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(events) = self.events.get() {
            events.completed();
        }
    }

    fn raise_failed(&self, err: ScanError) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(events) = self.events.get() {
            events.failed(err);
        }
    }

    fn next_step(&self) -> Step {
        let mut state = self.state.lock();
        loop {
            if self.cancel.is_cancelled() {
                return Step::Cancelled;
            }
            if let Some(record) = state.pending.pop_front() {
                self.space.notify_one();
                return Step::Record(record);
            }
            if state.producer_done {
                return Step::Drained;
            }
            self.wake.wait(&mut state);
        }
    }
}

/// Worker loop.
fn run(inner: Arc<Inner>, mut processor: Box<dyn RecordProcessor>) {
    loop {
        match inner.next_step() {
            Step::Record(record) => match processor.process_record(&record, &inner.cancel) {
                Ok(()) => inner.raise_processed(&record),
                Err(ScanError::Cancelled) => {
                    finalize_cancelled(&inner, processor.as_mut());
                    return;
                }
                Err(err) if inner.cancel.is_cancelled() => {
                    debug!("{}: ignoring error after cancel: {err}", inner.name);
                    finalize_cancelled(&inner, processor.as_mut());
                    return;
                }
                Err(err) => {
                    error!("{} failed: {err}", inner.name);
                    if let Err(cleanup) = processor.finalize(Outcome::Failed) {
                        warn!("{}: cleanup after failure failed: {cleanup}", inner.name);
                    }
                    inner.raise_failed(err);
                    return;
                }
            },
            Step::Drained => {
                match processor.finalize(Outcome::Completed) {
                    Ok(()) => {
                        debug!("{} completed", inner.name);
                        inner.raise_completed();
                    }
                    Err(err) => {
                        error!("{} failed to finalize: {err}", inner.name);
                        inner.raise_failed(err);
                    }
                }
                return;
            }
            Step::Cancelled => {
                finalize_cancelled(&inner, processor.as_mut());
                return;
            }
        }
    }
}

fn finalize_cancelled(inner: &Inner, processor: &mut dyn RecordProcessor) {
    debug!("{} cancelled", inner.name);
    if let Err(err) = processor.finalize(Outcome::Cancelled) {
        warn!("{}: rollback after cancel failed: {err}", inner.name);
    }
}
