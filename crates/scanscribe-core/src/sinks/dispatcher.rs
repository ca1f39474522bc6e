/// Marshals closures onto the thread that owns a live document.
///
/// The owner keeps the [`DispatchLoop`] and drains it from its own loop,
/// the way a UI thread drains its message queue each frame. Workers hold
/// a cloneable [`Dispatcher`] and block in [`Dispatcher::invoke`] until
/// their job has run.
use crate::error::ScanError;
use crate::pipeline::CancelToken;
use crossbeam_channel::{select, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// How often a blocked `invoke` re-checks its cancellation token.
pub const DISPATCH_POLL: Duration = Duration::from_millis(50);

type Job = Box<dyn FnOnce() + Send>;

/// Who got to a queued job first: the owner running it, or the caller
/// giving up on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Queued,
    Running,
    Abandoned,
}

/// Sending side, held by workers.
#[derive(Clone)]
pub struct Dispatcher {
    tx: Sender<Job>,
    owner: ThreadId,
}

/// Receiving side, held and drained by the owner thread.
pub struct DispatchLoop {
    rx: Receiver<Job>,
}

/// Create a dispatcher owned by the calling thread.
pub fn channel() -> (Dispatcher, DispatchLoop) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (
        Dispatcher {
            tx,
            owner: thread::current().id(),
        },
        DispatchLoop { rx },
    )
}

impl Dispatcher {
    /// Whether the calling thread is the owner.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Run `job` on the owner thread and return its result.
    ///
    /// Runs inline on the owner thread. Elsewhere it waits for the owner to
    /// drain the job, giving up with `Cancelled` once `cancel` is set and
    /// with `DispatcherClosed` if the loop was dropped.
    ///
    /// A job given up on is never run: when the owner later drains it, it
    /// is dropped unexecuted. A job the owner already started is waited for
    /// even if `cancel` is set meanwhile.
    pub fn invoke<T, F>(&self, cancel: &CancelToken, job: F) -> Result<T, ScanError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_owner_thread() {
            return Ok(job());
        }

        let state = Arc::new(Mutex::new(JobState::Queued));
        let job_state = Arc::clone(&state);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.tx
            .send(Box::new(move || {
                {
                    let mut state = job_state.lock();
                    if *state == JobState::Abandoned {
                        return;
                    }
                    *state = JobState::Running;
                }
                let _ = done_tx.send(job());
            }))
            .map_err(|_| ScanError::DispatcherClosed)?;

        loop {
            if cancel.is_cancelled() {
                let mut state = state.lock();
                if *state == JobState::Queued {
                    *state = JobState::Abandoned;
                    return Err(ScanError::Cancelled);
                }
                drop(state);
                return done_rx.recv().map_err(|_| ScanError::DispatcherClosed);
            }
            match done_rx.recv_timeout(DISPATCH_POLL) {
                Ok(value) => return Ok(value),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(ScanError::DispatcherClosed),
            }
        }
    }
}

impl DispatchLoop {
    /// Run every job queued so far. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Run jobs as they arrive until `events` yields a value or `timeout`
    /// elapses. Jobs already queued when the event arrives are run first.
    pub fn run_until<T>(&self, events: &Receiver<T>, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            select! {
                recv(self.rx) -> job => match job {
                    Ok(job) => job(),
                    // Every `Dispatcher` is gone; only the event can still arrive.
                    Err(_) => return events.recv_timeout(remaining).ok(),
                },
                recv(events) -> event => {
                    self.run_pending();
                    return event.ok();
                },
                default(remaining) => return None,
            }
        }
    }
}
