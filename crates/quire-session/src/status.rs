//! Status fan-out for one working copy.
//!
//! Transitions to or from `ready` go out immediately. Consecutive busy
//! updates are spaced by the throttle interval; the last one in a burst is
//! delivered once the interval has passed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use quire_types::{BusyStatus, Operation, Progress, RepoStatus};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Receiver of a working copy's status updates.
pub type StatusStream = broadcast::Receiver<RepoStatus>;

pub(crate) struct StatusPublisher {
    workdir: PathBuf,
    throttle: Duration,
    sender: Mutex<Option<broadcast::Sender<RepoStatus>>>,
    current: Mutex<Current>,
    last_emit: Mutex<Option<Instant>>,
}

/// The latest status and how many updates preceded it. Held while emitting
/// so a deferred update can never overtake a newer one.
struct Current {
    status: RepoStatus,
    generation: u64,
}

impl StatusPublisher {
    pub(crate) fn new(workdir: PathBuf, throttle: Duration, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            workdir,
            throttle,
            sender: Mutex::new(Some(sender)),
            current: Mutex::new(Current {
                status: RepoStatus::Ready,
                generation: 0,
            }),
            last_emit: Mutex::new(None),
        }
    }

    pub(crate) fn latest(&self) -> RepoStatus {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).status.clone()
    }

    pub(crate) fn subscribe(&self) -> Option<StatusStream> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        sender.as_ref().map(broadcast::Sender::subscribe)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Drop the sender; every subscriber sees the channel close.
    pub(crate) fn close(&self) {
        let taken = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        if taken.is_some() {
            debug!(workdir = %self.workdir.display(), "status channel closed");
        }
    }

    pub(crate) fn publish(self: &Arc<Self>, status: RepoStatus) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut current.status, status.clone());
        current.generation += 1;
        let generation = current.generation;

        if !(previous.is_busy() && status.is_busy()) {
            self.emit(status);
            return;
        }

        let since_last = self
            .last_emit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|at| at.elapsed());
        let wait = match since_last {
            Some(elapsed) if elapsed < self.throttle => self.throttle - elapsed,
            _ => {
                self.emit(status);
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.emit(status);
            return;
        };
        trace!(workdir = %self.workdir.display(), "deferring busy status update");
        let publisher = Arc::clone(self);
        runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            let current = publisher.current.lock().unwrap_or_else(PoisonError::into_inner);
            if current.generation == generation {
                publisher.emit(current.status.clone());
            }
        });
    }

    fn emit(&self, status: RepoStatus) {
        *self.last_emit.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = sender.as_ref() {
            // No subscribers is fine; the value stays available via `latest`.
            let _ = sender.send(status);
        }
    }
}

/// Handle a running job uses to report its progress.
#[derive(Clone)]
pub struct BusyReporter {
    publisher: Arc<StatusPublisher>,
    operation: Operation,
}

impl BusyReporter {
    pub(crate) fn new(publisher: Arc<StatusPublisher>, operation: Operation) -> Self {
        Self { publisher, operation }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn progress(&self, progress: Progress) {
        let status = BusyStatus::new(self.operation).with_progress(progress);
        self.publisher.publish(RepoStatus::Busy(status));
    }

    pub fn network_error(&self, message: impl Into<String>) {
        let mut status = BusyStatus::new(self.operation);
        status.network_error = Some(message.into());
        self.publisher.publish(RepoStatus::Busy(status));
    }

    pub fn awaiting_password(&self) {
        let mut status = BusyStatus::new(self.operation);
        status.awaiting_password = true;
        self.publisher.publish(RepoStatus::Busy(status));
    }
}

impl std::fmt::Debug for BusyReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusyReporter")
            .field("workdir", &self.publisher.workdir)
            .field("operation", &self.operation)
            .finish()
    }
}
