use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use quire_types::{Operation, RepoStatus};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::status::{BusyReporter, StatusPublisher, StatusStream};

/// Exclusive hold on a working copy. Released on drop.
pub type SessionGuard = OwnedMutexGuard<()>;

/// Coordinator for one working copy: serializes mutating operations and
/// publishes the copy's status.
pub struct RepoSession {
    workdir: PathBuf,
    config: SessionConfig,
    lock: Arc<Mutex<()>>,
    pending: AtomicUsize,
    status: Arc<StatusPublisher>,
}

impl RepoSession {
    pub fn new(workdir: impl Into<PathBuf>, config: SessionConfig) -> Self {
        let workdir = workdir.into();
        let status = StatusPublisher::new(
            workdir.clone(),
            config.status_throttle(),
            config.status_channel_capacity,
        );
        Self {
            workdir,
            config,
            lock: Arc::new(Mutex::new(())),
            pending: AtomicUsize::new(0),
            status: Arc::new(status),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Wait for exclusive access.
    ///
    /// Fails fast with `LockBusy` when `max_pending` acquisitions are already
    /// waiting, and with `LockTimeout` after the configured timeout.
    pub async fn acquire(&self, operation: Operation) -> SessionResult<SessionGuard> {
        self.ensure_open()?;

        let waiting = PendingSlot::enter(&self.pending);
        if waiting.ahead >= self.config.max_pending {
            warn!(workdir = %self.workdir.display(), operation = %operation, queued = waiting.ahead, "too many queued operations");
            return Err(self.busy(operation));
        }

        let started = Instant::now();
        match tokio::time::timeout(self.config.lock_timeout(), Arc::clone(&self.lock).lock_owned()).await {
            Ok(guard) => {
                debug!(workdir = %self.workdir.display(), operation = %operation, "acquired session lock");
                Ok(guard)
            }
            Err(_) => Err(SessionError::LockTimeout {
                workdir: self.workdir.clone(),
                operation,
                waited_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    /// Take exclusive access only if nobody holds it.
    pub fn try_acquire(&self, operation: Operation) -> SessionResult<SessionGuard> {
        self.ensure_open()?;
        Arc::clone(&self.lock)
            .try_lock_owned()
            .map_err(|_| self.busy(operation))
    }

    /// Whether a mutating operation currently holds the working copy.
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Run `job` on the blocking pool while holding the working copy.
    ///
    /// Status turns busy before the job starts and ready once it returns.
    /// The job keeps running, and still reports ready, if the caller stops
    /// waiting for it.
    pub async fn run_exclusive<T, E, F>(&self, operation: Operation, job: F) -> Result<T, E>
    where
        F: FnOnce(&BusyReporter) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<SessionError> + Send + 'static,
    {
        let guard = self.acquire(operation).await?;
        self.spawn_job(guard, operation, job).await
    }

    /// Like [`run_exclusive`](Self::run_exclusive), but fails with `LockBusy`
    /// instead of queueing behind another operation.
    pub async fn try_run_exclusive<T, E, F>(&self, operation: Operation, job: F) -> Result<T, E>
    where
        F: FnOnce(&BusyReporter) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<SessionError> + Send + 'static,
    {
        let guard = self.try_acquire(operation)?;
        self.spawn_job(guard, operation, job).await
    }

    async fn spawn_job<T, E, F>(&self, guard: SessionGuard, operation: Operation, job: F) -> Result<T, E>
    where
        F: FnOnce(&BusyReporter) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<SessionError> + Send + 'static,
    {
        self.status.publish(RepoStatus::busy(operation));
        let status = Arc::clone(&self.status);
        let reporter = BusyReporter::new(Arc::clone(&status), operation);
        let workdir = self.workdir.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let started = Instant::now();
            let result = job(&reporter);
            status.publish(RepoStatus::Ready);
            info!(
                workdir = %workdir.display(),
                operation = %operation,
                ok = result.is_ok(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "operation finished"
            );
            result
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                self.status.publish(RepoStatus::Ready);
                Err(SessionError::Join(e.to_string()).into())
            }
        }
    }

    pub fn latest_status(&self) -> RepoStatus {
        self.status.latest()
    }

    /// Subscribe to status updates. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> SessionResult<StatusStream> {
        self.status
            .subscribe()
            .ok_or_else(|| SessionError::Closed(self.workdir.clone()))
    }

    /// Close the status channel. Later acquisitions fail with `Closed`.
    pub fn shutdown(&self) {
        self.status.close();
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.workdir.clone()));
        }
        Ok(())
    }

    fn busy(&self, operation: Operation) -> SessionError {
        SessionError::LockBusy {
            workdir: self.workdir.clone(),
            operation,
        }
    }
}

impl std::fmt::Debug for RepoSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoSession")
            .field("workdir", &self.workdir)
            .field("busy", &self.is_busy())
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .finish()
    }
}

/// Counts a waiting acquisition for as long as it lives.
struct PendingSlot<'a> {
    counter: &'a AtomicUsize,
    ahead: usize,
}

impl<'a> PendingSlot<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let ahead = counter.fetch_add(1, Ordering::SeqCst);
        Self { counter, ahead }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
