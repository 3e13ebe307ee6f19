//! Write job status and the shared state the worker publishes it through

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Progress of one submitted write job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteStatus {
    /// Queued or being written
    Pending,
    /// Every entry of the job was written
    Ok,
    /// The job failed; see [`crate::ZipArchive::job_error`] for the cause
    Error,
}

impl WriteStatus {
    /// `Ok` and `Error` never change once reached
    pub fn is_terminal(self) -> bool {
        !matches!(self, WriteStatus::Pending)
    }
}

impl std::fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WriteStatus::Pending => "pending",
            WriteStatus::Ok => "ok",
            WriteStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct Outcome {
    status: WriteStatus,
    error: Option<String>,
}

/// Status cell shared between the submitting handle and the worker
#[derive(Debug)]
pub(crate) struct JobState {
    outcome: Mutex<Outcome>,
    done: Condvar,
    #[cfg(feature = "async")]
    watch: tokio::sync::watch::Sender<WriteStatus>,
}

impl JobState {
    pub(crate) fn new() -> Self {
        Self {
            outcome: Mutex::new(Outcome {
                status: WriteStatus::Pending,
                error: None,
            }),
            done: Condvar::new(),
            #[cfg(feature = "async")]
            watch: tokio::sync::watch::channel(WriteStatus::Pending).0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Outcome> {
        // the worker never panics while holding the lock, the data is always consistent
        self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn status(&self) -> WriteStatus {
        self.lock().status
    }

    pub(crate) fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub(crate) fn succeed(&self) -> bool {
        self.settle(WriteStatus::Ok, None)
    }

    pub(crate) fn fail(&self, cause: String) -> bool {
        self.settle(WriteStatus::Error, Some(cause))
    }

    /// Move from `Pending` to a terminal status. Returns false, changing nothing,
    /// when the job already settled.
    fn settle(&self, status: WriteStatus, error: Option<String>) -> bool {
        debug_assert!(status.is_terminal());
        {
            let mut outcome = self.lock();
            if outcome.status.is_terminal() {
                return false;
            }
            outcome.status = status;
            outcome.error = error;
        }
        self.done.notify_all();
        #[cfg(feature = "async")]
        self.watch.send_replace(status);
        true
    }

    /// Block until the job settles or `timeout` elapses, returning the last status seen
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> WriteStatus {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut outcome = self.lock();
        while !outcome.status.is_terminal() {
            outcome = match deadline {
                None => self.done.wait(outcome).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.done
                        .wait_timeout(outcome, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
        outcome.status
    }

    #[cfg(feature = "async")]
    pub(crate) async fn wait_async(&self) -> WriteStatus {
        let mut rx = self.watch.subscribe();
        match rx.wait_for(|status| status.is_terminal()).await {
            Ok(status) => *status,
            // the sender lives in self, so it cannot be gone while we borrow it
            Err(_) => self.status(),
        }
    }
}
