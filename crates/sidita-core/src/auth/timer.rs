use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Longest wait the timer will honor; later deadlines are pulled in to this.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365);

struct Scheduled {
    handle: JoinHandle<()>,
    deadline: Instant,
}

/// Owns at most one pending deferred task. `start` replaces whatever was
/// pending; `stop` cancels it. Dropping the timer cancels it too.
#[derive(Default)]
pub struct RefreshTimer {
    pending: Mutex<Option<Scheduled>>,
}

impl RefreshTimer {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, Option<Scheduled>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `task` after `delay`, cancelling any previously scheduled task.
    /// Must be called from within a Tokio runtime.
    pub fn start<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = delay.min(MAX_DELAY);
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            task.await;
        });

        let previous = self.pending().replace(Scheduled { handle, deadline });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        debug!(delay_ms = delay.as_millis() as u64, "Refresh timer started");
    }

    pub fn stop(&self) {
        if let Some(previous) = self.pending().take() {
            previous.handle.abort();
            debug!("Refresh timer stopped");
        }
    }

    /// A task is scheduled and has not run to completion
    pub fn is_scheduled(&self) -> bool {
        self.pending()
            .as_ref()
            .map(|s| !s.handle.is_finished())
            .unwrap_or(false)
    }

    /// When the pending task is due, if one is scheduled
    pub fn deadline(&self) -> Option<Instant> {
        self.pending()
            .as_ref()
            .filter(|s| !s.handle.is_finished())
            .map(|s| s.deadline)
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        if let Some(previous) = self.pending().take() {
            previous.handle.abort();
        }
    }
}
