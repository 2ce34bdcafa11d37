//! # Reconnection scheduler.
//!
//! Owns at most one pending attempt timer. Scheduling a new attempt replaces
//! (and cancels) the previous one; the delay itself comes from
//! [`BackoffPolicy::delay`](crate::BackoffPolicy::delay), computed by the
//! supervisor from its attempt counter.
//!
//! ```text
//! failure n ─► delay(n) ─► schedule(session, delay, attempt) ─► [timer] ─► attempt()
//!                                   │
//!                                   └─► previous timer cancelled
//! ```

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::timer::TaskHandle;

#[derive(Debug, Default)]
pub(crate) struct ReconnectScheduler {
    pending: Mutex<Option<TaskHandle>>,
}

impl ReconnectScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms the timer under a child of `session`, replacing any pending one.
    pub(crate) fn schedule<F>(&self, session: &CancellationToken, delay: Duration, attempt: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let next = TaskHandle::delayed(session.child_token(), delay, attempt);
        let prev = self.pending.lock().replace(next);
        drop(prev);
    }

    /// Cancels the pending timer, if any.
    pub(crate) fn cancel(&self) {
        if let Some(h) = self.pending.lock().take() {
            h.cancel();
        }
    }

    /// True while a timer is armed or its attempt is running.
    pub(crate) fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
