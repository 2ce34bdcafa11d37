//! Cancellable background tasks.
//!
//! Every piece of background work (reconnect timers, reader, heartbeat, flush)
//! runs inside a [`TaskHandle`]. The wrapped future races its token, so a
//! cancelled task stops at its next suspension point. Dropping the handle
//! cancels the token; it does not abort the task, which lets a task drop its
//! own handle while finishing synchronously.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub(crate) struct TaskHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawns `fut`; it is dropped as soon as `token` is cancelled.
    pub(crate) fn spawn<F>(token: CancellationToken, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let t = token.clone();
        let join = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = t.cancelled() => {}
                _ = fut => {}
            }
        });
        Self { token, join }
    }

    /// Spawns `fut` after `delay`.
    pub(crate) fn delayed<F>(token: CancellationToken, delay: Duration, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(token, async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            fut.await;
        })
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
