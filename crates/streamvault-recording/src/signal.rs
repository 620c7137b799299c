//! Cooperative stop signal.
//!
//! A `StopSignal` is the single shared `done` flag for a replay or
//! recording session. Setting it is idempotent and safe from any task — a
//! stream task, the progress task, or an external disconnect handler. No
//! task is force-killed: each one observes the flag at its next checkpoint
//! (between entries, after each wait), which bounds shutdown latency to one
//! in-flight operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Idempotent; concurrent callers are fine.
    pub fn set(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Wait until the signal is raised.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// Wait up to `timeout` for the signal; returns whether it was raised.
    /// This doubles as an interruptible sleep for pacing loops.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_is_idempotent_and_wakes_waiters() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        signal.set();
        signal.set();
        waiter.await.unwrap();
        assert!(signal.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_timeout_elapses_when_unset() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(50)).await);
        signal.set();
        assert!(signal.wait_timeout(Duration::from_millis(50)).await);
    }
}
