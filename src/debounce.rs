//! Debouncing of restoration passes.
//!
//! Render-change events arrive in bursts. Each trigger replaces the pending
//! pass, so only the last event of a burst runs, after a quiet period. A
//! superseded pass is aborted, even if it already started.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `task` to run after the quiet period, cancelling any pass
    /// that is still scheduled or running.
    pub async fn trigger<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.take() {
            if !previous.is_finished() {
                debug!("Superseding pending restoration pass");
                previous.abort();
            }
        }

        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task().await;
        }));
    }

    /// Cancel the scheduled pass, if any. Returns true if one was cancelled.
    pub async fn cancel(&self) -> bool {
        match self.pending.lock().await.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Wait for the currently scheduled pass to finish
    pub async fn flush(&self) {
        let handle = self.pending.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));

        for i in 1..=5 {
            let runs = runs.clone();
            let last = last.clone();
            debouncer
                .trigger(move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    last.store(i, Ordering::SeqCst);
                })
                .await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        debouncer.flush().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_triggers_each_run() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let runs = runs.clone();
            debouncer
                .trigger(move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            tokio::time::sleep(Duration::from_millis(400)).await;
        }

        debouncer.flush().await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        debouncer
            .trigger(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(debouncer.cancel().await);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!debouncer.cancel().await);
    }
}
