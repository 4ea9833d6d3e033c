//! Periodic sensor refresh task.
//!
//! One [`Poller`] per polled sensor. The first tick fires immediately with
//! `forced = true` so a freshly constructed module publishes its state
//! without waiting a full period; subsequent ticks pass `forced = false` and
//! leave delta suppression to the callback. Overruns are skipped, not
//! compensated - sensor refresh is idempotent and non-critical.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Handle to a periodic refresh task
pub struct Poller {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start invoking `callback` every `interval` on a dedicated task
    pub fn spawn<F, Fut>(interval: Duration, callback: F) -> Self
    where
        F: Fn(bool) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut forced = true;
            loop {
                tokio::select! {
                    _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => break,
                    _ = ticker.tick() => {
                        callback(forced).await;
                        forced = false;
                    }
                }
            }
            debug!("poller stopped");
        });

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Stop the task. Idempotent; does not return until any in-flight
    /// callback has completed, and no invocation happens afterwards.
    pub async fn close(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn test_first_tick_is_immediate_and_forced() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();

        let mut poller = Poller::spawn(Duration::from_secs(60), move |forced| {
            let calls = calls_clone.clone();
            async move {
                calls.lock().await.push(forced);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        poller.close().await;

        let recorded = calls.lock().await;
        assert_eq!(*recorded, vec![true], "Exactly one forced tick expected");
    }

    #[tokio::test]
    async fn test_periodic_ticks_are_unforced() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();

        let mut poller = Poller::spawn(Duration::from_millis(20), move |forced| {
            let calls = calls_clone.clone();
            async move {
                calls.lock().await.push(forced);
            }
        });

        tokio::time::sleep(Duration::from_millis(90)).await;
        poller.close().await;

        let recorded = calls.lock().await;
        assert!(recorded.len() >= 3, "Expected several ticks, got {recorded:?}");
        assert!(recorded[0]);
        assert!(recorded[1..].iter().all(|forced| !forced));
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_callback() {
        let in_callback = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(AtomicBool::new(false));
        let in_cb = in_callback.clone();
        let done = completed.clone();

        let mut poller = Poller::spawn(Duration::from_secs(60), move |_forced| {
            let in_cb = in_cb.clone();
            let done = done.clone();
            async move {
                in_cb.store(true, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                done.store(true, Ordering::SeqCst);
            }
        });

        // Let the first callback get in flight, then close while it sleeps
        while !in_callback.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        poller.close().await;

        assert!(
            completed.load(Ordering::SeqCst),
            "close() must not return before the in-flight callback completes"
        );
    }

    #[tokio::test]
    async fn test_no_invocation_after_close() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();

        let mut poller = Poller::spawn(Duration::from_millis(10), move |_forced| {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        poller.close().await;
        let at_close = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), at_close);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut poller = Poller::spawn(Duration::from_millis(10), |_forced| async {});
        poller.close().await;
        poller.close().await;
    }
}
