//! Background task that periodically reclaims idle keys.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Handle to a running sweep loop.
///
/// Dropping the handle signals the loop to exit; [`Sweeper::stop`] also
/// waits for it to finish.
pub struct Sweeper {
    period: Duration,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn a loop that calls `sweep` once per `period`.
    ///
    /// The first sweep happens one period after spawning. Ticks that are
    /// missed because a sweep ran long are delayed rather than replayed.
    /// Each sweep runs on the blocking pool since it holds synchronous
    /// locks over the whole registry. A stop request waits for the sweep in
    /// flight. Must be called from within a tokio runtime.
    pub fn spawn<F>(period: Duration, sweep: F) -> Self
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let sweep = Arc::new(sweep);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!(period = ?period, "Sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sweep = Arc::clone(&sweep);
                        match tokio::task::spawn_blocking(move || sweep()).await {
                            Ok(removed) => trace!(removed = removed, "Sweep tick completed"),
                            Err(e) => warn!(error = %e, "Sweep panicked"),
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
            debug!("Sweeper stopped");
        });

        Self {
            period,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// The interval between sweeps.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Signal the loop to exit and wait for it.
    pub async fn stop(mut self) {
        self.signal();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Sweeper task ended abnormally");
                }
            }
        }
    }

    fn signal(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // The loop may already be gone if the runtime shut down
            let _ = tx.send(());
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.signal();
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("period", &self.period)
            .field("running", &self.stop_tx.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_sweeper_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let sweeper = Sweeper::spawn(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        });

        tokio::time::sleep(Duration::from_millis(110)).await;
        sweeper.stop().await;

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several ticks, got {}", seen);

        // No more ticks once stopped
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_sweeper_first_tick_waits_one_period() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let sweeper = Sweeper::spawn(Duration::from_millis(200), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_sweep_runs_off_the_runtime_thread() {
        let caller = std::thread::current().id();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let sweeper = Sweeper::spawn(Duration::from_millis(10), move || {
            let _ = tx.send(std::thread::current().id());
            0
        });

        let sweep_thread = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no sweep within two seconds")
            .unwrap();
        assert_ne!(sweep_thread, caller);

        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_panicking_sweep_keeps_loop_alive() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let sweeper = Sweeper::spawn(Duration::from_millis(10), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first sweep fails");
            }
            0
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 2);
        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_dropping_sweeper_ends_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let sweeper = Sweeper::spawn(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        });
        assert_eq!(sweeper.period(), Duration::from_millis(10));
        drop(sweeper);

        // Let the loop observe the signal
        tokio::time::sleep(Duration::from_millis(30)).await;
        let seen = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
