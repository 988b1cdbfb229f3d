//! Poll scheduler
//!
//! Each input group runs on its own named OS thread and is polled at a fixed
//! interval. Bus reads block, so the pollers stay off the async runtime; they
//! reach the dispatcher through its non-blocking handle.
//!
//! The interval doubles as the debounce window: a switch bounce shorter than
//! one interval is never observed.

pub mod pollers;

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::hal;

pub use pollers::{EncoderPoller, JoystickPoller, KeypadPoller};

/// A unit of work run once per poll cycle
pub trait PollTask: Send + 'static {
    /// Thread name, also used in log lines
    fn name(&self) -> &str;

    /// Run one cycle; an error skips the rest of the cycle
    fn poll(&mut self) -> hal::Result<()>;
}

/// Owns the poller threads and the shared shutdown flag
pub struct PollScheduler {
    shutdown_tx: watch::Sender<bool>,
    threads: Vec<(String, JoinHandle<()>)>,
}

impl PollScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            threads: Vec::new(),
        }
    }

    /// Start `task` on a dedicated thread, polled every `interval`
    pub fn spawn<T: PollTask>(&mut self, task: T, interval: Duration) -> Result<()> {
        let name = task.name().to_string();
        let shutdown_rx = self.shutdown_tx.subscribe();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(task, interval, shutdown_rx))
            .with_context(|| format!("Failed to spawn poller thread '{}'", name))?;

        info!(poller = %name, interval_ms = interval.as_millis() as u64, "Poller started");
        self.threads.push((name, handle));
        Ok(())
    }

    /// Number of running pollers
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Raise the shutdown flag and wait for every poller to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        for (name, handle) in self.threads {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => debug!(poller = %name, "Poller joined"),
                Ok(Err(_)) => warn!(poller = %name, "Poller thread panicked"),
                Err(e) => warn!(poller = %name, "Failed to join poller: {}", e),
            }
        }
        info!("All pollers stopped");
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn run_loop<T: PollTask>(mut task: T, interval: Duration, shutdown_rx: watch::Receiver<bool>) {
    let mut failures: u64 = 0;

    while !*shutdown_rx.borrow() {
        let started = Instant::now();

        match task.poll() {
            Ok(()) => {
                if failures > 0 {
                    info!(poller = task.name(), failures, "Poller recovered");
                    failures = 0;
                }
            }
            Err(e) => {
                failures += 1;
                // Only the first failure of a streak is worth a warning
                if failures == 1 {
                    warn!(poller = task.name(), "Poll cycle failed: {}", e);
                } else {
                    debug!(poller = task.name(), failures, "Poll cycle failed: {}", e);
                }
            }
        }

        thread::sleep(interval.saturating_sub(started.elapsed()));
    }

    debug!(poller = task.name(), "Poller loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter {
        count: Arc<AtomicUsize>,
        fail: bool,
    }

    impl PollTask for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn poll(&mut self) -> hal::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(hal::HalError::Unavailable("test".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pollers_run_until_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();
        scheduler
            .spawn(
                Counter {
                    count: count.clone(),
                    fail: false,
                },
                Duration::from_millis(1),
            )
            .unwrap();
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        scheduler.shutdown().await;

        let after = count.load(Ordering::SeqCst);
        assert!(after > 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), after);
    }

    #[tokio::test]
    async fn test_failing_poller_keeps_running() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PollScheduler::new();
        scheduler
            .spawn(
                Counter {
                    count: count.clone(),
                    fail: true,
                },
                Duration::from_millis(1),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        scheduler.shutdown().await;
        assert!(count.load(Ordering::SeqCst) > 1);
    }
}
