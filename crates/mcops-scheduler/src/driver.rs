//! Tick driver.
//!
//! One task per scheduler: tick, then sleep for the delay the tick asked
//! for, waking early on an operator request. A tick is never interrupted;
//! shutdown takes effect between ticks so a backup in progress still gets
//! to restart the server.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[async_trait]
pub trait Scheduler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Run one tick and return the delay until the next one.
    async fn tick(&self) -> Duration;

    /// Notified when a tick should run before the delay elapses.
    fn wake_handle(&self) -> Arc<Notify>;
}

pub struct SchedulerDriver {
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for SchedulerDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerDriver {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn(&mut self, scheduler: Arc<dyn Scheduler>) {
        let name = scheduler.name();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            run_loop(scheduler, cancel).await;
        });
        info!("⏱️  {} scheduler loop started", name);
        self.tasks.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every loop and wait for the ticks in flight to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!("{} scheduler loop ended abnormally: {}", name, e);
            }
            info!("{} scheduler loop stopped", name);
        }
    }
}

async fn run_loop(scheduler: Arc<dyn Scheduler>, cancel: CancellationToken) {
    let wake = scheduler.wake_handle();
    while !cancel.is_cancelled() {
        let delay = scheduler.tick().await;
        debug!("{} next tick in {:?}", scheduler.name(), delay);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = wake.notified() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        ticks: AtomicUsize,
        wake: Arc<Notify>,
        delay: Duration,
    }

    #[async_trait]
    impl Scheduler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn tick(&self) -> Duration {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            self.delay
        }

        fn wake_handle(&self) -> Arc<Notify> {
            self.wake.clone()
        }
    }

    fn counting(delay: Duration) -> Arc<Counting> {
        Arc::new(Counting {
            ticks: AtomicUsize::new(0),
            wake: Arc::new(Notify::new()),
            delay,
        })
    }

    #[tokio::test]
    async fn test_ticks_until_shutdown() {
        let scheduler = counting(Duration::from_millis(10));
        let mut driver = SchedulerDriver::new();
        driver.spawn(scheduler.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        driver.shutdown().await;

        let ticks = scheduler.ticks.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected several ticks, got {}", ticks);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.ticks.load(Ordering::SeqCst), ticks);
    }

    #[tokio::test]
    async fn test_wake_runs_tick_early() {
        let scheduler = counting(Duration::from_secs(3600));
        let mut driver = SchedulerDriver::new();
        driver.spawn(scheduler.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.ticks.load(Ordering::SeqCst), 1);

        scheduler.wake.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.ticks.load(Ordering::SeqCst), 2);

        driver.shutdown().await;
    }
}
