//! Cancellable polling loop for the remote exam timer.

use std::{future::Future, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Shorter periods are raised to this; `tokio::time::interval` rejects zero.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Owns at most one polling task.
///
/// Every `start` and `cancel` bumps `generation`. A tick carries the
/// generation it was spawned under, and its result is only applied while
/// `accepts` still agrees, so a fetch that was in flight when the loop was
/// cancelled cannot touch state afterwards.
#[derive(Debug, Default)]
pub struct TimerSynchronizer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl TimerSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts polling, replacing any running loop. `tick` runs once right
    /// away and then once per `interval`; returning `false` ends the loop.
    pub fn start<F, Fut>(&mut self, interval: Duration, tick: F) -> u64
    where
        F: Fn(u64) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let interval = interval.max(MIN_POLL_INTERVAL);
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.task = Some(tokio::spawn(async move {
            loop {
                ticker.tick().await;
                if !tick(generation).await {
                    debug!(generation, "timer: polling loop finished");
                    break;
                }
            }
        }));
        debug!(generation, interval_ms = interval.as_millis() as u64, "timer: polling started");
        generation
    }

    /// Synchronous and idempotent.
    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(generation = self.generation, "timer: polling cancelled");
        }
    }

    pub fn accepts(&self, generation: u64) -> bool {
        self.task.is_some() && self.generation == generation
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for TimerSynchronizer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
