// src/queue/sweeper.rs

//! Periodic timeout sweep across every request queue.
//!
//! Guarantees that no waiter can hang forever even if a processing pass
//! stalls or a cross-context message is lost.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::types::QueueKind;

/// Something that can force-fail its stale items.
pub trait Sweepable: Send + Sync {
    fn kind(&self) -> QueueKind;

    /// Transition every `pending`/`processing` item idle for longer than its
    /// timeout to `error`. Returns the number of items swept.
    fn sweep(&self, now: Instant) -> usize;
}

pub struct TimeoutSweeper {
    queues: Vec<Arc<dyn Sweepable>>,
}

impl TimeoutSweeper {
    pub fn new(queues: Vec<Arc<dyn Sweepable>>) -> Self {
        Self { queues }
    }

    /// Run one sweep over every queue.
    pub fn sweep_now(&self) -> usize {
        let now = Instant::now();
        let mut total = 0;
        for queue in &self.queues {
            let swept = queue.sweep(now);
            if swept > 0 {
                info!(kind = %queue.kind(), swept, "timeout sweep failed stale items");
            }
            total += swept;
        }
        total
    }

    /// Start sweeping every `period` until the returned handle is stopped or
    /// dropped.
    pub fn spawn(self, period: Duration) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing can be stale yet.
            ticker.tick().await;
            info!(?period, "timeout sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_now();
                    }
                    _ = &mut stop_rx => {
                        debug!("timeout sweeper stopping");
                        break;
                    }
                }
            }
        });

        SweeperHandle {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// Owner of a running sweeper task.
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the sweeper and wait for its task to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
