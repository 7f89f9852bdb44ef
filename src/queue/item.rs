// src/queue/item.rs

use std::time::Duration;

use tokio::time::Instant;

use crate::types::ItemStatus;

/// A tracked unit of asynchronous work.
#[derive(Debug, Clone)]
pub struct QueueItem<P, R> {
    /// Unique and monotonic within one queue.
    pub id: u64,
    pub status: ItemStatus,
    pub payload: P,
    pub result: Option<R>,
    pub error: Option<String>,
    pub queued_at: Instant,
    pub last_activity: Instant,
    pub timeout: Duration,
}

impl<P, R> QueueItem<P, R> {
    pub(crate) fn new(id: u64, payload: P, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            id,
            status: ItemStatus::Pending,
            payload,
            result: None,
            error: None,
            queued_at: now,
            last_activity: now,
            timeout,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `pending`/`processing` items idle for longer than their timeout.
    pub fn is_stale(&self, now: Instant) -> bool {
        !self.is_terminal() && now.saturating_duration_since(self.last_activity) > self.timeout
    }

    pub(crate) fn start(&mut self) {
        self.status = ItemStatus::Processing;
        self.last_activity = Instant::now();
    }

    pub(crate) fn complete(&mut self, result: R) {
        self.status = ItemStatus::Completed;
        self.result = Some(result);
        self.last_activity = Instant::now();
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = ItemStatus::Error;
        self.error = Some(message.into());
        self.last_activity = Instant::now();
    }

    /// Convert into the outcome the driver cares about.
    pub fn into_outcome(self) -> Result<R, String> {
        match (self.status, self.result, self.error) {
            (ItemStatus::Completed, Some(result), _) => Ok(result),
            (_, _, Some(error)) => Err(error),
            (status, _, None) => Err(format!("item {} ended in state {:?}", self.id, status)),
        }
    }
}
