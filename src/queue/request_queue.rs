// src/queue/request_queue.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{BridgeError, Result};
use crate::queue::capability::Capability;
use crate::queue::item::QueueItem;
use crate::queue::sweeper::Sweepable;
use crate::types::{ItemStatus, QueueKind};

/// Poll cadence and budget for one queue kind.
///
/// `timeout` is both the `wait` budget and the idle limit the sweeper
/// enforces on each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTiming {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

pub type ItemOf<C> = QueueItem<<C as Capability>::Payload, <C as Capability>::Output>;

struct QueueState<P, R> {
    items: HashMap<u64, QueueItem<P, R>>,
    next_id: u64,
    /// A drain task is alive for this queue.
    draining: bool,
    /// Work arrived while draining; the live task must take another pass.
    retrigger: bool,
}

struct Shared<C: Capability> {
    capability: C,
    timing: QueueTiming,
    state: Mutex<QueueState<C::Payload, C::Output>>,
}

impl<C: Capability> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, QueueState<C::Payload, C::Output>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Generic request queue: tracks items by id and status and drains pending
/// items through its capability on a background task.
///
/// Cloning yields another handle to the same queue.
pub struct RequestQueue<C: Capability> {
    shared: Arc<Shared<C>>,
}

impl<C: Capability> Clone for RequestQueue<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Capability> fmt::Debug for RequestQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("kind", &self.kind())
            .field("timing", &self.shared.timing)
            .field("len", &self.len())
            .finish()
    }
}

impl<C: Capability> RequestQueue<C> {
    pub fn new(capability: C, timing: QueueTiming) -> Self {
        Self {
            shared: Arc::new(Shared {
                capability,
                timing,
                state: Mutex::new(QueueState {
                    items: HashMap::new(),
                    next_id: 0,
                    draining: false,
                    retrigger: false,
                }),
            }),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.shared.capability.kind()
    }

    pub fn timing(&self) -> QueueTiming {
        self.shared.timing
    }

    /// Number of items not yet consumed.
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate and store a payload as pending, then schedule processing.
    ///
    /// Never blocks: the processing pass runs on a spawned task, so the
    /// caller gets control back before any work starts. Must be called from
    /// within a Tokio runtime.
    pub fn enqueue(&self, payload: C::Payload) -> Result<u64> {
        self.shared.capability.validate(&payload)?;

        let id = {
            let mut state = self.shared.lock();
            state.next_id += 1;
            let id = state.next_id;
            state
                .items
                .insert(id, QueueItem::new(id, payload, self.shared.timing.timeout));
            id
        };

        info!(kind = %self.kind(), id, "queued request");
        self.trigger();
        Ok(id)
    }

    /// Non-blocking check. Returns the item exactly once after it reaches a
    /// terminal state; `None` while it is in flight and for unknown ids.
    pub fn poll(&self, id: u64) -> Option<ItemOf<C>> {
        let mut state = self.shared.lock();
        match state.items.get(&id) {
            None => {
                debug!(kind = %self.kind(), id, "poll: item not found");
                None
            }
            Some(item) if item.is_terminal() => {
                debug!(kind = %self.kind(), id, status = ?item.status, "poll: consuming item");
                state.items.remove(&id)
            }
            Some(_) => None,
        }
    }

    /// True while the item exists and is `pending` or `processing`.
    pub fn is_pending(&self, id: u64) -> bool {
        self.shared
            .lock()
            .items
            .get(&id)
            .is_some_and(|item| !item.is_terminal())
    }

    /// Wait for the item to reach a terminal state by polling at the queue's
    /// interval.
    ///
    /// Once the budget is spent the item is consumed as a synthesised error
    /// instead of waiting longer. Only an id that is not (or no longer)
    /// tracked is rejected outright.
    pub async fn wait(&self, id: u64) -> Result<ItemOf<C>> {
        let timing = self.shared.timing;
        let started = Instant::now();

        loop {
            tokio::time::sleep(timing.poll_interval).await;

            let mut state = self.shared.lock();
            let Some(item) = state.items.get_mut(&id) else {
                return Err(BridgeError::ItemNotFound {
                    kind: self.kind(),
                    id,
                });
            };

            if item.is_terminal() {
                debug!(kind = %self.kind(), id, status = ?item.status, "wait: settled");
                return state.items.remove(&id).ok_or(BridgeError::ItemNotFound {
                    kind: self.kind(),
                    id,
                });
            }

            if started.elapsed() > timing.timeout {
                item.fail(format!("{} request timed out", self.kind()));
                warn!(kind = %self.kind(), id, budget = ?timing.timeout, "wait budget exhausted");
                return state.items.remove(&id).ok_or(BridgeError::ItemNotFound {
                    kind: self.kind(),
                    id,
                });
            }
        }
    }

    /// Refresh `last_activity` on every item currently being processed.
    ///
    /// Used when the host reports transfer progress so long downloads are not
    /// swept while they are still moving.
    pub fn touch_processing(&self) -> usize {
        let now = Instant::now();
        let mut state = self.shared.lock();
        let mut touched = 0;
        for item in state.items.values_mut() {
            if item.status == ItemStatus::Processing {
                item.last_activity = now;
                touched += 1;
            }
        }
        touched
    }

    /// Start a drain task unless one is already alive, in which case it is
    /// told to take one more pass.
    fn trigger(&self) {
        {
            let mut state = self.shared.lock();
            if state.draining {
                state.retrigger = true;
                debug!(kind = %self.kind(), "processing already in progress; retrigger absorbed");
                return;
            }
            state.draining = true;
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            drain(shared).await;
        });
    }
}

/// Run processing passes until no work arrived during the last one.
///
/// Everything enqueued before this task exits is processed by it, so items
/// are never stranded waiting for a later trigger.
async fn drain<C: Capability>(shared: Arc<Shared<C>>) {
    let kind = shared.capability.kind();
    let mut guard = DrainGuard {
        shared: Arc::clone(&shared),
        finished: false,
    };

    loop {
        let batch = snapshot_pending(&shared);
        debug!(%kind, count = batch.len(), "processing pass started");

        for (id, payload) in batch {
            let outcome = shared.capability.execute(payload).await;
            record_outcome(&shared, id, outcome);
        }

        let mut state = shared.lock();
        if state.retrigger {
            state.retrigger = false;
            continue;
        }
        state.draining = false;
        guard.finished = true;
        debug!(%kind, "processing finished");
        break;
    }
}

/// Releases the drain slot when a drain task unwinds or is cancelled, so the
/// next enqueue can start a fresh one.
struct DrainGuard<C: Capability> {
    shared: Arc<Shared<C>>,
    finished: bool,
}

impl<C: Capability> Drop for DrainGuard<C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let kind = self.shared.capability.kind();
        let mut state = self.shared.lock();
        state.draining = false;
        state.retrigger = false;

        // Only one drain task runs per queue, so every processing item was ours.
        let mut failed = 0;
        for item in state.items.values_mut() {
            if item.status == ItemStatus::Processing {
                item.fail(format!("{kind} processing aborted"));
                failed += 1;
            }
        }
        warn!(%kind, failed, "processing task ended abnormally");
    }
}

fn snapshot_pending<C: Capability>(shared: &Shared<C>) -> Vec<(u64, C::Payload)> {
    let mut state = shared.lock();
    let mut batch: Vec<(u64, C::Payload)> = state
        .items
        .values_mut()
        .filter(|item| item.status == ItemStatus::Pending)
        .map(|item| {
            item.start();
            (item.id, item.payload.clone())
        })
        .collect();
    batch.sort_by_key(|(id, _)| *id);
    batch
}

fn record_outcome<C: Capability>(
    shared: &Shared<C>,
    id: u64,
    outcome: std::result::Result<C::Output, String>,
) {
    let kind = shared.capability.kind();
    let mut state = shared.lock();

    let Some(item) = state.items.get_mut(&id) else {
        debug!(%kind, id, "outcome for consumed item discarded");
        return;
    };
    if item.status != ItemStatus::Processing {
        debug!(%kind, id, status = ?item.status, "outcome for settled item discarded");
        return;
    }

    match outcome {
        Ok(result) => {
            info!(%kind, id, "request completed");
            item.complete(result);
        }
        Err(message) => {
            warn!(%kind, id, error = %message, "request failed");
            item.fail(message);
        }
    }
}

impl<C: Capability> Sweepable for RequestQueue<C> {
    fn kind(&self) -> QueueKind {
        RequestQueue::kind(self)
    }

    fn sweep(&self, now: Instant) -> usize {
        let kind = RequestQueue::kind(self);
        let mut state = self.shared.lock();
        let mut swept = 0;
        for item in state.items.values_mut() {
            if item.is_stale(now) {
                item.fail(format!(
                    "{} request timed out after {}ms",
                    kind,
                    item.timeout.as_millis()
                ));
                warn!(%kind, id = item.id, "request timed out");
                swept += 1;
            }
        }
        swept
    }
}
