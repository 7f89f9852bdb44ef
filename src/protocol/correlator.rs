// src/protocol/correlator.rs

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::{BridgeError, Result};

type Pending<T> = HashMap<u64, oneshot::Sender<Result<T>>>;

/// Pending-call table for one kind of correlated cross-context call.
///
/// Every call gets a fresh id and a oneshot slot. The slot is settled by a
/// matching response, by the caller's own timeout, or by [`fail_all`] when
/// the other side goes away, whichever happens first.
///
/// [`fail_all`]: Correlator::fail_all
pub struct Correlator<T> {
    name: &'static str,
    next_id: AtomicU64,
    pending: Mutex<Pending<T>>,
}

impl<T> fmt::Debug for Correlator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish()
    }
}

impl<T: Send + 'static> Correlator<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Correlator<T> {
    fn lock(&self) -> MutexGuard<'_, Pending<T>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Allocate an id and the receiving half of its slot.
    pub fn register(&self) -> (u64, oneshot::Receiver<Result<T>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        (id, rx)
    }

    /// Drop a slot without settling it.
    pub fn forget(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Register, send with `send(id)`, then wait up to `timeout` for the
    /// matching response.
    ///
    /// A timeout is synthesised locally and removes the slot, so a late
    /// response is discarded by [`resolve`](Correlator::resolve).
    pub async fn call<F, Fut>(&self, what: &str, timeout: Duration, send: F) -> Result<T>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let (id, rx) = self.register();

        if let Err(err) = send(id).await {
            self.forget(id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::ContextClosed(format!(
                "{} call {} dropped",
                self.name, id
            ))),
            Err(_) => {
                self.forget(id);
                warn!(correlator = self.name, id, what, ?timeout, "call timed out");
                Err(BridgeError::Timeout {
                    what: what.to_string(),
                    after: timeout,
                })
            }
        }
    }

    /// Settle the slot for `id`. Unknown or already-settled ids are logged
    /// and discarded; returns whether a waiter was found.
    pub fn resolve(&self, id: u64, result: std::result::Result<T, String>) -> bool {
        let Some(tx) = self.lock().remove(&id) else {
            debug!(correlator = self.name, id, "response for unknown id discarded");
            return false;
        };
        let _ = tx.send(result.map_err(BridgeError::Remote));
        true
    }

    /// Fail every outstanding call with `reason`.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(BridgeError::ContextClosed(reason.to_string())));
        }
        if count > 0 {
            warn!(correlator = self.name, count, reason, "failed all pending calls");
        }
        count
    }
}
