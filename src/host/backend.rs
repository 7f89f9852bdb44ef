// src/host/backend.rs

//! Pluggable host backend abstraction.
//!
//! The host bridge services worker capability calls through a
//! `HostBackend` instead of touching the network, filesystem or processes
//! directly. Production uses [`NativeHost`](crate::host::NativeHost); tests
//! provide scripted fakes.

use tokio::sync::mpsc;
use tracing::trace;

use crate::protocol::{HostCall, HostReply, ToWorker};
use crate::telemetry::TransferProgress;
use crate::types::BoxFuture;

pub trait HostBackend: Send + Sync + 'static {
    /// Perform one privileged operation. Failures are human-readable strings.
    fn invoke(
        &self,
        call: HostCall,
        progress: ProgressReporter,
    ) -> BoxFuture<'_, std::result::Result<HostReply, String>>;

    /// Evaluate challenge code in an isolated sandbox and return its output.
    fn evaluate(&self, code: String) -> BoxFuture<'_, std::result::Result<String, String>>;
}

/// Forwards byte-level download progress to the worker.
///
/// Reporting never blocks; updates that do not fit are dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    to_worker: Option<mpsc::Sender<ToWorker>>,
}

impl ProgressReporter {
    pub fn new(to_worker: mpsc::Sender<ToWorker>) -> Self {
        Self {
            to_worker: Some(to_worker),
        }
    }

    /// A reporter that goes nowhere.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn report(&self, progress: TransferProgress) {
        let Some(tx) = &self.to_worker else {
            return;
        };
        if tx.try_send(ToWorker::DownloadProgress { progress }).is_err() {
            trace!("progress update dropped");
        }
    }
}
