// src/worker/mod.rs

//! The worker context: request queues, retry driver, command queue and
//! telemetry for one extraction runtime.
//!
//! A worker runs two tasks. The router reads every message from the host
//! and settles correlated calls immediately. Top-level requests are handed
//! to the request task, which handles them one at a time so that no two
//! driver calls ever overlap on the same worker. A watcher notices when the
//! request task dies and tells the host, so no caller waits out its timeout.

pub mod capabilities;
pub mod context;
pub mod link;
pub mod program;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::ConfigFile;
use crate::protocol::{ToHost, ToWorker, WorkerRequest};
use crate::queue::RequestQueue;

pub use capabilities::{ChallengeCapability, DownloadCapability, FetchCapability};
pub use context::{WorkerContext, WorkerResolver};
pub use link::{HostSink, RpcLink};
pub use program::{DirectMediaProgram, ExtractionProgram};

/// Capacity of the host-bound channel. Telemetry beyond this is dropped.
pub const HOST_CHANNEL_CAPACITY: usize = 1024;

const WORKER_CRASHED: &str = "worker crashed";

/// Owner of a running worker.
///
/// Dropping the handle terminates the worker and fails every correlated
/// call it still has outstanding.
pub struct WorkerHandle {
    to_worker: mpsc::Sender<ToWorker>,
    link: Arc<RpcLink>,
    router: Option<JoinHandle<()>>,
    requests: Option<AbortHandle>,
    watcher: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Sender for host-to-worker messages.
    pub fn sender(&self) -> mpsc::Sender<ToWorker> {
        self.to_worker.clone()
    }

    pub fn is_running(&self) -> bool {
        self.router.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn terminate(&mut self) {
        if let Some(router) = self.router.take() {
            router.abort();
        }
        if let Some(requests) = self.requests.take() {
            requests.abort();
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        let failed = self.link.fail_all("worker terminated");
        info!(failed, "worker terminated");
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.router.is_some() {
            self.terminate();
        }
    }
}

/// Start a worker. Everything it sends goes to `to_host`.
pub fn spawn_worker(
    config: ConfigFile,
    program: Arc<dyn ExtractionProgram>,
    to_host: mpsc::Sender<ToHost>,
) -> WorkerHandle {
    let (to_worker, inbox) = mpsc::channel::<ToWorker>(HOST_CHANNEL_CAPACITY);
    let (request_tx, request_rx) = mpsc::unbounded_channel::<(u64, WorkerRequest)>();

    let link = Arc::new(RpcLink::new(to_host, config.rpc.call_timeout));
    let context = WorkerContext::new(config, Arc::clone(&link), program);
    let downloads = context.resolver().download.clone();

    let requests = tokio::spawn(serve_requests(context, request_rx));
    let router = tokio::spawn(route(inbox, Arc::clone(&link), downloads, request_tx));
    let serving = requests.abort_handle();
    let watcher = tokio::spawn(watch_requests(requests, router.abort_handle(), Arc::clone(&link)));

    debug!("worker spawned");
    WorkerHandle {
        to_worker,
        link,
        router: Some(router),
        requests: Some(serving),
        watcher: Some(watcher),
    }
}

/// Wait for the request task; if it panicked, stop routing and tell the host.
async fn watch_requests(requests: JoinHandle<()>, router: AbortHandle, link: Arc<RpcLink>) {
    let err = match requests.await {
        Ok(()) => return,
        Err(err) if err.is_cancelled() => return,
        Err(err) => err,
    };

    error!(error = %err, "request task crashed");
    router.abort();
    let failed = link.fail_all(WORKER_CRASHED);
    if link.announce_termination(WORKER_CRASHED).await.is_err() {
        debug!("host gone before crash could be reported");
    }
    info!(failed, "worker stopped after crash");
}

async fn route(
    mut inbox: mpsc::Receiver<ToWorker>,
    link: Arc<RpcLink>,
    downloads: RequestQueue<DownloadCapability>,
    requests: mpsc::UnboundedSender<(u64, WorkerRequest)>,
) {
    while let Some(message) = inbox.recv().await {
        match message {
            ToWorker::Request { id, request } => {
                debug!(id, request = request.name(), "request received");
                if requests.send((id, request)).is_err() {
                    warn!(id, "request task gone; rejecting request");
                    let _ = link.reply(id, Err("worker terminated".to_string())).await;
                }
            }
            ToWorker::CapabilityResponse { id, result } => {
                link.resolve_call(id, result);
            }
            ToWorker::SandboxResult { id, result } => {
                link.resolve_sandbox(id, result);
            }
            ToWorker::DownloadProgress { progress } => {
                let touched = downloads.touch_processing();
                debug!(bytes = progress.bytes_downloaded, touched, "download progress");
            }
        }
    }

    let failed = link.fail_all("host disconnected");
    debug!(failed, "router stopped");
}

async fn serve_requests(
    mut context: WorkerContext,
    mut requests: mpsc::UnboundedReceiver<(u64, WorkerRequest)>,
) {
    while let Some((id, request)) = requests.recv().await {
        let name = request.name();
        let result = context.handle(request).await.map_err(|err| {
            warn!(id, request = name, error = %err, "request failed");
            err.to_string()
        });

        if context.reply(id, result).await.is_err() {
            break;
        }
    }

    context.shutdown().await;
}
