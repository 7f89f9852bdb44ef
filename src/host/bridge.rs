// src/host/bridge.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::command::{Command, ToolCapabilities};
use crate::config::ConfigFile;
use crate::errors::{BridgeError, Result};
use crate::host::backend::{HostBackend, ProgressReporter};
use crate::protocol::{Correlator, ToHost, ToWorker, WorkerReply, WorkerRequest};
use crate::telemetry::{DownloadProgress, LogEntry};
use crate::types::CommandStatus;
use crate::worker::{self, ExtractionProgram, WorkerHandle};

const TELEMETRY_CAPACITY: usize = 256;

/// Host-side client of one worker.
///
/// Owns the worker, services its capability and sandbox calls through a
/// [`HostBackend`], and exposes the worker's top-level operations as async
/// methods. Every method either returns the worker's data or a failure; a
/// silent worker is turned into a timeout locally.
pub struct HostBridge {
    to_worker: mpsc::Sender<ToWorker>,
    worker: Option<WorkerHandle>,
    pending: Arc<Correlator<WorkerReply>>,
    call_timeout: Duration,
    logs: broadcast::Sender<LogEntry>,
    progress: broadcast::Sender<DownloadProgress>,
    servicer: Option<JoinHandle<()>>,
    /// Set once the worker reports it can no longer serve requests.
    crashed: Arc<AtomicBool>,
}

impl HostBridge {
    /// Spawn a worker running `program` and start servicing it.
    pub fn start(
        config: ConfigFile,
        backend: Arc<dyn HostBackend>,
        program: Arc<dyn ExtractionProgram>,
    ) -> Self {
        let call_timeout = config.rpc.call_timeout;
        let sandbox_timeout = config.rpc.sandbox_timeout;

        let (to_host, from_worker) = mpsc::channel::<ToHost>(worker::HOST_CHANNEL_CAPACITY);
        let handle = worker::spawn_worker(config, program, to_host);
        let to_worker = handle.sender();

        let pending = Arc::new(Correlator::new("worker"));
        let (logs, _) = broadcast::channel(TELEMETRY_CAPACITY);
        let (progress, _) = broadcast::channel(TELEMETRY_CAPACITY);
        let crashed = Arc::new(AtomicBool::new(false));

        let servicer = tokio::spawn(service(
            from_worker,
            Servicer {
                to_worker: to_worker.clone(),
                backend,
                pending: Arc::clone(&pending),
                sandbox_timeout,
                logs: logs.clone(),
                progress: progress.clone(),
                crashed: Arc::clone(&crashed),
            },
        ));

        info!("host bridge started");
        Self {
            to_worker,
            worker: Some(handle),
            pending,
            call_timeout,
            logs,
            progress,
            servicer: Some(servicer),
            crashed,
        }
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.logs.subscribe()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<DownloadProgress> {
        self.progress.subscribe()
    }

    /// Number of worker-bound calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.pending()
    }

    async fn send(&self, request: WorkerRequest) -> Result<WorkerReply> {
        if self.worker.is_none() || self.crashed.load(Ordering::SeqCst) {
            return Err(BridgeError::ContextClosed("worker terminated".to_string()));
        }

        let what = format!("message {}", request.name());
        let tx = self.to_worker.clone();
        self.pending
            .call(&what, self.call_timeout, move |id| async move {
                tx.send(ToWorker::Request { id, request })
                    .await
                    .map_err(|_| BridgeError::ContextClosed("worker terminated".to_string()))
            })
            .await
    }

    pub async fn initialize(&self) -> Result<ToolCapabilities> {
        match self.send(WorkerRequest::Initialize).await? {
            WorkerReply::Initialized { capabilities } => Ok(capabilities),
            other => Err(unexpected("initialize", &other)),
        }
    }

    pub async fn fetch_metadata(&self, url: &str) -> Result<Value> {
        let request = WorkerRequest::FetchMetadata {
            url: url.to_string(),
        };
        match self.send(request).await? {
            WorkerReply::Metadata(info) => Ok(info),
            other => Err(unexpected("fetch_metadata", &other)),
        }
    }

    /// Run the extraction phase and then every tool command it queued.
    ///
    /// Fails if any of those commands ends in error.
    pub async fn extract_audio(&self, url: &str, output_path: impl Into<PathBuf>) -> Result<Value> {
        let request = WorkerRequest::FetchAndExtract {
            url: url.to_string(),
            output_path: output_path.into(),
        };
        let (info, queued) = match self.send(request).await? {
            WorkerReply::Extraction { info, commands } => (info, commands),
            other => return Err(unexpected("fetch_and_extract", &other)),
        };
        info!(queued = queued.len(), "extraction phase complete");

        if !queued.is_empty() {
            let executed = self.execute_queued_commands().await?;
            let failures: Vec<String> = executed
                .iter()
                .filter(|cmd| cmd.status == CommandStatus::Error)
                .map(|cmd| cmd.error.clone().unwrap_or_else(|| format!("command {} failed", cmd.id)))
                .collect();
            if !failures.is_empty() {
                return Err(BridgeError::Operation(format!(
                    "conversion failed: {}",
                    failures.join("; ")
                )));
            }
            info!(executed = executed.len(), "conversion phase complete");
        }

        Ok(info)
    }

    pub async fn execute_queued_commands(&self) -> Result<Vec<Command>> {
        match self.send(WorkerRequest::ExecuteQueuedCommands).await? {
            WorkerReply::Commands { commands } => Ok(commands),
            other => Err(unexpected("execute_queued_commands", &other)),
        }
    }

    pub async fn get_queued_commands(&self) -> Result<Vec<Command>> {
        match self.send(WorkerRequest::GetQueue).await? {
            WorkerReply::Commands { commands } => Ok(commands),
            other => Err(unexpected("get_queue", &other)),
        }
    }

    /// Toggle verbose runtime logging. When enabling, the buffered log is
    /// returned (after clearing it first if asked to).
    pub async fn set_verbosity(&self, enabled: bool, clear_buffer: bool) -> Result<Vec<LogEntry>> {
        let request = WorkerRequest::SetVerbosity {
            enabled,
            clear_buffer,
        };
        match self.send(request).await? {
            WorkerReply::Verbosity { log_buffer, .. } => Ok(log_buffer),
            other => Err(unexpected("set_verbosity", &other)),
        }
    }

    /// Terminate the worker and fail every outstanding call.
    pub fn destroy(&mut self) {
        if let Some(mut handle) = self.worker.take() {
            info!("terminating worker");
            handle.terminate();
        }
        if let Some(servicer) = self.servicer.take() {
            servicer.abort();
        }
        self.pending.fail_all("worker terminated");
    }
}

impl Drop for HostBridge {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn unexpected(operation: &str, reply: &WorkerReply) -> BridgeError {
    BridgeError::Operation(format!("unexpected reply to {operation}: {reply:?}"))
}

struct Servicer {
    to_worker: mpsc::Sender<ToWorker>,
    backend: Arc<dyn HostBackend>,
    pending: Arc<Correlator<WorkerReply>>,
    sandbox_timeout: Duration,
    logs: broadcast::Sender<LogEntry>,
    progress: broadcast::Sender<DownloadProgress>,
    crashed: Arc<AtomicBool>,
}

async fn service(mut from_worker: mpsc::Receiver<ToHost>, ctx: Servicer) {
    while let Some(message) = from_worker.recv().await {
        match message {
            ToHost::Response { id, result } => {
                if let Err(message) = &result {
                    error!(id, error = %message, "error from worker");
                }
                ctx.pending.resolve(id, result);
            }
            ToHost::CapabilityCall { id, call } => {
                let backend = Arc::clone(&ctx.backend);
                let to_worker = ctx.to_worker.clone();
                tokio::spawn(async move {
                    let name = call.name();
                    debug!(id, call = name, "servicing capability call");
                    let result = backend
                        .invoke(call, ProgressReporter::new(to_worker.clone()))
                        .await;
                    if let Err(message) = &result {
                        warn!(id, call = name, error = %message, "capability call failed");
                    }
                    let _ = to_worker
                        .send(ToWorker::CapabilityResponse { id, result })
                        .await;
                });
            }
            ToHost::SandboxExecute { id, code } => {
                let backend = Arc::clone(&ctx.backend);
                let to_worker = ctx.to_worker.clone();
                let limit = ctx.sandbox_timeout;
                tokio::spawn(async move {
                    let result = match tokio::time::timeout(limit, backend.evaluate(code)).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(id, ?limit, "sandbox execution timed out");
                            Err("Sandbox execution timed out".to_string())
                        }
                    };
                    let _ = to_worker.send(ToWorker::SandboxResult { id, result }).await;
                });
            }
            ToHost::Log { entry } => {
                let _ = ctx.logs.send(entry);
            }
            ToHost::Progress { progress } => {
                let _ = ctx.progress.send(progress);
            }
            ToHost::Terminated { reason } => {
                ctx.crashed.store(true, Ordering::SeqCst);
                let failed = ctx.pending.fail_all(&reason);
                error!(%reason, failed, "worker terminated unexpectedly");
            }
        }
    }

    let failed = ctx.pending.fail_all("worker terminated");
    debug!(failed, "worker channel closed");
}
