// src/worker/link.rs

//! The worker's end of the host channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::command::ToolRunner;
use crate::errors::{BridgeError, Result};
use crate::protocol::{Correlator, HostCall, HostReply, Reply, ToHost, WorkerReply};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::{BoxFuture, ToolKind, ToolOutput};

/// Correlated calls from the worker to the host.
#[derive(Debug)]
pub struct RpcLink {
    to_host: mpsc::Sender<ToHost>,
    calls: Correlator<HostReply>,
    sandbox: Correlator<String>,
    call_timeout: Duration,
}

impl RpcLink {
    pub fn new(to_host: mpsc::Sender<ToHost>, call_timeout: Duration) -> Self {
        Self {
            to_host,
            calls: Correlator::new("capability"),
            sandbox: Correlator::new("sandbox"),
            call_timeout,
        }
    }

    /// Perform a host capability call and wait for its reply.
    pub async fn invoke(&self, call: HostCall) -> Result<HostReply> {
        let name = call.name();
        debug!(call = name, "capability call");
        let tx = self.to_host.clone();
        self.calls
            .call(name, self.call_timeout, move |id| async move {
                tx.send(ToHost::CapabilityCall { id, call })
                    .await
                    .map_err(|_| BridgeError::ContextClosed("host channel closed".to_string()))
            })
            .await
    }

    /// Have the host evaluate challenge code in its sandbox.
    pub async fn evaluate(&self, code: String) -> Result<String> {
        debug!(chars = code.len(), "sandbox call");
        let tx = self.to_host.clone();
        self.sandbox
            .call("sandbox execution", self.call_timeout, move |id| async move {
                tx.send(ToHost::SandboxExecute { id, code })
                    .await
                    .map_err(|_| BridgeError::ContextClosed("host channel closed".to_string()))
            })
            .await
    }

    pub fn resolve_call(&self, id: u64, result: Reply<HostReply>) -> bool {
        self.calls.resolve(id, result)
    }

    pub fn resolve_sandbox(&self, id: u64, result: Reply<String>) -> bool {
        self.sandbox.resolve(id, result)
    }

    /// Fail every correlated call still waiting on the host.
    pub fn fail_all(&self, reason: &str) -> usize {
        self.calls.fail_all(reason) + self.sandbox.fail_all(reason)
    }

    pub fn pending(&self) -> usize {
        self.calls.pending() + self.sandbox.pending()
    }

    pub async fn reply(&self, id: u64, result: Reply<WorkerReply>) -> Result<()> {
        self.to_host
            .send(ToHost::Response { id, result })
            .await
            .map_err(|_| BridgeError::ContextClosed("host channel closed".to_string()))
    }

    /// Tell the host this worker can no longer serve requests.
    pub async fn announce_termination(&self, reason: &str) -> Result<()> {
        self.to_host
            .send(ToHost::Terminated {
                reason: reason.to_string(),
            })
            .await
            .map_err(|_| BridgeError::ContextClosed("host channel closed".to_string()))
    }

    pub fn sink(&self) -> HostSink {
        HostSink {
            to_host: self.to_host.clone(),
        }
    }
}

impl ToolRunner for RpcLink {
    fn run_tool(
        &self,
        kind: ToolKind,
        args: Vec<String>,
    ) -> BoxFuture<'_, std::result::Result<ToolOutput, String>> {
        Box::pin(async move {
            match self.invoke(HostCall::RunTool { command: kind, args }).await {
                Ok(HostReply::Tool(output)) => Ok(output),
                Ok(other) => Err(format!("unexpected reply to run_tool: {other:?}")),
                Err(err) => Err(err.to_string()),
            }
        })
    }
}

/// Fire-and-forget telemetry towards the host.
#[derive(Debug, Clone)]
pub struct HostSink {
    to_host: mpsc::Sender<ToHost>,
}

impl TelemetrySink for HostSink {
    fn publish(&self, event: TelemetryEvent) {
        let message = match event {
            TelemetryEvent::Log(entry) => ToHost::Log { entry },
            TelemetryEvent::Progress(progress) => ToHost::Progress { progress },
        };
        if let Err(err) = self.to_host.try_send(message) {
            debug!(error = %err, "telemetry dropped");
        }
    }
}
