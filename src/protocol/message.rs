// src/protocol/message.rs

//! Messages exchanged between the host and a worker.
//!
//! Everything here is plain data with serde derives so a deployment that
//! puts the two contexts in different processes can ship them as JSON.
//! Failures cross the boundary as human-readable strings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::{Command, ToolCapabilities};
use crate::queue::{DownloadRequest, FetchRequest, HttpResponse};
use crate::telemetry::{DownloadProgress, LogEntry, TransferProgress};
use crate::types::{ToolKind, ToolOutput};

/// Result as carried across the boundary.
pub type Reply<T> = std::result::Result<T, String>;

/// Top-level commands the host sends to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum WorkerRequest {
    Initialize,
    FetchMetadata {
        url: String,
    },
    FetchAndExtract {
        url: String,
        #[serde(rename = "outputPath")]
        output_path: PathBuf,
    },
    ExecuteQueuedCommands,
    GetQueue,
    SetVerbosity {
        enabled: bool,
        #[serde(default, rename = "clearBuffer")]
        clear_buffer: bool,
    },
}

impl WorkerRequest {
    /// Short name used in logs and timeout messages.
    pub fn name(&self) -> &'static str {
        match self {
            WorkerRequest::Initialize => "initialize",
            WorkerRequest::FetchMetadata { .. } => "fetch_metadata",
            WorkerRequest::FetchAndExtract { .. } => "fetch_and_extract",
            WorkerRequest::ExecuteQueuedCommands => "execute_queued_commands",
            WorkerRequest::GetQueue => "get_queue",
            WorkerRequest::SetVerbosity { .. } => "set_verbosity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum WorkerReply {
    Initialized {
        capabilities: ToolCapabilities,
    },
    Metadata(Value),
    Extraction {
        info: Value,
        commands: Vec<Command>,
    },
    Commands {
        commands: Vec<Command>,
    },
    Verbosity {
        verbose: bool,
        #[serde(rename = "logBuffer")]
        log_buffer: Vec<LogEntry>,
    },
}

/// Privileged operations only the host can perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "camelCase")]
pub enum HostCall {
    HttpRequest(FetchRequest),
    DownloadToFile(DownloadRequest),
    RunTool { command: ToolKind, args: Vec<String> },
    ProbeCapabilities,
}

impl HostCall {
    pub fn name(&self) -> &'static str {
        match self {
            HostCall::HttpRequest(_) => "http_request",
            HostCall::DownloadToFile(_) => "download_to_file",
            HostCall::RunTool { .. } => "run_tool",
            HostCall::ProbeCapabilities => "probe_capabilities",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum HostReply {
    Http(HttpResponse),
    Downloaded { path: PathBuf },
    Tool(ToolOutput),
}

/// Everything a worker can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToWorker {
    Request {
        id: u64,
        request: WorkerRequest,
    },
    CapabilityResponse {
        id: u64,
        result: Reply<HostReply>,
    },
    SandboxResult {
        id: u64,
        result: Reply<String>,
    },
    DownloadProgress {
        progress: TransferProgress,
    },
}

/// Everything a worker can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToHost {
    Response {
        id: u64,
        result: Reply<WorkerReply>,
    },
    CapabilityCall {
        id: u64,
        call: HostCall,
    },
    SandboxExecute {
        id: u64,
        code: String,
    },
    Log {
        entry: LogEntry,
    },
    Progress {
        progress: DownloadProgress,
    },
    /// The worker stopped serving requests; every outstanding call is lost.
    Terminated {
        reason: String,
    },
}
