// src/driver/script.rs

//! What a synchronous extraction operation can see and do.
//!
//! The operation runs to completion without ever awaiting. When it needs a
//! resource that is not cached yet it gets an [`Interrupt`] back, which it
//! propagates with `?`; the driver resolves the resource asynchronously and
//! runs the operation again from the start.

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::command::{PathHints, ToolCapabilities};
use crate::driver::cache::ResourceCache;
use crate::queue::{ChallengeRequest, DownloadRequest, FetchRequest, HttpResponse};
use crate::telemetry::{OutputStream, Telemetry};
use crate::types::{QueueKind, ToolKind, ToolOutput};

/// A resource the operation needs before it can continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    Fetch(FetchRequest),
    Download(DownloadRequest),
    Challenge(ChallengeRequest),
}

impl ResourceRequest {
    pub fn kind(&self) -> QueueKind {
        match self {
            ResourceRequest::Fetch(_) => QueueKind::Fetch,
            ResourceRequest::Download(_) => QueueKind::Download,
            ResourceRequest::Challenge(_) => QueueKind::Challenge,
        }
    }
}

/// Why an operation stopped before producing a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// Resolve this, then re-run.
    Need(ResourceRequest),
    /// Give up; the message is reported to the caller.
    Fail(String),
}

impl Interrupt {
    pub fn fail(message: impl Into<String>) -> Self {
        Interrupt::Fail(message.into())
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Need(request) => write!(f, "{} resource needed", request.kind()),
            Interrupt::Fail(message) => f.write_str(message),
        }
    }
}

/// Outcome of one execution of an operation.
pub type Step<T> = std::result::Result<T, Interrupt>;

/// Tool invocation recorded during an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCommand {
    pub kind: ToolKind,
    pub args: Vec<String>,
}

pub struct Script<'a> {
    cache: &'a ResourceCache,
    capabilities: &'a ToolCapabilities,
    telemetry: Option<&'a Telemetry>,
    iteration: usize,
    staged: Vec<StagedCommand>,
}

impl<'a> Script<'a> {
    pub fn new(
        cache: &'a ResourceCache,
        capabilities: &'a ToolCapabilities,
        telemetry: Option<&'a Telemetry>,
        iteration: usize,
    ) -> Self {
        Self {
            cache,
            capabilities,
            telemetry,
            iteration,
            staged: Vec::new(),
        }
    }

    /// 1-based count of executions in the current call.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn fetch(&mut self, request: FetchRequest) -> Step<HttpResponse> {
        match self.cache.response(&request) {
            Some(response) => Ok(response.clone()),
            None => {
                debug!(method = %request.method, url = %request.url, "cache miss, need fetch");
                Err(Interrupt::Need(ResourceRequest::Fetch(request)))
            }
        }
    }

    pub fn download(&mut self, request: DownloadRequest) -> Step<PathBuf> {
        match self.cache.download(&request) {
            Some(path) => Ok(path.clone()),
            None => {
                debug!(url = %request.url, "cache miss, need download");
                Err(Interrupt::Need(ResourceRequest::Download(request)))
            }
        }
    }

    pub fn solve_challenge(&mut self, code: impl Into<String>) -> Step<String> {
        let request = ChallengeRequest::new(code);
        match self.cache.challenge(&request) {
            Some(result) => Ok(result.clone()),
            None => {
                debug!(chars = request.code.len(), "cache miss, need challenge");
                Err(Interrupt::Need(ResourceRequest::Challenge(request)))
            }
        }
    }

    /// Answer a tool invocation immediately.
    ///
    /// Introspection queries are answered from the capability descriptor.
    /// Anything else is staged for deferred execution and reported as a
    /// success straight away.
    pub fn run_tool(&mut self, kind: ToolKind, args: Vec<String>) -> ToolOutput {
        if kind == ToolKind::Ffprobe && args.first().is_some_and(|a| a == "-bsfs") {
            return self.capabilities.bsfs_output();
        }
        if args.iter().any(|a| a == "-version") {
            return self.capabilities.version_output();
        }

        let hints = PathHints::from_args(&args);
        debug!(command = %kind, args = args.len(), "staging tool command");
        self.staged.push(StagedCommand { kind, args });

        let stdout = hints
            .output
            .map(|path| format!("Output file: {path}\n"))
            .unwrap_or_default();
        ToolOutput::success(stdout, "")
    }

    pub fn emit_stdout(&self, text: &str) {
        self.emit(OutputStream::Stdout, text);
    }

    pub fn emit_stderr(&self, text: &str) {
        self.emit(OutputStream::Stderr, text);
    }

    fn emit(&self, stream: OutputStream, text: &str) {
        if let Some(telemetry) = self.telemetry {
            telemetry.write(stream, text.as_bytes());
            if !text.ends_with('\n') {
                telemetry.write(stream, b"\n");
            }
        }
    }

    pub(crate) fn into_staged(self) -> Vec<StagedCommand> {
        self.staged
    }
}
