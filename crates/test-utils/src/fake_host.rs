use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tapebridge::host::{HostBackend, ProgressReporter};
use tapebridge::protocol::{HostCall, HostReply};
use tapebridge::queue::HttpResponse;
use tapebridge::telemetry::TransferProgress;
use tapebridge::types::{BoxFuture, ToolKind, ToolOutput};

/// A scripted host backend that:
/// - answers HTTP requests from a URL → response map (404 otherwise)
/// - "downloads" by reporting progress and echoing the destination path
/// - records every call it services, including sandbox code
pub struct FakeHost {
    responses: HashMap<String, HttpResponse>,
    failing_urls: HashMap<String, String>,
    tool_output: ToolOutput,
    probe_output: Option<ToolOutput>,
    sandbox_answer: std::result::Result<String, String>,
    sandbox_delay: Option<Duration>,
    calls: Arc<Mutex<Vec<HostCall>>>,
    sandbox_code: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            failing_urls: HashMap::new(),
            tool_output: ToolOutput::success("", ""),
            probe_output: None,
            sandbox_answer: Ok(String::new()),
            sandbox_delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            sandbox_code: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(mut self, url: &str, response: HttpResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    /// Every HTTP request or download of `url` fails with `message`.
    pub fn with_failure(mut self, url: &str, message: &str) -> Self {
        self.failing_urls.insert(url.to_string(), message.to_string());
        self
    }

    /// Output returned for every tool run other than the capability probe.
    pub fn with_tool_output(mut self, output: ToolOutput) -> Self {
        self.tool_output = output;
        self
    }

    /// Output returned for the capability probe; without it the probe fails.
    pub fn with_probe_output(mut self, output: ToolOutput) -> Self {
        self.probe_output = Some(output);
        self
    }

    pub fn with_sandbox_answer(mut self, answer: std::result::Result<String, String>) -> Self {
        self.sandbox_answer = answer;
        self
    }

    pub fn with_sandbox_delay(mut self, delay: Duration) -> Self {
        self.sandbox_delay = Some(delay);
        self
    }

    /// Shared log of serviced capability calls, in arrival order.
    pub fn calls(&self) -> Arc<Mutex<Vec<HostCall>>> {
        Arc::clone(&self.calls)
    }

    pub fn sandbox_code(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sandbox_code)
    }

    fn answer(&self, call: &HostCall, progress: &ProgressReporter) -> std::result::Result<HostReply, String> {
        match call {
            HostCall::HttpRequest(req) => {
                if let Some(message) = self.failing_urls.get(&req.url) {
                    return Err(message.clone());
                }
                let response = self.responses.get(&req.url).cloned().unwrap_or(HttpResponse {
                    status: 404,
                    headers: Default::default(),
                    body: "not found".to_string(),
                });
                Ok(HostReply::Http(response))
            }
            HostCall::DownloadToFile(req) => {
                if let Some(message) = self.failing_urls.get(&req.url) {
                    return Err(message.clone());
                }
                progress.report(TransferProgress {
                    bytes_downloaded: 0,
                    total_bytes: Some(1024),
                    percent: 0.0,
                });
                progress.report(TransferProgress {
                    bytes_downloaded: 1024,
                    total_bytes: Some(1024),
                    percent: 100.0,
                });
                Ok(HostReply::Downloaded {
                    path: req.output_path.clone(),
                })
            }
            HostCall::RunTool { .. } => Ok(HostReply::Tool(self.tool_output.clone())),
            HostCall::ProbeCapabilities => match &self.probe_output {
                Some(output) => Ok(HostReply::Tool(output.clone())),
                None => Err(format!("{} not installed", ToolKind::Ffprobe)),
            },
        }
    }
}

impl HostBackend for FakeHost {
    fn invoke(
        &self,
        call: HostCall,
        progress: ProgressReporter,
    ) -> BoxFuture<'_, std::result::Result<HostReply, String>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(call.clone());
            self.answer(&call, &progress)
        })
    }

    fn evaluate(&self, code: String) -> BoxFuture<'_, std::result::Result<String, String>> {
        Box::pin(async move {
            self.sandbox_code.lock().unwrap().push(code);
            if let Some(delay) = self.sandbox_delay {
                tokio::time::sleep(delay).await;
            }
            self.sandbox_answer.clone()
        })
    }
}
