// src/host/native.rs

//! Host backend that performs real network, filesystem and process work.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::HostSection;
use crate::errors::{BridgeError, Result};
use crate::host::backend::{HostBackend, ProgressReporter};
use crate::protocol::{HostCall, HostReply};
use crate::queue::{DownloadRequest, FetchRequest, HttpResponse};
use crate::telemetry::TransferProgress;
use crate::types::{BoxFuture, ToolKind, ToolOutput};

const PROGRESS_BYTE_THRESHOLD: u64 = 100_000;
const PROGRESS_TIME_THRESHOLD: Duration = Duration::from_millis(250);

pub struct NativeHost {
    client: reqwest::Client,
    settings: HostSection,
}

impl NativeHost {
    pub fn new(settings: HostSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| BridgeError::ConfigError(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn program(&self, kind: ToolKind) -> &str {
        match kind {
            ToolKind::Ffmpeg => &self.settings.ffmpeg,
            ToolKind::Ffprobe => &self.settings.ffprobe,
        }
    }

    async fn http_request(&self, request: FetchRequest) -> anyhow::Result<HttpResponse> {
        let method = request.method.to_uppercase();
        let mut builder = match method.as_str() {
            "GET" => self.client.get(&request.url),
            "POST" => self.client.post(&request.url),
            "PUT" => self.client.put(&request.url),
            "DELETE" => self.client.delete(&request.url),
            "HEAD" => self.client.head(&request.url),
            "PATCH" => self.client.patch(&request.url),
            other => bail!("Unsupported HTTP method: {other}"),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        info!(%method, url = %request.url, "sending request");
        let response = builder.send().await.context("HTTP request failed")?;
        let status = response.status().as_u16();
        debug!(status, "response received");

        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn download_to_file(
        &self,
        request: DownloadRequest,
        progress: &ProgressReporter,
    ) -> anyhow::Result<PathBuf> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        info!(url = %request.url, output = %request.output_path.display(), "starting download");
        let response = builder.send().await.context("Download request failed")?;
        if !response.status().is_success() {
            bail!("Download failed with status: {}", response.status());
        }

        let total_bytes = response.content_length();
        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create output directory")?;
        }
        let mut file = tokio::fs::File::create(&request.output_path)
            .await
            .context("Failed to create output file")?;

        progress.report(TransferProgress {
            bytes_downloaded: 0,
            total_bytes,
            percent: 0.0,
        });

        let mut downloaded: u64 = 0;
        let mut last_bytes: u64 = 0;
        let mut last_report = Instant::now();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read chunk")?;
            file.write_all(&chunk)
                .await
                .context("Failed to write chunk")?;
            downloaded += chunk.len() as u64;

            if downloaded - last_bytes >= PROGRESS_BYTE_THRESHOLD
                || last_report.elapsed() >= PROGRESS_TIME_THRESHOLD
            {
                progress.report(TransferProgress {
                    bytes_downloaded: downloaded,
                    total_bytes,
                    percent: total_bytes
                        .map(|t| downloaded as f64 / t as f64 * 100.0)
                        .unwrap_or(-1.0),
                });
                last_bytes = downloaded;
                last_report = Instant::now();
            }
        }
        file.flush().await.context("Failed to flush file")?;

        progress.report(TransferProgress {
            bytes_downloaded: downloaded,
            total_bytes: Some(downloaded),
            percent: 100.0,
        });
        info!(bytes = downloaded, output = %request.output_path.display(), "download complete");

        Ok(request.output_path)
    }

    async fn run_tool(&self, kind: ToolKind, args: Vec<String>) -> anyhow::Result<ToolOutput> {
        let program = self.program(kind);
        info!(command = %kind, %program, args = args.len(), "running tool");

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawning {program}"))?;

        let exit_code = output.status.code().unwrap_or(-1);
        info!(command = %kind, exit_code, "tool exited");
        Ok(ToolOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Pipe `code` into the sandbox program and collect its stdout.
    async fn run_sandbox(&self, code: String) -> anyhow::Result<String> {
        let program = &self.settings.sandbox_program;
        debug!(%program, chars = code.len(), "evaluating in sandbox");

        let mut child = Command::new(program)
            .args(&self.settings.sandbox_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning sandbox {program}"))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("sandbox stdin unavailable"))?;
        stdin
            .write_all(code.as_bytes())
            .await
            .context("writing code to sandbox")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("waiting for sandbox")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(code = ?output.status.code(), "sandbox evaluation failed");
            bail!("{}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

impl HostBackend for NativeHost {
    fn invoke(
        &self,
        call: HostCall,
        progress: ProgressReporter,
    ) -> BoxFuture<'_, std::result::Result<HostReply, String>> {
        Box::pin(async move {
            let reply = match call {
                HostCall::HttpRequest(request) => self.http_request(request).await.map(HostReply::Http),
                HostCall::DownloadToFile(request) => self
                    .download_to_file(request, &progress)
                    .await
                    .map(|path| HostReply::Downloaded { path }),
                HostCall::RunTool { command, args } => {
                    self.run_tool(command, args).await.map(HostReply::Tool)
                }
                HostCall::ProbeCapabilities => self
                    .run_tool(ToolKind::Ffprobe, vec!["-bsfs".into()])
                    .await
                    .map(HostReply::Tool),
            };
            reply.map_err(|err| format!("{err:#}"))
        })
    }

    fn evaluate(&self, code: String) -> BoxFuture<'_, std::result::Result<String, String>> {
        Box::pin(async move { self.run_sandbox(code).await.map_err(|err| format!("{err:#}")) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_methods_are_rejected_before_sending() {
        let host = NativeHost::new(HostSection::default()).unwrap();
        let call = HostCall::HttpRequest(FetchRequest::new("BREW", "https://example.com/pot"));

        let err = host.invoke(call, ProgressReporter::disabled()).await.unwrap_err();
        assert_eq!(err, "Unsupported HTTP method: BREW");
    }

    #[tokio::test]
    async fn missing_tool_binary_is_a_failure_not_a_panic() {
        let settings = HostSection {
            ffmpeg: "/nonexistent/tapebridge-ffmpeg".to_string(),
            ..HostSection::default()
        };
        let host = NativeHost::new(settings).unwrap();
        let call = HostCall::RunTool {
            command: ToolKind::Ffmpeg,
            args: vec!["-version".to_string()],
        };

        let err = host.invoke(call, ProgressReporter::disabled()).await.unwrap_err();
        assert!(err.starts_with("spawning /nonexistent/tapebridge-ffmpeg"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn version_banner_reaches_the_capability_parser() {
        use std::os::unix::fs::PermissionsExt;

        use crate::command::ToolCapabilities;

        // Prints its banner on stderr unless told to hide it, like ffprobe.
        let script = r#"#!/bin/sh
case " $* " in
  *" -hide_banner "*) ;;
  *) echo "ffprobe version 7.0.2 Copyright (c) 2007-2024 the FFmpeg developers" >&2
     echo "  configuration: --enable-gpl --enable-libopus" >&2 ;;
esac
printf 'Bitstream filters:\naac_adtstoasc\nnull\n'
"#;
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = dir.path().join("ffprobe");
        std::fs::write(&ffprobe, script).unwrap();
        std::fs::set_permissions(&ffprobe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let settings = HostSection {
            ffprobe: ffprobe.display().to_string(),
            ..HostSection::default()
        };
        let host = NativeHost::new(settings).unwrap();

        let reply = host
            .invoke(HostCall::ProbeCapabilities, ProgressReporter::disabled())
            .await
            .unwrap();
        let output = match reply {
            HostReply::Tool(output) => output,
            other => panic!("expected tool output, got {other:?}"),
        };
        let caps = ToolCapabilities::from_probe(&output);

        assert_eq!(caps.bitstream_filters, vec!["aac_adtstoasc", "null"]);
        assert_ne!(caps.version, ToolCapabilities::fallback().version);
        assert!(caps.version.starts_with("ffprobe version 7.0.2"));
        assert_eq!(caps.configuration, "--enable-gpl --enable-libopus");
    }
}
