// src/queue/payload.rs

//! Kind-specific payloads carried by the request queues.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{BridgeError, Result};
use crate::types::QueueKind;

/// Methods the host HTTP capability knows how to send.
pub const SUPPORTED_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "HEAD", "PATCH"];

/// A network fetch as requested by the scripting runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_http_url(QueueKind::Fetch, &self.url)?;
        let method = self.method.to_uppercase();
        if !SUPPORTED_METHODS.contains(&method.as_str()) {
            return Err(BridgeError::InvalidPayload {
                kind: QueueKind::Fetch,
                reason: format!("unsupported HTTP method: {}", self.method),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A download straight to disk; the host only reports completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    pub output_path: PathBuf,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_path: output_path.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_http_url(QueueKind::Download, &self.url)?;
        if self.output_path.as_os_str().is_empty() {
            return Err(BridgeError::InvalidPayload {
                kind: QueueKind::Download,
                reason: "empty output path".to_string(),
            });
        }
        Ok(())
    }
}

/// Challenge-solving code to evaluate in the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub code: String,
}

impl ChallengeRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(BridgeError::InvalidPayload {
                kind: QueueKind::Challenge,
                reason: "empty challenge code".to_string(),
            });
        }
        Ok(())
    }
}

fn validate_http_url(kind: QueueKind, raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw).map_err(|e| BridgeError::InvalidPayload {
        kind,
        reason: format!("invalid url '{}': {}", raw, e),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(BridgeError::InvalidPayload {
            kind,
            reason: format!("unsupported url scheme '{}'", other),
        }),
    }
}
