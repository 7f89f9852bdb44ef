// src/worker/capabilities.rs

//! Queue capabilities that reach the host over the capability RPC.

use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::Result;
use crate::protocol::{HostCall, HostReply};
use crate::queue::{Capability, ChallengeRequest, DownloadRequest, FetchRequest, HttpResponse};
use crate::types::{BoxFuture, QueueKind};
use crate::worker::link::RpcLink;

fn unexpected(call: &str, reply: &HostReply) -> String {
    format!("unexpected reply to {call}: {reply:?}")
}

pub struct FetchCapability {
    link: Arc<RpcLink>,
}

impl FetchCapability {
    pub fn new(link: Arc<RpcLink>) -> Self {
        Self { link }
    }
}

impl Capability for FetchCapability {
    type Payload = FetchRequest;
    type Output = HttpResponse;

    fn kind(&self) -> QueueKind {
        QueueKind::Fetch
    }

    fn validate(&self, payload: &FetchRequest) -> Result<()> {
        payload.validate()
    }

    fn execute(&self, payload: FetchRequest) -> BoxFuture<'_, std::result::Result<HttpResponse, String>> {
        Box::pin(async move {
            match self.link.invoke(HostCall::HttpRequest(payload)).await {
                Ok(HostReply::Http(response)) => Ok(response),
                Ok(other) => Err(unexpected("http_request", &other)),
                Err(err) => Err(err.to_string()),
            }
        })
    }
}

pub struct DownloadCapability {
    link: Arc<RpcLink>,
}

impl DownloadCapability {
    pub fn new(link: Arc<RpcLink>) -> Self {
        Self { link }
    }
}

impl Capability for DownloadCapability {
    type Payload = DownloadRequest;
    type Output = PathBuf;

    fn kind(&self) -> QueueKind {
        QueueKind::Download
    }

    fn validate(&self, payload: &DownloadRequest) -> Result<()> {
        payload.validate()
    }

    fn execute(&self, payload: DownloadRequest) -> BoxFuture<'_, std::result::Result<PathBuf, String>> {
        Box::pin(async move {
            match self.link.invoke(HostCall::DownloadToFile(payload)).await {
                Ok(HostReply::Downloaded { path }) => Ok(path),
                Ok(other) => Err(unexpected("download_to_file", &other)),
                Err(err) => Err(err.to_string()),
            }
        })
    }
}

pub struct ChallengeCapability {
    link: Arc<RpcLink>,
}

impl ChallengeCapability {
    pub fn new(link: Arc<RpcLink>) -> Self {
        Self { link }
    }
}

impl Capability for ChallengeCapability {
    type Payload = ChallengeRequest;
    type Output = String;

    fn kind(&self) -> QueueKind {
        QueueKind::Challenge
    }

    fn validate(&self, payload: &ChallengeRequest) -> Result<()> {
        payload.validate()
    }

    fn execute(&self, payload: ChallengeRequest) -> BoxFuture<'_, std::result::Result<String, String>> {
        Box::pin(async move {
            self.link
                .evaluate(payload.code)
                .await
                .map_err(|err| err.to_string())
        })
    }
}
